use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use time::Date;
use tracing::{info, warn};

use macromate::advice::StreamEvent;
use macromate::auth::{gate::gate_with_store, RouteDecision};
use macromate::foods::{self, CatalogMealType, Equipment, FoodInput, FoodQuery};
use macromate::meals::{
    self, aggregate, api::ImageUpload, buckets::records_for, record::parse_day, Day, MealFilter,
    MealType,
};
use macromate::profile::ProfileFields;
use macromate::{AppConfig, AppContext};

#[derive(Parser)]
#[command(name = "macromate", version, about = "Macro Mate nutrition client")]
struct Cli {
    /// Backend base url.
    #[arg(long, global = true, env = "MACROMATE_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account (does not log in).
    Register(Credentials),
    Login(Credentials),
    Logout,
    /// Show the logged-in user and token expiry.
    Whoami,
    #[command(subcommand)]
    Profile(ProfileCmd),
    #[command(subcommand)]
    Foods(FoodsCmd),
    /// Upload a meal photo and print its nutrition analysis.
    Analyze {
        image: PathBuf,
        #[arg(long, short = 't', default_value = "lunch")]
        meal_type: MealType,
        /// ISO date-time of the meal, e.g. 2024-05-01T12:30:00.
        #[arg(long)]
        meal_time: Option<String>,
    },
    #[command(subcommand)]
    Meals(MealsCmd),
    /// Ask the nutrition advisor; the reply is streamed.
    Chat {
        query: String,
        #[arg(long)]
        image: Option<PathBuf>,
        /// Start a new conversation thread.
        #[arg(long)]
        new: bool,
    },
}

#[derive(Args)]
struct Credentials {
    #[arg(long)]
    email: String,
    #[arg(long, env = "MACROMATE_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum ProfileCmd {
    Show,
    Create(ProfileArgs),
    /// Replace the profile with the loaded one overlaid by the given fields.
    Set(ProfileArgs),
    /// Send only the given fields.
    Patch(ProfileArgs),
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    full_name: Option<String>,
    #[arg(long)]
    age: Option<u32>,
    #[arg(long)]
    gender: Option<String>,
    /// kg
    #[arg(long)]
    weight: Option<f64>,
    /// cm
    #[arg(long)]
    height: Option<f64>,
    #[arg(long)]
    body_shape: Option<String>,
    #[arg(long)]
    health_conditions: Option<String>,
    #[arg(long)]
    fitness_goal: Option<String>,
    #[arg(long)]
    dietary_restrictions: Option<String>,
    #[arg(long)]
    allergies: Option<String>,
    #[arg(long)]
    activity_level: Option<String>,
}

impl From<ProfileArgs> for ProfileFields {
    fn from(a: ProfileArgs) -> Self {
        Self {
            full_name: a.full_name,
            age: a.age,
            gender: a.gender,
            weight: a.weight,
            height: a.height,
            body_shape: a.body_shape,
            health_conditions: a.health_conditions,
            fitness_goal: a.fitness_goal,
            dietary_restrictions: a.dietary_restrictions,
            allergies: a.allergies,
            activity_level: a.activity_level,
        }
    }
}

#[derive(Subcommand)]
enum FoodsCmd {
    List {
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        meal_type: Option<CatalogMealType>,
        /// Comma-separated, e.g. oven,stove.
        #[arg(long)]
        equipment: Option<String>,
        #[arg(long)]
        max_complexity: Option<i32>,
        #[arg(long)]
        search: Option<String>,
    },
    Show {
        id: i64,
    },
    Create(FoodArgs),
    Update {
        id: i64,
        #[command(flatten)]
        fields: FoodArgs,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args)]
struct FoodArgs {
    #[arg(long)]
    name: Option<String>,
    /// Id of the food in the source recipe dataset.
    #[arg(long)]
    raw_id: Option<i64>,
    /// Meal types this food fits; repeat or comma-separate.
    #[arg(long, value_delimiter = ',')]
    meal_types: Vec<CatalogMealType>,
    /// Equipment needed (blender, oven, stove, slow_cooker, ...).
    #[arg(long, value_delimiter = ',')]
    needs: Vec<Equipment>,
    #[arg(long)]
    complexity: Option<i32>,
    #[arg(long)]
    cook_time: Option<f64>,
    #[arg(long)]
    prep_time: Option<f64>,
    #[arg(long)]
    wait_time: Option<f64>,
    #[arg(long)]
    total_time: Option<f64>,
    #[arg(long)]
    grams: Option<f64>,
    #[arg(long)]
    default_unit: Option<String>,
    #[arg(long)]
    image_url: Option<String>,
}

impl From<FoodArgs> for FoodInput {
    fn from(a: FoodArgs) -> Self {
        let flag = |t: CatalogMealType| {
            (!a.meal_types.is_empty()).then(|| a.meal_types.contains(&t))
        };
        let mut input = Self {
            is_breakfast: flag(CatalogMealType::Breakfast),
            is_lunch: flag(CatalogMealType::Lunch),
            is_dinner: flag(CatalogMealType::Dinner),
            is_snack: flag(CatalogMealType::Snack),
            is_dessert: flag(CatalogMealType::Dessert),
            name: a.name,
            raw_id: a.raw_id,
            complexity: a.complexity,
            cook_time: a.cook_time,
            prep_time: a.prep_time,
            wait_time: a.wait_time,
            total_time: a.total_time,
            grams: a.grams,
            default_unit: a.default_unit,
            image_url: a.image_url,
            ..Default::default()
        };
        if !a.needs.is_empty() {
            input.set_equipment(&a.needs);
        }
        input
    }
}

#[derive(Args)]
struct FilterArgs {
    /// First day to include (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    from: Option<Date>,
    /// Last day to include (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    to: Option<Date>,
    #[arg(long, short = 't')]
    meal_type: Option<MealType>,
}

impl From<&FilterArgs> for MealFilter {
    fn from(a: &FilterArgs) -> Self {
        Self {
            start: a.from,
            end: a.to,
            meal_type: a.meal_type,
        }
    }
}

#[derive(Subcommand)]
enum MealsCmd {
    /// Meal log, newest first.
    List(FilterArgs),
    Show {
        id: i64,
    },
    /// Combined nutrition of the matching (or the given) meals.
    Totals {
        #[command(flatten)]
        filter: FilterArgs,
        /// Only these meal ids; repeat or comma-separate.
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
    },
    /// Meals of one day grouped by meal type; `undated` lists meals without a time.
    Day { day: String },
}

fn parse_date(s: &str) -> Result<Date, String> {
    parse_day(s).ok_or_else(|| format!("`{s}` is not a YYYY-MM-DD date"))
}

fn init_tracing() {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "macromate=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Page each command stands in for, for cookie gating.
fn route_of(command: &Command) -> &'static str {
    match command {
        Command::Register(_) => "/register",
        Command::Login(_) => "/login",
        Command::Logout => "/",
        Command::Whoami | Command::Profile(_) => "/planner/profile",
        Command::Foods(_) => "/planner/foods",
        Command::Analyze { .. } | Command::Meals(_) => "/planner/collections",
        Command::Chat { .. } => "/planner/chatbot",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url);
    }

    let path = route_of(&cli.command);
    let mut ctx = AppContext::init(config).await?;
    match gate_with_store(ctx.store.as_ref(), path).await? {
        RouteDecision::Allow => {}
        RouteDecision::RedirectToLogin { redirect } => {
            bail!("not logged in (needed for {redirect}); run `macromate login` first")
        }
        RouteDecision::RedirectToPlanner => {
            match ctx.auth.user() {
                Some(user) => println!("already logged in as {}", user.email),
                None => println!("already logged in; run `macromate logout` to switch accounts"),
            }
            return Ok(());
        }
    }

    run(cli.command, &mut ctx).await
}

async fn run(command: Command, ctx: &mut AppContext) -> anyhow::Result<()> {
    match command {
        Command::Register(c) => {
            let user = ctx.auth.register(&c.email, &c.password).await?;
            println!("registered {} (id {}); now run `macromate login`", user.email, user.id);
        }
        Command::Login(c) => {
            let session = ctx.auth.login(&c.email, &c.password).await?;
            match &session.user {
                Some(user) => println!("logged in as {}", user.email),
                None => println!("logged in"),
            }
        }
        Command::Logout => {
            ctx.logout().await?;
            println!("logged out");
        }
        Command::Whoami => match ctx.auth.session() {
            Some(session) => {
                if let Some(user) = &session.user {
                    println!("{} <{}> (id {})", user.username, user.email, user.id);
                }
                if let Some(exp) = session.expires_at() {
                    println!("token expires {exp}");
                }
            }
            None => bail!("session expired; run `macromate login` again"),
        },
        Command::Profile(cmd) => profile(cmd, ctx).await?,
        Command::Foods(cmd) => foods_cmd(cmd, ctx).await?,
        Command::Analyze {
            image,
            meal_type,
            meal_time,
        } => {
            let upload = ImageUpload::from_path(&image).await?;
            let timeout = ctx.config.analysis_timeout;
            let resp = ctx
                .meals
                .upload(&ctx.http, upload, meal_type, meal_time.as_deref(), timeout)
                .await?;
            if !resp.analysis.safety.is_food {
                warn!(reason = %resp.analysis.safety.reason, "image does not look like food");
            }
            let totals = resp.analysis.ingredient_totals();
            println!("meal #{}: {}", resp.meal_id, resp.analysis.dish_name);
            for ing in &resp.analysis.ingredients {
                println!(
                    "  {:<24} {:>6.0} g {:>7.0} kcal",
                    ing.name, ing.estimated_weight, ing.nutrition.calories
                );
            }
            print_totals(&totals);
        }
        Command::Meals(cmd) => meals_cmd(cmd, ctx).await?,
        Command::Chat { query, image, new } => chat(ctx, &query, image, new).await?,
    }
    Ok(())
}

async fn profile(cmd: ProfileCmd, ctx: &mut AppContext) -> anyhow::Result<()> {
    let state = &mut ctx.profile;
    let profile = match cmd {
        ProfileCmd::Show => state.load().await?,
        ProfileCmd::Create(args) => state.create(&args.into()).await?,
        ProfileCmd::Set(args) => {
            state.load().await.context("load profile before replacing it")?;
            let mut draft = state.draft();
            draft.merge(args.into());
            state.save(&draft).await?
        }
        ProfileCmd::Patch(args) => state.patch(&args.into()).await?,
    };
    print_json(profile)?;
    if let Some(bmi) = profile.bmi() {
        println!("BMI {bmi:.2}");
    }
    Ok(())
}

async fn foods_cmd(cmd: FoodsCmd, ctx: &AppContext) -> anyhow::Result<()> {
    let http = &ctx.http;
    match cmd {
        FoodsCmd::List {
            skip,
            limit,
            meal_type,
            equipment,
            max_complexity,
            search,
        } => {
            let query = FoodQuery {
                skip,
                limit: Some(limit),
                meal_type,
                equipment,
                max_complexity,
                search,
            };
            for food in foods::api::list(http, &query).await? {
                let minutes = food
                    .total_time
                    .map(|m| format!("{m} min"))
                    .unwrap_or_default();
                println!("{:>6}  {:<40} {}", food.id, food.name, minutes);
            }
        }
        FoodsCmd::Show { id } => {
            let food = foods::api::get(http, id).await?;
            print_json(&food)?;
            for (i, step) in food.steps().iter().enumerate() {
                println!("{}. {step}", i + 1);
            }
        }
        FoodsCmd::Create(args) => {
            let input = FoodInput::from(args);
            let food = foods::api::create(http, &input).await?;
            println!("created food #{}", food.id);
        }
        FoodsCmd::Update { id, fields } => {
            let food = foods::api::update(http, id, &fields.into()).await?;
            print_json(&food)?;
        }
        FoodsCmd::Delete { id } => {
            foods::api::delete(http, id).await?;
            println!("deleted food #{id}");
        }
    }
    Ok(())
}

async fn meals_cmd(cmd: MealsCmd, ctx: &mut AppContext) -> anyhow::Result<()> {
    if let MealsCmd::Show { id } = cmd {
        let detail = meals::api::detail(&ctx.http, id).await?;
        return print_json(&detail);
    }

    let coll = &mut ctx.meals;
    coll.load(&ctx.http, None).await?;
    match cmd {
        MealsCmd::List(filter) => {
            coll.filter = MealFilter::from(&filter);
            for r in coll.visible() {
                let day = r.date.map(|d| d.to_string()).unwrap_or_else(|| "undated".into());
                let kcal = aggregate::NutritionTotals::of_record(r).calories;
                println!(
                    "{:>6}  {day:<10}  {:<9}  {:<32} {kcal:>6.0} kcal",
                    r.id,
                    r.meal_type,
                    r.dish_name.as_deref().unwrap_or("-"),
                );
            }
        }
        MealsCmd::Totals { filter, ids } => {
            coll.filter = MealFilter::from(&filter);
            if ids.is_empty() {
                coll.toggle_all_visible();
            } else {
                let visible: BTreeSet<i64> = coll.visible().iter().map(|r| r.id).collect();
                for id in ids {
                    if visible.contains(&id) {
                        coll.selection.toggle(id);
                    } else {
                        warn!(id, "meal not in the filtered list; skipped");
                    }
                }
            }
            if coll.selection.is_empty() {
                bail!("no meals selected");
            }
            let selected = coll.selection.selected(coll.records());
            for part in aggregate::breakdown(selected.iter().copied()) {
                println!(
                    "{:>6}  {:<32} {:>6.0} kcal",
                    part.id,
                    part.dish_name.as_deref().unwrap_or("-"),
                    part.totals.calories
                );
            }
            print_totals(&coll.selected_totals());
        }
        MealsCmd::Day { day } => {
            let day = if day.eq_ignore_ascii_case("undated") {
                Day::Undated
            } else {
                Day::On(parse_date(&day).map_err(anyhow::Error::msg)?)
            };
            for meal_type in MealType::ALL {
                let records = records_for(coll.records(), day, meal_type);
                if records.is_empty() {
                    continue;
                }
                println!("{meal_type}:");
                for r in &records {
                    println!("  #{} {}", r.id, r.dish_name.as_deref().unwrap_or("-"));
                }
                print_totals(&aggregate::totals(records));
            }
        }
        MealsCmd::Show { .. } => {}
    }
    Ok(())
}

fn print_totals(t: &aggregate::NutritionTotals) {
    let m = t.macros();
    println!(
        "total {:.0} kcal | protein {:.1} g ({:.0}%) | carbs {:.1} g ({:.0}%) | fat {:.1} g ({:.0}%) | fiber {:.1} g | sodium {:.0} mg",
        t.calories, t.protein, m.protein_pct, t.carbs, m.carbs_pct, t.fat, m.fat_pct, t.fiber, t.sodium
    );
}

async fn chat(
    ctx: &AppContext,
    query: &str,
    image: Option<PathBuf>,
    new_thread: bool,
) -> anyhow::Result<()> {
    let chat = ctx.chat.clone();
    if new_thread {
        chat.reset().await?;
    }
    let image = match image {
        Some(path) => Some(ImageUpload::from_path(&path).await?),
        None => None,
    };

    let interrupt = {
        let chat = chat.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                chat.cancel();
            }
        })
    };

    let mut stdout = std::io::stdout();
    let mut streamed = false;
    let mut write_err: Option<std::io::Error> = None;
    let reply = chat
        .send(query, image, |event| match event {
            StreamEvent::Token(t) if write_err.is_none() => {
                streamed = true;
                if let Err(e) = write!(stdout, "{t}").and_then(|()| stdout.flush()) {
                    warn!(error = %e, "stdout closed; stopping reply");
                    write_err = Some(e);
                    chat.cancel();
                }
            }
            StreamEvent::Progress {
                message: Some(m), ..
            } => info!(progress = %m),
            StreamEvent::Warning(w) => warn!(warning = %w),
            _ => {}
        })
        .await;
    interrupt.abort();
    let reply = reply?;
    if let Some(e) = write_err {
        return Err(e).context("write reply to stdout");
    }

    if streamed {
        println!();
    } else {
        println!("{}", reply.text);
    }
    if let Some(id) = &reply.thread_id {
        info!(thread_id = %id, "conversation thread");
    }
    Ok(())
}
