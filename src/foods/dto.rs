use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Meal-type filter accepted by the catalog (one more value than meal logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogMealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Dessert,
}

impl CatalogMealType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
            Self::Dessert => "dessert",
        }
    }
}

impl fmt::Display for CatalogMealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CatalogMealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            "snack" => Ok(Self::Snack),
            "dessert" => Ok(Self::Dessert),
            other => Err(format!(
                "unknown meal type `{other}` (breakfast, lunch, dinner, snack, dessert)"
            )),
        }
    }
}

/// Kitchen equipment a recipe may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equipment {
    Blender,
    Oven,
    Stove,
    SlowCooker,
    Toaster,
    FoodProcessor,
    Microwave,
    Grill,
}

impl Equipment {
    pub const ALL: [Equipment; 8] = [
        Self::Blender,
        Self::Oven,
        Self::Stove,
        Self::SlowCooker,
        Self::Toaster,
        Self::FoodProcessor,
        Self::Microwave,
        Self::Grill,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blender => "blender",
            Self::Oven => "oven",
            Self::Stove => "stove",
            Self::SlowCooker => "slow_cooker",
            Self::Toaster => "toaster",
            Self::FoodProcessor => "food_processor",
            Self::Microwave => "microwave",
            Self::Grill => "grill",
        }
    }
}

impl FromStr for Equipment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == lower)
            .ok_or_else(|| format!("unknown equipment `{lower}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub id: i64,
    pub order: i32,
    pub direction: String,
    pub food_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    #[serde(default)]
    pub raw_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub is_breakfast: bool,
    #[serde(default)]
    pub is_lunch: bool,
    #[serde(default)]
    pub is_dinner: bool,
    #[serde(default)]
    pub is_snack: bool,
    #[serde(default)]
    pub is_dessert: bool,
    #[serde(default)]
    pub needs_blender: bool,
    #[serde(default)]
    pub needs_oven: bool,
    #[serde(default)]
    pub needs_stove: bool,
    #[serde(default)]
    pub needs_slow_cooker: bool,
    #[serde(default)]
    pub needs_toaster: bool,
    #[serde(default)]
    pub needs_food_processor: bool,
    #[serde(default)]
    pub needs_microwave: bool,
    #[serde(default)]
    pub needs_grill: bool,
    #[serde(default)]
    pub complexity: Option<i32>,
    #[serde(default)]
    pub cook_time: Option<f64>,
    #[serde(default)]
    pub prep_time: Option<f64>,
    #[serde(default)]
    pub wait_time: Option<f64>,
    #[serde(default)]
    pub total_time: Option<f64>,
    #[serde(default)]
    pub grams: Option<f64>,
    #[serde(default)]
    pub grams_per_unit: Option<f64>,
    #[serde(default)]
    pub default_unit: Option<String>,
    #[serde(default)]
    pub unit_amount: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub direction: Vec<Direction>,
}

impl Food {
    pub fn meal_types(&self) -> Vec<CatalogMealType> {
        [
            (self.is_breakfast, CatalogMealType::Breakfast),
            (self.is_lunch, CatalogMealType::Lunch),
            (self.is_dinner, CatalogMealType::Dinner),
            (self.is_snack, CatalogMealType::Snack),
            (self.is_dessert, CatalogMealType::Dessert),
        ]
        .into_iter()
        .filter_map(|(on, t)| on.then_some(t))
        .collect()
    }

    pub fn equipment(&self) -> Vec<&'static str> {
        [
            (self.needs_blender, Equipment::Blender),
            (self.needs_oven, Equipment::Oven),
            (self.needs_stove, Equipment::Stove),
            (self.needs_slow_cooker, Equipment::SlowCooker),
            (self.needs_toaster, Equipment::Toaster),
            (self.needs_food_processor, Equipment::FoodProcessor),
            (self.needs_microwave, Equipment::Microwave),
            (self.needs_grill, Equipment::Grill),
        ]
        .into_iter()
        .filter_map(|(on, e)| on.then_some(e.as_str()))
        .collect()
    }

    /// Directions in cooking order.
    pub fn steps(&self) -> Vec<&str> {
        let mut dirs: Vec<&Direction> = self.direction.iter().collect();
        dirs.sort_by_key(|d| d.order);
        dirs.into_iter().map(|d| d.direction.as_str()).collect()
    }
}

/// Body for create/update; unset fields are left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_breakfast: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_lunch: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dinner: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_snack: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dessert: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_blender: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_oven: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_stove: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_slow_cooker: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_toaster: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_food_processor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_microwave: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_grill: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grams_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl FoodInput {
    /// Sets every `needs_*` flag: listed equipment on, the rest off.
    pub fn set_equipment(&mut self, needs: &[Equipment]) {
        let on = |e: Equipment| Some(needs.contains(&e));
        self.needs_blender = on(Equipment::Blender);
        self.needs_oven = on(Equipment::Oven);
        self.needs_stove = on(Equipment::Stove);
        self.needs_slow_cooker = on(Equipment::SlowCooker);
        self.needs_toaster = on(Equipment::Toaster);
        self.needs_food_processor = on(Equipment::FoodProcessor);
        self.needs_microwave = on(Equipment::Microwave);
        self.needs_grill = on(Equipment::Grill);
    }

    /// Create needs a name and the source `raw_id`; updates may send any subset.
    pub fn check_create(&self) -> Result<(), String> {
        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err("Food name is required".into());
        }
        if self.raw_id.is_none() {
            return Err("Food raw_id is required".into());
        }
        Ok(())
    }
}

/// Query string for `GET /foods/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FoodQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<CatalogMealType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_complexity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Food {
        serde_json::from_value(serde_json::json!({
            "id": 4, "raw_id": 10, "name": "Oat bowl",
            "is_breakfast": true, "is_snack": true,
            "needs_stove": true, "needs_blender": true,
            "complexity": 2, "total_time": 15, "image_url": null,
            "direction": [
                {"id": 2, "order": 2, "direction": "Top with fruit", "food_id": 4},
                {"id": 1, "order": 1, "direction": "Boil oats", "food_id": 4}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn flags_become_lists() {
        let food = sample();
        assert_eq!(
            food.meal_types(),
            vec![CatalogMealType::Breakfast, CatalogMealType::Snack]
        );
        assert_eq!(food.equipment(), vec!["blender", "stove"]);
    }

    #[test]
    fn steps_follow_order_field() {
        assert_eq!(sample().steps(), vec!["Boil oats", "Top with fruit"]);
    }

    #[test]
    fn meal_type_parses_case_insensitively() {
        assert_eq!("Dessert".parse::<CatalogMealType>(), Ok(CatalogMealType::Dessert));
        assert!("brunch".parse::<CatalogMealType>().is_err());
    }

    #[test]
    fn fractional_times_are_accepted() {
        let food: Food = serde_json::from_value(serde_json::json!({
            "id": 4, "raw_id": 10, "name": "Oat bowl",
            "cook_time": 10.0, "prep_time": 2.5, "total_time": 15.0, "direction": []
        }))
        .unwrap();
        assert_eq!(food.cook_time, Some(10.0));
        assert_eq!(food.prep_time, Some(2.5));
        assert_eq!(food.total_time, Some(15.0));
        assert_eq!(food.wait_time, None);
    }

    #[test]
    fn equipment_sets_all_flags() {
        let mut input = FoodInput::default();
        input.set_equipment(&["slow-cooker".parse().unwrap(), Equipment::Oven]);
        assert_eq!(input.needs_slow_cooker, Some(true));
        assert_eq!(input.needs_oven, Some(true));
        assert_eq!(input.needs_grill, Some(false));
        assert!("wok".parse::<Equipment>().is_err());
    }

    #[test]
    fn create_needs_name_and_raw_id() {
        let mut input = FoodInput {
            name: Some("Soup".into()),
            ..Default::default()
        };
        assert_eq!(input.check_create(), Err("Food raw_id is required".into()));
        input.raw_id = Some(77);
        assert_eq!(input.check_create(), Ok(()));
        input.name = Some("  ".into());
        assert!(input.check_create().is_err());
    }

    #[test]
    fn input_omits_unset_fields() {
        let input = FoodInput {
            name: Some("Soup".into()),
            raw_id: Some(77),
            complexity: Some(1),
            wait_time: Some(0.5),
            needs_oven: Some(true),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            serde_json::json!({
                "name": "Soup", "raw_id": 77, "needs_oven": true,
                "complexity": 1, "wait_time": 0.5
            })
        );
    }
}
