use std::sync::Arc;

use anyhow::Context;

use crate::advice::ChatSession;
use crate::auth::AuthState;
use crate::config::AppConfig;
use crate::http::HttpClient;
use crate::meals::MealCollection;
use crate::profile::ProfileState;
use crate::store::{FileStore, KeyValueStore};

/// Everything a command works with: config, the persisted store, the HTTP
/// client and the state containers built on top of it.
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn KeyValueStore>,
    pub http: HttpClient,
    pub auth: AuthState,
    pub profile: ProfileState,
    pub meals: MealCollection,
    pub chat: Arc<ChatSession>,
}

impl AppContext {
    /// Opens the state file and restores a saved session, if any.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(FileStore::new(&config.state_file)) as Arc<dyn KeyValueStore>;
        let mut ctx = Self::from_parts(Arc::new(config), store)?;
        ctx.auth.hydrate().await;
        Ok(ctx)
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let http = HttpClient::new(&config, store.clone()).context("build http client")?;
        Ok(Self {
            auth: AuthState::new(http.clone(), config.cookie_ttl()),
            profile: ProfileState::new(http.clone()),
            meals: MealCollection::new(),
            chat: Arc::new(ChatSession::new(http.clone())),
            http,
            store,
            config,
        })
    }

    /// Logs out and drops every container's data.
    pub async fn logout(&mut self) -> anyhow::Result<()> {
        self.chat.cancel();
        self.auth.logout().await.context("clear stored session")?;
        self.profile.clear();
        self.meals = MealCollection::new();
        Ok(())
    }
}
