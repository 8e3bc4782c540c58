use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::api;
use super::claims::{peek_claims, TokenClaims};
use super::dto::{LoginRequest, RegisterRequest, User};
use super::services::{check_credentials, normalize_email};
use crate::error::{ClientError, ClientResult};
use crate::http::HttpClient;
use crate::store::{delete_cookie, set_cookie, TOKEN_KEY};

/// Cookie read by route gating.
pub const ACCESS_COOKIE: &str = "access_token";

/// Token held after login, with the identity it resolved to.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub claims: Option<TokenClaims>,
    pub user: Option<User>,
}

impl Session {
    fn new(token: String) -> Self {
        let claims = peek_claims(&token).ok();
        Self {
            token,
            claims,
            user: None,
        }
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.claims.as_ref().and_then(TokenClaims::expires_at)
    }
}

/// Authentication container: current session plus loading/error flags.
pub struct AuthState {
    http: HttpClient,
    cookie_ttl: time::Duration,
    session: Option<Session>,
    registered: Option<User>,
    is_loading: bool,
    error: Option<String>,
}

impl AuthState {
    pub fn new(http: HttpClient, cookie_ttl: time::Duration) -> Self {
        Self {
            http,
            cookie_ttl,
            session: None,
            registered: None,
            is_loading: false,
            error: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().and_then(|s| s.user.as_ref())
    }

    pub fn registered(&self) -> Option<&User> {
        self.registered.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Creates the account. Does not log in.
    #[instrument(skip(self, password))]
    pub async fn register(&mut self, email: &str, password: &str) -> ClientResult<User> {
        self.is_loading = true;
        self.error = None;
        let result = self.do_register(email, password).await;
        self.is_loading = false;
        match result {
            Ok(user) => {
                info!(user_id = user.id, email = %user.email, "user registered");
                self.registered = Some(user.clone());
                Ok(user)
            }
            Err(e) => Err(self.fail(e, "Registration failed")),
        }
    }

    async fn do_register(&self, email: &str, password: &str) -> ClientResult<User> {
        let email = normalize_email(email);
        check_credentials(&email, password, true)?;
        let req = RegisterRequest {
            email,
            password: password.to_string(),
        };
        api::register(&self.http, &req).await
    }

    /// Exchanges credentials for a token, persists it (store + cookie) and
    /// resolves the user behind it.
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<&Session> {
        self.is_loading = true;
        self.error = None;
        let result = self.do_login(email, password).await;
        self.is_loading = false;
        match result {
            Ok(session) => {
                if let Some(user) = &session.user {
                    info!(user_id = user.id, email = %user.email, "user logged in");
                }
                Ok(&*self.session.insert(session))
            }
            Err(e) => {
                self.session = None;
                Err(self.fail(e, "Login failed"))
            }
        }
    }

    async fn do_login(&self, email: &str, password: &str) -> ClientResult<Session> {
        let email = normalize_email(email);
        check_credentials(&email, password, false)?;
        let req = LoginRequest {
            email,
            password: password.to_string(),
        };
        let token = api::login(&self.http, &req).await?.access_token;

        let store = self.http.store();
        store.set(TOKEN_KEY, &token).await?;
        set_cookie(store.as_ref(), ACCESS_COOKIE, &token, self.cookie_ttl).await?;

        let mut session = Session::new(token);
        match api::me(&self.http).await {
            Ok(user) => {
                session.user = Some(user);
                Ok(session)
            }
            Err(e) => {
                // a token that cannot resolve a user is not kept around
                self.forget_token().await?;
                Err(e)
            }
        }
    }

    /// Loads a persisted token and confirms it with `/auth/me`. Any failure
    /// leaves the state logged out; it is never an error for the caller.
    #[instrument(skip(self))]
    pub async fn hydrate(&mut self) -> bool {
        let token = match self.http.store().get(TOKEN_KEY).await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return false,
            Err(e) => {
                warn!(error = %e, "could not read persisted token");
                return false;
            }
        };

        self.session = Some(Session::new(token));
        self.is_loading = true;
        let result = api::me(&self.http).await;
        self.is_loading = false;
        match result {
            Ok(user) => {
                info!(user_id = user.id, "session restored");
                if let Some(session) = self.session.as_mut() {
                    session.user = Some(user);
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "stored token rejected; continuing logged out");
                self.session = None;
                false
            }
        }
    }

    /// Clears the persisted token and cookie and resets in-memory state.
    #[instrument(skip(self))]
    pub async fn logout(&mut self) -> ClientResult<()> {
        self.session = None;
        self.error = None;
        self.forget_token().await?;
        info!("logged out");
        Ok(())
    }

    async fn forget_token(&self) -> ClientResult<()> {
        let store = self.http.store();
        store.remove(TOKEN_KEY).await?;
        delete_cookie(store.as_ref(), ACCESS_COOKIE).await?;
        Ok(())
    }

    fn fail(&mut self, err: ClientError, fallback: &str) -> ClientError {
        let message = err.to_string();
        self.error = Some(if message.is_empty() {
            fallback.to_string()
        } else {
            message
        });
        err
    }
}
