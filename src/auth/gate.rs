use time::OffsetDateTime;

use super::session::ACCESS_COOKIE;
use crate::error::ClientResult;
use crate::store::{get_cookie, KeyValueStore};

pub const PROTECTED_PREFIX: &str = "/planner";
pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectToLogin { redirect: String },
    RedirectToPlanner,
}

fn is_protected(path: &str) -> bool {
    path.strip_prefix(PROTECTED_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Request-time gating on the presence of the access cookie.
pub fn gate(path: &str, has_cookie: bool) -> RouteDecision {
    if !has_cookie && is_protected(path) {
        return RouteDecision::RedirectToLogin {
            redirect: path.to_string(),
        };
    }
    if has_cookie && (path == LOGIN_PATH || path == REGISTER_PATH) {
        return RouteDecision::RedirectToPlanner;
    }
    RouteDecision::Allow
}

pub async fn gate_with_store(store: &dyn KeyValueStore, path: &str) -> ClientResult<RouteDecision> {
    let cookie = get_cookie(store, ACCESS_COOKIE, OffsetDateTime::now_utc()).await?;
    Ok(gate(path, cookie.is_some()))
}
