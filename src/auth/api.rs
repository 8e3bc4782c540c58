use reqwest::Method;
use tracing::instrument;

use super::dto::{LoginRequest, RegisterRequest, TokenResponse, User};
use crate::error::ClientResult;
use crate::http::HttpClient;

#[instrument(skip(http, req), fields(email = %req.email))]
pub async fn register(http: &HttpClient, req: &RegisterRequest) -> ClientResult<User> {
    http.send_json(Method::POST, "/auth/register", req, "user")
        .await
}

#[instrument(skip(http, req), fields(email = %req.email))]
pub async fn login(http: &HttpClient, req: &LoginRequest) -> ClientResult<TokenResponse> {
    http.send_json(Method::POST, "/auth/login", req, "token")
        .await
}

#[instrument(skip(http))]
pub async fn me(http: &HttpClient) -> ClientResult<User> {
    http.get("/auth/me", &(), "user").await
}
