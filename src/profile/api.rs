use reqwest::Method;
use tracing::instrument;

use super::dto::{ProfileFields, UserProfile};
use crate::error::ClientResult;
use crate::http::HttpClient;

const PROFILE_PATH: &str = "/profile/me";

#[instrument(skip(http))]
pub async fn get_my_profile(http: &HttpClient) -> ClientResult<UserProfile> {
    http.get(PROFILE_PATH, &(), "profile").await
}

#[instrument(skip(http, fields))]
pub async fn create_profile(http: &HttpClient, fields: &ProfileFields) -> ClientResult<UserProfile> {
    http.send_json(Method::POST, PROFILE_PATH, fields, "profile")
        .await
}

#[instrument(skip(http, fields))]
pub async fn update_profile(http: &HttpClient, fields: &ProfileFields) -> ClientResult<UserProfile> {
    http.send_json(Method::PUT, PROFILE_PATH, fields, "profile")
        .await
}

#[instrument(skip(http, fields))]
pub async fn partial_update_profile(
    http: &HttpClient,
    fields: &ProfileFields,
) -> ClientResult<UserProfile> {
    http.send_json(Method::PATCH, PROFILE_PATH, &fields.to_patch(), "profile")
        .await
}
