use reqwest::Method;
use tracing::instrument;

use super::dto::{Food, FoodInput, FoodQuery};
use crate::error::{ClientError, ClientResult};
use crate::http::HttpClient;

#[instrument(skip(http))]
pub async fn list(http: &HttpClient, query: &FoodQuery) -> ClientResult<Vec<Food>> {
    http.get("/foods/", query, "food list").await
}

#[instrument(skip(http))]
pub async fn get(http: &HttpClient, food_id: i64) -> ClientResult<Food> {
    http.get(&format!("/foods/{food_id}"), &(), "food").await
}

#[instrument(skip(http, input))]
pub async fn create(http: &HttpClient, input: &FoodInput) -> ClientResult<Food> {
    input.check_create().map_err(ClientError::Invalid)?;
    http.send_json(Method::POST, "/foods/", input, "food").await
}

#[instrument(skip(http, input))]
pub async fn update(http: &HttpClient, food_id: i64, input: &FoodInput) -> ClientResult<Food> {
    http.send_json(Method::PUT, &format!("/foods/{food_id}"), input, "food").await
}

#[instrument(skip(http))]
pub async fn delete(http: &HttpClient, food_id: i64) -> ClientResult<()> {
    http.delete(&format!("/foods/{food_id}")).await
}
