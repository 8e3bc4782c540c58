use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use tracing::{info, instrument};

use super::dto::{MealDetail, MealHistoryResponse, MealQuery, MealType, UploadAndAnalyzeResponse};
use crate::error::{ClientError, ClientResult};
use crate::http::HttpClient;

/// An image file ready to be sent as a multipart part.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub body: Bytes,
    pub content_type: &'static str,
}

impl ImageUpload {
    pub async fn from_path(path: &Path) -> ClientResult<Self> {
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_from_ext)
            .ok_or_else(|| {
                ClientError::Invalid(format!(
                    "{} is not a supported image (jpg, png, webp, heic)",
                    path.display()
                ))
            })?;
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::Invalid(format!("cannot read {}: {e}", path.display())))?;
        if body.is_empty() {
            return Err(ClientError::Invalid(format!("{} is empty", path.display())));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Self {
            file_name,
            body: Bytes::from(body),
            content_type,
        })
    }

    pub fn into_part(self) -> ClientResult<Part> {
        Ok(Part::bytes(self.body.to_vec())
            .file_name(self.file_name)
            .mime_str(self.content_type)?)
    }
}

fn mime_from_ext(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Uploads one meal photo and waits for the analysis. `meal_time` is an ISO
/// date-time; the server uses "now" when it is absent.
#[instrument(skip(http, image), fields(file = %image.file_name, size = image.body.len()))]
pub async fn upload_and_analyze(
    http: &HttpClient,
    image: ImageUpload,
    meal_type: MealType,
    meal_time: Option<&str>,
    timeout: Duration,
) -> ClientResult<UploadAndAnalyzeResponse> {
    let mut form = Form::new()
        .part("file", image.into_part()?)
        .text("meal_type", meal_type.as_str());
    if let Some(t) = meal_time {
        form = form.text("meal_time", t.to_string());
    }
    let resp: UploadAndAnalyzeResponse = http
        .post_multipart("/analyze/upload-and-analyze-image", form, timeout, "analysis")
        .await?;
    info!(
        meal_id = resp.meal_id,
        dish = %resp.analysis.dish_name,
        is_food = resp.analysis.safety.is_food,
        "meal analyzed"
    );
    Ok(resp)
}

#[instrument(skip(http))]
pub async fn history(http: &HttpClient, query: &MealQuery) -> ClientResult<MealHistoryResponse> {
    http.get("/analyze/meals", query, "meal history").await
}

#[instrument(skip(http))]
pub async fn detail(http: &HttpClient, meal_id: i64) -> ClientResult<MealDetail> {
    http.get(&format!("/analyze/meals/{meal_id}"), &(), "meal detail").await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{extract::Multipart, routing::post, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::error::ApiError;
    use crate::test_support::{http_for, spawn_backend};

    fn analysis_body() -> serde_json::Value {
        json!({
            "meal_id": 11,
            "upload": {"url": "https://img/11.jpg", "public_id": "p", "width": 10,
                       "height": 10, "format": "jpg", "size": 4},
            "analysis": {
                "safety": {"is_food": true, "is_potentially_poisonous": false,
                           "confidence": 0.9, "reason": ""},
                "dish_name": "Banh mi",
                "total_estimated_calories": 450.0,
                "ingredients": [
                    {"name": "bread", "estimated_weight": 80.0,
                     "nutrition": {"calories": 250.0, "protein": 8.0, "fat": 3.0,
                                   "carbs": 48.0, "fiber": 2.0, "sodium": 400.0}},
                    {"name": "pork", "estimated_weight": 60.0,
                     "nutrition": {"calories": 200.0, "protein": 16.0, "fat": 14.0,
                                   "carbs": 0.0, "fiber": 0.0, "sodium": 300.0}}
                ]
            },
            "nutrition_summary": {"total_calories": 450.0, "total_protein": 24.0}
        })
    }

    fn image() -> ImageUpload {
        ImageUpload {
            file_name: "lunch.jpg".into(),
            body: Bytes::from_static(b"\xff\xd8\xff\xe0"),
            content_type: "image/jpeg",
        }
    }

    #[tokio::test]
    async fn upload_sends_file_and_fields() {
        let seen: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let sink = seen.clone();
        let app = Router::new().route(
            "/analyze/upload-and-analyze-image",
            post(move |mut mp: Multipart| {
                let sink = sink.clone();
                async move {
                    while let Some(field) = mp.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_string();
                        let file = field.file_name().map(str::to_string);
                        let value = match file {
                            Some(f) => format!("{f}:{}", field.content_type().unwrap_or("")),
                            None => field.text().await.unwrap(),
                        };
                        sink.lock().unwrap().insert(name, value);
                    }
                    Json(analysis_body())
                }
            }),
        );
        let base = spawn_backend(app).await;
        let (http, _store) = http_for(&base);

        let resp = upload_and_analyze(
            &http,
            image(),
            MealType::Lunch,
            Some("2024-05-01T12:00:00"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(resp.meal_id, 11);
        assert_eq!(resp.analysis.ingredient_totals().protein, 24.0);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen["file"], "lunch.jpg:image/jpeg");
        assert_eq!(seen["meal_type"], "lunch");
        assert_eq!(seen["meal_time"], "2024-05-01T12:00:00");
    }

    #[tokio::test]
    async fn slow_analysis_times_out_as_no_response() {
        let app = Router::new().route(
            "/analyze/upload-and-analyze-image",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(analysis_body())
            }),
        );
        let base = spawn_backend(app).await;
        let (http, _store) = http_for(&base);

        let err = upload_and_analyze(&http, image(), MealType::Snack, None, Duration::from_millis(200))
            .await
            .unwrap_err();
        match err {
            ClientError::Api(api) => assert_eq!(api, ApiError::no_response()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn image_from_path_checks_extension() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("dinner.PNG");
        tokio::fs::write(&good, b"png-bytes").await.unwrap();
        let img = ImageUpload::from_path(&good).await.unwrap();
        assert_eq!(img.content_type, "image/png");
        assert_eq!(img.file_name, "dinner.PNG");

        let bad = dir.path().join("notes.txt");
        tokio::fs::write(&bad, b"hi").await.unwrap();
        assert!(matches!(
            ImageUpload::from_path(&bad).await,
            Err(ClientError::Invalid(_))
        ));
    }

    #[test]
    fn known_extensions_map_to_image_mime() {
        assert_eq!(mime_from_ext("jpg"), Some("image/jpeg"));
        assert_eq!(mime_from_ext("JPEG"), Some("image/jpeg"));
        assert_eq!(mime_from_ext("webp"), Some("image/webp"));
        assert_eq!(mime_from_ext("heic"), Some("image/heic"));
        assert_eq!(mime_from_ext("gif"), None);
    }
}
