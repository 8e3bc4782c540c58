use reqwest::multipart::Form;

use crate::error::{ClientError, ClientResult};
use crate::meals::api::ImageUpload;

/// One chat turn as sent to `POST /advice/stream`.
#[derive(Debug, Clone)]
pub struct AdviceRequest {
    pub thread_id: Option<String>,
    pub user_query: String,
    pub image: Option<ImageUpload>,
}

impl AdviceRequest {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            thread_id: None,
            user_query: user_query.into(),
            image: None,
        }
    }

    pub fn into_form(self) -> ClientResult<Form> {
        let query = self.user_query.trim();
        if query.is_empty() {
            return Err(ClientError::Invalid("Message cannot be empty".into()));
        }
        let mut form = Form::new().text("user_query", query.to_string());
        if let Some(id) = self.thread_id.filter(|id| !id.is_empty()) {
            form = form.text("thread_id", id);
        }
        if let Some(image) = self.image {
            form = form.part("img_file", image.into_part()?);
        }
        Ok(form)
    }
}
