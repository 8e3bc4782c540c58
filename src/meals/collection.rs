use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::aggregate::NutritionTotals;
use super::api::{self, ImageUpload};
use super::buckets::MealFilter;
use super::dto::{MealQuery, MealType, UploadAndAnalyzeResponse};
use super::record::MealRecord;
use super::selection::Selection;
use crate::error::ClientResult;
use crate::http::HttpClient;

pub const HISTORY_LIMIT: u32 = 100;
pub const LOAD_FAILED: &str = "Failed to load your meal history. Please try again.";

/// The user's meal log with the current filter and selection.
#[derive(Debug, Default)]
pub struct MealCollection {
    records: Vec<MealRecord>,
    pub filter: MealFilter,
    pub selection: Selection,
    is_loading: bool,
    error: Option<String>,
}

impl MealCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<MealRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[MealRecord] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Replaces the records with the latest history page.
    #[instrument(skip(self, http))]
    pub async fn load(&mut self, http: &HttpClient, meal_type: Option<MealType>) -> ClientResult<()> {
        self.is_loading = true;
        self.error = None;
        let query = MealQuery {
            meal_type,
            skip: None,
            limit: Some(HISTORY_LIMIT),
        };
        let result = api::history(http, &query).await;
        self.is_loading = false;
        match result {
            Ok(page) => {
                info!(total = page.total, received = page.meals.len(), "meal history loaded");
                self.records = page.meals.into_iter().map(MealRecord::from).collect();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "meal history failed");
                self.error = Some(LOAD_FAILED.to_string());
                Err(e)
            }
        }
    }

    /// Uploads and analyzes a photo, then puts the new record first.
    #[instrument(skip(self, http, image))]
    pub async fn upload(
        &mut self,
        http: &HttpClient,
        image: ImageUpload,
        meal_type: MealType,
        meal_time: Option<&str>,
        timeout: Duration,
    ) -> ClientResult<UploadAndAnalyzeResponse> {
        let resp = api::upload_and_analyze(http, image, meal_type, meal_time, timeout).await?;
        let today = OffsetDateTime::now_utc().date();
        self.push_upload(MealRecord::from_upload(&resp, meal_type, meal_time, today));
        Ok(resp)
    }

    pub fn push_upload(&mut self, record: MealRecord) {
        self.records.insert(0, record);
    }

    /// Drops a record locally; the server keeps it.
    pub fn remove(&mut self, id: i64) -> Option<MealRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        if self.selection.contains(id) {
            self.selection.toggle(id);
        }
        Some(self.records.remove(pos))
    }

    pub fn visible(&self) -> Vec<&MealRecord> {
        self.filter.apply(&self.records)
    }

    pub fn toggle_all_visible(&mut self) {
        let visible = self.filter.apply(&self.records);
        self.selection.toggle_all(&visible);
    }

    pub fn selected_totals(&self) -> NutritionTotals {
        self.selection.totals(&self.records)
    }
}
