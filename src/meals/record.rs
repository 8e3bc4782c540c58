use serde::Serialize;
use time::{macros::format_description, Date};

use super::dto::{
    AnalysisStatus, MealHistoryItem, MealType, NutritionSummary, UploadAndAnalyzeResponse,
};

/// Nutrition as carried by one record; any field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RecordNutrition {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub fiber: Option<f64>,
    pub sodium: Option<f64>,
}

impl From<&NutritionSummary> for RecordNutrition {
    fn from(s: &NutritionSummary) -> Self {
        Self {
            calories: s.total_calories,
            protein: s.total_protein,
            carbs: s.total_carbs,
            fat: s.total_fat,
            fiber: s.total_fiber,
            sodium: s.total_sodium,
        }
    }
}

/// One logged meal as the collection view works with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealRecord {
    pub id: i64,
    pub image_url: String,
    /// Calendar day of `meal_time`; `None` when missing or unparseable.
    pub date: Option<Date>,
    pub meal_type: MealType,
    pub nutrition: Option<RecordNutrition>,
    pub status: AnalysisStatus,
    pub dish_name: Option<String>,
    pub created_at: Option<String>,
}

impl MealRecord {
    pub fn is_analyzed(&self) -> bool {
        self.status == AnalysisStatus::Completed
    }

    /// Record for a fresh upload. The day is taken from `meal_time` when it
    /// was supplied, else `today`.
    pub fn from_upload(
        resp: &UploadAndAnalyzeResponse,
        meal_type: MealType,
        meal_time: Option<&str>,
        today: Date,
    ) -> Self {
        let date = match meal_time {
            Some(t) => parse_day(t),
            None => Some(today),
        };
        Self {
            id: resp.meal_id,
            image_url: resp.upload.url.clone(),
            date,
            meal_type,
            nutrition: Some(RecordNutrition::from(&resp.nutrition_summary)),
            status: AnalysisStatus::Completed,
            dish_name: Some(resp.analysis.dish_name.clone()).filter(|n| !n.is_empty()),
            created_at: None,
        }
    }
}

impl From<MealHistoryItem> for MealRecord {
    fn from(item: MealHistoryItem) -> Self {
        Self {
            id: item.id,
            image_url: item.image_url,
            date: item.meal_time.as_deref().and_then(parse_day),
            meal_type: item.meal_type,
            nutrition: item.nutrition_summary.as_ref().map(RecordNutrition::from),
            status: item.analysis_status,
            dish_name: item.meal_name,
            created_at: item.created_at,
        }
    }
}

/// Calendar day of an ISO date or date-time (`2024-05-01`,
/// `2024-05-01T08:30:00`, `2024-05-01 08:30:00+02:00`). The date part is
/// taken as written, without timezone conversion.
pub fn parse_day(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    let head = raw.get(..10)?;
    match raw.as_bytes().get(10) {
        None | Some(b'T') | Some(b't') | Some(b' ') => {}
        Some(_) => return None,
    }
    Date::parse(head, format_description!("[year]-[month]-[day]")).ok()
}
