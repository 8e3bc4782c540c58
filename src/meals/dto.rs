use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub const ALL: [MealType; 4] = [Self::Breakfast, Self::Lunch, Self::Dinner, Self::Snack];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown meal type `{lower}` (breakfast, lunch, dinner, snack)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub is_food: bool,
    pub is_potentially_poisonous: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sodium: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub estimated_weight: f64,
    #[serde(default)]
    pub nutrition: Nutrition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub safety: SafetyCheck,
    #[serde(default)]
    pub dish_name: String,
    #[serde(default)]
    pub total_estimated_calories: f64,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub public_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub size: u64,
}

/// Server-side totals. Any field may be missing on older records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionSummary {
    #[serde(default)]
    pub total_calories: Option<f64>,
    #[serde(default)]
    pub total_protein: Option<f64>,
    #[serde(default)]
    pub total_fat: Option<f64>,
    #[serde(default)]
    pub total_carbs: Option<f64>,
    #[serde(default)]
    pub total_fiber: Option<f64>,
    #[serde(default)]
    pub total_sodium: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadAndAnalyzeResponse {
    pub meal_id: i64,
    pub upload: Upload,
    pub analysis: Analysis,
    #[serde(default)]
    pub nutrition_summary: NutritionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealHistoryItem {
    pub id: i64,
    #[serde(default)]
    pub meal_name: Option<String>,
    pub meal_type: MealType,
    #[serde(default)]
    pub meal_time: Option<String>,
    #[serde(default)]
    pub image_url: String,
    pub analysis_status: AnalysisStatus,
    #[serde(default)]
    pub nutrition_summary: Option<NutritionSummary>,
    #[serde(default)]
    pub items_count: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealHistoryResponse {
    pub total: u64,
    pub skip: u32,
    pub limit: u32,
    pub meals: Vec<MealHistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealItem {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub estimated_weight: f64,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sodium: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealDetail {
    pub id: i64,
    #[serde(default)]
    pub meal_name: Option<String>,
    pub meal_type: MealType,
    #[serde(default)]
    pub meal_time: Option<String>,
    #[serde(default)]
    pub image_url: String,
    pub analysis_status: AnalysisStatus,
    #[serde(default)]
    pub nutrition_summary: Option<NutritionSummary>,
    #[serde(default)]
    pub items: Vec<MealItem>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Query string for `GET /analyze/meals`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MealQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}
