//! Nutrition totals over a set of meal records.
//!
//! A field that a record does not carry contributes zero to the sum, so the
//! totals are always defined, even for an empty set.

use std::iter::Sum;
use std::ops::Add;

use serde::Serialize;

use super::dto::{Analysis, MealItem};
use super::record::{MealRecord, RecordNutrition};

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sodium: f64,
}

impl NutritionTotals {
    pub fn of(n: &RecordNutrition) -> Self {
        Self {
            calories: n.calories.unwrap_or(0.0),
            protein: n.protein.unwrap_or(0.0),
            carbs: n.carbs.unwrap_or(0.0),
            fat: n.fat.unwrap_or(0.0),
            fiber: n.fiber.unwrap_or(0.0),
            sodium: n.sodium.unwrap_or(0.0),
        }
    }

    pub fn of_record(record: &MealRecord) -> Self {
        record.nutrition.as_ref().map(Self::of).unwrap_or_default()
    }

    pub fn macros(&self) -> MacroBreakdown {
        MacroBreakdown::from_totals(self)
    }
}

impl Add for NutritionTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            carbs: self.carbs + rhs.carbs,
            fat: self.fat + rhs.fat,
            fiber: self.fiber + rhs.fiber,
            sodium: self.sodium + rhs.sodium,
        }
    }
}

impl Sum for NutritionTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<&MealItem> for NutritionTotals {
    fn from(item: &MealItem) -> Self {
        Self {
            calories: item.calories,
            protein: item.protein,
            carbs: item.carbs,
            fat: item.fat,
            fiber: item.fiber,
            sodium: item.sodium,
        }
    }
}

pub fn totals<'a, I>(records: I) -> NutritionTotals
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    records.into_iter().map(NutritionTotals::of_record).sum()
}

/// Share of calories coming from each macro, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroBreakdown {
    pub protein_pct: f64,
    pub carbs_pct: f64,
    pub fat_pct: f64,
}

impl MacroBreakdown {
    pub fn from_totals(t: &NutritionTotals) -> Self {
        if t.calories <= 0.0 {
            return Self::default();
        }
        Self {
            protein_pct: t.protein * KCAL_PER_G_PROTEIN / t.calories * 100.0,
            carbs_pct: t.carbs * KCAL_PER_G_CARBS / t.calories * 100.0,
            fat_pct: t.fat * KCAL_PER_G_FAT / t.calories * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub id: i64,
    pub dish_name: Option<String>,
    pub totals: NutritionTotals,
}

/// Each record's own totals, in input order.
pub fn breakdown<'a, I>(records: I) -> Vec<Contribution>
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    records
        .into_iter()
        .map(|r| Contribution {
            id: r.id,
            dish_name: r.dish_name.clone(),
            totals: NutritionTotals::of_record(r),
        })
        .collect()
}

impl Analysis {
    pub fn ingredient_totals(&self) -> NutritionTotals {
        self.ingredients
            .iter()
            .map(|i| NutritionTotals {
                calories: i.nutrition.calories,
                protein: i.nutrition.protein,
                carbs: i.nutrition.carbs,
                fat: i.nutrition.fat,
                fiber: i.nutrition.fiber,
                sodium: i.nutrition.sodium,
            })
            .sum()
    }
}
