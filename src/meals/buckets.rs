use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::Serialize;
use time::Date;

use super::dto::MealType;
use super::record::MealRecord;

/// Calendar day of a record. Records without a usable timestamp share the
/// `Undated` bucket, which sorts after every real day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Day {
    On(Date),
    Undated,
}

impl Day {
    pub fn of(record: &MealRecord) -> Self {
        record.date.map_or(Self::Undated, Self::On)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BucketKey {
    pub day: Day,
    pub meal_type: MealType,
}

impl BucketKey {
    pub fn of(record: &MealRecord) -> Self {
        Self {
            day: Day::of(record),
            meal_type: record.meal_type,
        }
    }
}

/// Groups records by (day, meal type). Each record lands in exactly one
/// bucket; order inside a bucket follows the input.
pub fn partition(records: &[MealRecord]) -> BTreeMap<BucketKey, Vec<&MealRecord>> {
    let mut buckets: BTreeMap<BucketKey, Vec<&MealRecord>> = BTreeMap::new();
    for r in records {
        buckets.entry(BucketKey::of(r)).or_default().push(r);
    }
    buckets
}

pub fn records_for(records: &[MealRecord], day: Day, meal_type: MealType) -> Vec<&MealRecord> {
    records
        .iter()
        .filter(|r| Day::of(r) == day && r.meal_type == meal_type)
        .collect()
}

/// Collection filter bar: inclusive day range plus an optional meal type
/// (`None` means all).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MealFilter {
    pub start: Option<Date>,
    pub end: Option<Date>,
    pub meal_type: Option<MealType>,
}

impl MealFilter {
    pub fn matches(&self, record: &MealRecord) -> bool {
        if let Some(t) = self.meal_type {
            if record.meal_type != t {
                return false;
            }
        }
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        // a date bound never matches an undated record
        let Some(day) = record.date else {
            return false;
        };
        self.start.map_or(true, |s| day >= s) && self.end.map_or(true, |e| day <= e)
    }

    /// Matching records, newest day first; undated ones go last. Ties keep
    /// input order.
    pub fn apply<'a>(&self, records: &'a [MealRecord]) -> Vec<&'a MealRecord> {
        let mut out: Vec<&MealRecord> = records.iter().filter(|r| self.matches(r)).collect();
        out.sort_by_key(|r| (r.date.is_none(), Reverse(r.date)));
        out
    }
}
