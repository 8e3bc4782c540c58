use std::collections::BTreeSet;

use super::aggregate::{totals, NutritionTotals};
use super::record::MealRecord;

/// Records picked for a combined nutrition analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection(BTreeSet<i64>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    /// Adds the id if absent, removes it otherwise. Returns whether it is now
    /// selected.
    pub fn toggle(&mut self, id: i64) -> bool {
        if self.0.remove(&id) {
            false
        } else {
            self.0.insert(id);
            true
        }
    }

    /// Selects every visible record, or clears the selection when it already
    /// has as many entries as there are visible records.
    pub fn toggle_all(&mut self, visible: &[&MealRecord]) {
        if self.0.len() == visible.len() {
            self.0.clear();
        } else {
            self.0 = visible.iter().map(|r| r.id).collect();
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Selected records, in the order of `records`.
    pub fn selected<'a>(&self, records: &'a [MealRecord]) -> Vec<&'a MealRecord> {
        records.iter().filter(|r| self.contains(r.id)).collect()
    }

    pub fn totals(&self, records: &[MealRecord]) -> NutritionTotals {
        totals(self.selected(records))
    }
}
