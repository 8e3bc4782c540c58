pub mod aggregate;
pub mod api;
pub mod buckets;
pub mod collection;
pub mod dto;
pub mod record;
pub mod selection;

pub use aggregate::{totals, MacroBreakdown, NutritionTotals};
pub use buckets::{partition, BucketKey, Day, MealFilter};
pub use collection::MealCollection;
pub use dto::{MealType, MealQuery};
pub use record::MealRecord;
pub use selection::Selection;
