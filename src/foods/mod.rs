pub mod api;
pub mod dto;

pub use dto::{CatalogMealType, Equipment, Food, FoodInput, FoodQuery};
