pub mod advice;
pub mod auth;
pub mod config;
pub mod error;
pub mod foods;
pub mod http;
pub mod meals;
pub mod profile;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::{ApiError, ClientError, ClientResult, ParseError};
pub use state::AppContext;
