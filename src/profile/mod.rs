pub mod api;
pub mod dto;
pub mod state;

pub use dto::{ProfileFields, UserProfile};
pub use state::ProfileState;
