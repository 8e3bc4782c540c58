pub mod api;
pub mod claims;
pub mod dto;
pub mod gate;
pub mod services;
pub mod session;

pub use dto::User;
pub use gate::{gate, RouteDecision};
pub use session::{AuthState, Session, ACCESS_COOKIE};
