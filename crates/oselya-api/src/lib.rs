pub mod auth;
pub mod chat;
pub mod clock;
pub mod error;
pub mod favorites;
pub mod listings;
pub mod middleware;
pub mod moderation;
pub mod negotiate;
pub mod notifications;
pub mod presence;
pub mod profiles;
pub mod reports;
pub mod routes;
pub mod throttle;

pub use auth::{AppState, AppStateInner};
pub use routes::router;
