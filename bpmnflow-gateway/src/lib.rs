pub mod app_state;
pub mod dto;
pub mod error;
pub mod idempotency;
pub mod routes;

pub use app_state::AppState;
pub use error::{AppError, AppResult};
pub use idempotency::{IdempotencyStore, MessageKey};
pub use routes::router;
