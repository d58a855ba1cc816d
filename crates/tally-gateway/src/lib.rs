//! HTTP surface of tally: redirects plus a small link-management API.

pub mod app;
pub mod error;
pub mod handlers;
pub mod model;
pub mod state;

pub use app::App;
pub use error::{AppError, Result};
pub use state::AppState;
