mod health;
mod link;
mod redirect;

pub use health::health_handler;
pub use link::{
    create_link_handler, delete_link_handler, get_link_handler, list_links_handler,
    purge_expired_handler,
};
pub use redirect::redirect_handler;

use crate::error::{AppError, Result};
use tally_core::ShortCode;

/// A malformed code cannot name an existing link.
fn parse_code(raw: String) -> Result<ShortCode> {
    ShortCode::new(raw).map_err(|e| AppError::NotFound(e.to_string()))
}
