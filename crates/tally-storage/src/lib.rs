//! Durable link stores for tally.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryLinkStore;
pub use mysql::MySqlLinkStore;
pub use tally_core::store::Result;
pub use tally_core::{LinkRecord, LinkStore, StorageError};
