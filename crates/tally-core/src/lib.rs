//! Core types and traits for the tally visit-counting redirector.
//!
//! This crate holds the domain types shared by every other crate: the
//! [`ShortCode`] key, the durable [`LinkRecord`], the [`LinkStore`] and
//! [`CounterCache`] contracts the aggregator is written against, and the
//! [`VisitSettings`] that tune it.

pub mod clock;
pub mod counter;
pub mod error;
pub mod generator;
pub mod link;
pub mod settings;
pub mod shortcode;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::CounterCache;
pub use generator::{CodeGenerator, RandomCodeGenerator};
pub use error::{CacheError, SettingsError, ShortCodeError, StorageError};
pub use link::LinkRecord;
pub use settings::VisitSettings;
pub use shortcode::ShortCode;
pub use store::LinkStore;
