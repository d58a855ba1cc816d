//! Counter cache implementations for tally.
//!
//! - [`RedisCounterCache`] is the shared production backend.
//! - [`InMemoryCounterCache`] keeps counters in-process, for single-node
//!   deployments and tests.
//! - [`TimeoutCache`] wraps either one and bounds every call.

pub mod memory;
pub mod redis;
pub mod timeout;

pub use memory::InMemoryCounterCache;
pub use self::redis::RedisCounterCache;
pub use tally_core::counter::Result;
pub use tally_core::{CacheError, CounterCache};
pub use timeout::TimeoutCache;
