//! Redirect resolution with batched visit counting.
//!
//! [`RedirectorService`] resolves short codes against a
//! [`LinkStore`](tally_core::LinkStore) and hands every successful redirect
//! to a [`VisitRecorder`]. The production recorder is [`VisitAggregator`]:
//! it counts visits in a [`CounterCache`](tally_core::CounterCache) and
//! writes the running total through to the store every
//! `flush_threshold` visits, at the start of every flush window, and once
//! more when the window closes (via [`WindowFlusher`]). When the cache is
//! unusable it writes each visit straight to the store instead.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally_core::{ShortCode, VisitSettings};
//! use tally_redirector::{RedirectorService, VisitAggregator};
//!
//! # async fn example(
//! #     store: Arc<dyn tally_core::LinkStore>,
//! #     cache: Arc<dyn tally_core::CounterCache>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let aggregator = VisitAggregator::new(cache, Arc::clone(&store), VisitSettings::default());
//! let service = RedirectorService::new(store, aggregator);
//!
//! let code = ShortCode::new("abc123")?;
//! let destination = service.resolve(&code).await?;
//! println!("Redirect to: {}", destination);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod error;
pub mod flusher;
pub mod redirector;
pub mod service;

pub use aggregator::{FlushTrigger, VisitAggregator, VisitOutcome, VisitRecorder};
pub use error::{RedirectorError, Result};
pub use flusher::{FlushReport, WindowFlusher};
pub use redirector::Redirector;
pub use service::{RedirectorService, VisitDispatch};
