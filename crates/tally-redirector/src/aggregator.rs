use crate::flusher::WindowFlusher;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tally_core::counter::{visit_counter_key, window_marker_key};
use tally_core::{CacheError, Clock, CounterCache, LinkStore, ShortCode, SystemClock, VisitSettings};
use tracing::{debug, trace, warn};

/// Receives one call per successful redirect.
///
/// Recording never fails from the caller's point of view; implementations
/// degrade and log instead.
#[async_trait]
pub trait VisitRecorder: Send + Sync + 'static {
    /// Records a visit to `code`. `seed_count` is the durable count read
    /// together with the record and seeds the cache when it holds nothing
    /// for the code yet.
    async fn record_visit(&self, code: &ShortCode, seed_count: u64);
}

#[async_trait]
impl<T: VisitRecorder + ?Sized> VisitRecorder for Arc<T> {
    async fn record_visit(&self, code: &ShortCode, seed_count: u64) {
        (**self).record_visit(code, seed_count).await
    }
}

/// Why a visit wrote the running total through to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The count reached a multiple of the flush threshold.
    Threshold,
    /// This visit opened a new flush window.
    WindowOpened,
}

/// What a single recorded visit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Counted in the cache only.
    Counted { count: u64 },
    /// Counted in the cache and the total was written to the store.
    /// `persisted` is `false` if that write failed.
    Flushed {
        count: u64,
        trigger: FlushTrigger,
        persisted: bool,
    },
    /// The cache could not count the visit; it was added to the store
    /// directly. `persisted` is `false` if that failed too.
    Fallback { persisted: bool },
}

/// Counts visits in a [`CounterCache`] and writes them to a [`LinkStore`]
/// in batches.
///
/// The cache holds one counter per code, seeded from the durable count on
/// first use and kept alive for a window plus a grace period. A separate
/// marker key with the window's TTL tracks whether a window is open. The
/// running total is written to the store when the marker is created, on
/// every `flush_threshold`-th visit, and by the [`WindowFlusher`] once the
/// window has closed.
///
/// Store writes use [`LinkStore::store_visit_count`], which keeps the
/// larger of the stored and written counts, so flushes that arrive out of
/// order never lower a count.
///
/// Visits written straight to the store while the cache is failing are
/// also tallied per code. When the cache answers again and still holds the
/// code's counter, the tally is added to that counter so later flushes
/// include them. A counter that has to be reseeded starts from the durable
/// count, which already holds them, and the tally is dropped.
pub struct VisitAggregator<C, S> {
    cache: Arc<C>,
    store: Arc<S>,
    flusher: Arc<WindowFlusher<C, S>>,
    settings: VisitSettings,
    written_through: DashMap<ShortCode, u64>,
}

impl<C: CounterCache, S: LinkStore> VisitAggregator<C, S> {
    pub fn new(cache: C, store: S, settings: VisitSettings) -> Self {
        Self::with_clock(cache, store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(cache: C, store: S, settings: VisitSettings, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(cache);
        let store = Arc::new(store);
        let flusher = Arc::new(WindowFlusher::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            clock,
        ));

        Self {
            cache,
            store,
            flusher,
            settings,
            written_through: DashMap::new(),
        }
    }

    /// The flusher that closes this aggregator's windows. Drive it with
    /// [`WindowFlusher::run`] or call its flush methods directly.
    pub fn flusher(&self) -> Arc<WindowFlusher<C, S>> {
        Arc::clone(&self.flusher)
    }

    pub fn settings(&self) -> &VisitSettings {
        &self.settings
    }

    /// Visits to `code` written through to the store that its cached
    /// counter does not include yet.
    pub fn written_through(&self, code: &ShortCode) -> u64 {
        self.written_through.get(code).map_or(0, |n| *n)
    }

    /// Records one visit and reports what it did.
    pub async fn record(&self, code: &ShortCode, seed_count: u64) -> VisitOutcome {
        let (count, added) = match self.count_in_cache(code, seed_count).await {
            Ok(counted) => counted,
            Err(e) => {
                warn!(code = %code, error = %e, "Counter cache unavailable, writing visit through to the store");
                return self.fallback(code).await;
            }
        };

        let trigger = if self.open_window(code).await {
            Some(FlushTrigger::WindowOpened)
        } else if crossed_threshold(count, added, self.settings.flush_threshold) {
            Some(FlushTrigger::Threshold)
        } else {
            None
        };

        match trigger {
            Some(trigger) => {
                let persisted = self.flush(code, count, trigger).await;
                VisitOutcome::Flushed {
                    count,
                    trigger,
                    persisted,
                }
            }
            None => {
                trace!(code = %code, count, "Visit counted in cache");
                VisitOutcome::Counted { count }
            }
        }
    }

    /// Seeds the counter if needed and increments it, folding in any
    /// visits written through while the cache was failing.
    ///
    /// Returns the new count and how much was added to reach it. Nothing
    /// is written to the store if this fails, so the visit can still be
    /// counted by the fallback without being counted twice.
    async fn count_in_cache(
        &self,
        code: &ShortCode,
        seed_count: u64,
    ) -> Result<(u64, u64), CacheError> {
        let key = visit_counter_key(code);

        let carried = if self.cache.get(&key).await?.is_none() {
            // Concurrent first visits race here; only one seed wins.
            let seeded = self
                .cache
                .set_nx_with_ttl(&key, seed_count, self.settings.counter_ttl())
                .await?;
            if seeded {
                debug!(code = %code, seed_count, "Seeded visit counter from store");
            }
            // The durable count already holds the written-through visits.
            self.written_through.remove(code);
            0
        } else {
            self.written_through
                .remove(code)
                .map_or(0, |(_, carried)| carried)
        };

        let added = carried.saturating_add(1);
        match self.cache.incr_by(&key, added).await {
            Ok(count) => {
                if carried > 0 {
                    debug!(code = %code, carried, count, "Folded written-through visits into counter");
                }
                Ok((count, added))
            }
            Err(e) => {
                if carried > 0 {
                    *self.written_through.entry(code.clone()).or_insert(0) += carried;
                }
                Err(e)
            }
        }
    }

    /// Returns `true` if this visit opened a new flush window.
    async fn open_window(&self, code: &ShortCode) -> bool {
        let marker = window_marker_key(code);
        let opened = match self
            .cache
            .set_nx_with_ttl(&marker, 1, self.settings.window)
            .await
        {
            Ok(opened) => opened,
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to check flush window");
                return false;
            }
        };

        if opened {
            self.flusher.schedule(code, self.settings.window);

            // The counter must outlive the new marker.
            let counter = visit_counter_key(code);
            if let Err(e) = self
                .cache
                .expire(&counter, self.settings.counter_ttl())
                .await
            {
                warn!(code = %code, error = %e, "Failed to extend visit counter TTL");
            }
        }

        opened
    }

    async fn flush(&self, code: &ShortCode, count: u64, trigger: FlushTrigger) -> bool {
        match self.store.store_visit_count(code, count).await {
            Ok(()) => {
                debug!(code = %code, count, ?trigger, "Flushed visit count to store");
                true
            }
            Err(e) => {
                warn!(code = %code, count, ?trigger, error = %e, "Failed to flush visit count");
                false
            }
        }
    }

    async fn fallback(&self, code: &ShortCode) -> VisitOutcome {
        let persisted = match self.store.increment_visit_count(code).await {
            Ok(()) => {
                *self.written_through.entry(code.clone()).or_insert(0) += 1;
                true
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to record visit, it is lost");
                false
            }
        };
        VisitOutcome::Fallback { persisted }
    }
}

/// Whether raising a counter by `added` to reach `count` passed a multiple
/// of `threshold`.
fn crossed_threshold(count: u64, added: u64, threshold: u64) -> bool {
    count / threshold > count.saturating_sub(added) / threshold
}

#[async_trait]
impl<C: CounterCache, S: LinkStore> VisitRecorder for VisitAggregator<C, S> {
    async fn record_visit(&self, code: &ShortCode, seed_count: u64) {
        self.record(code, seed_count).await;
    }
}

impl<C, S> std::fmt::Debug for VisitAggregator<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitAggregator")
            .field("settings", &self.settings)
            .field("written_through", &self.written_through.len())
            .finish_non_exhaustive()
    }
}
