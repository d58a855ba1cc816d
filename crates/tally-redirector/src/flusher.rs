use dashmap::DashMap;
use jiff::{SignedDuration, Timestamp};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tally_core::counter::visit_counter_key;
use tally_core::{Clock, CounterCache, LinkStore, ShortCode};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Tally of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Counters written to the store.
    pub flushed: usize,
    /// Codes whose counter had already left the cache; nothing to write.
    pub vacant: usize,
    /// Codes kept for another attempt because the cache or store failed.
    pub failed: usize,
}

/// Catch-up flushes for codes whose flush window is closing.
///
/// Every time a window opens for a code, the aggregator schedules that
/// code here with the window's deadline. Once the deadline has passed, a
/// flush pass reads the code's counter and writes it to the store. The
/// counter outlives the window by the configured grace period, so the pass
/// still finds it even when no visit arrives after the window closed.
///
/// Failed attempts stay scheduled and are retried on the next pass.
pub struct WindowFlusher<C, S> {
    cache: Arc<C>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    pending: DashMap<ShortCode, Timestamp>,
}

enum Attempt {
    Flushed(u64),
    Vacant,
    Failed,
}

impl<C: CounterCache, S: LinkStore> WindowFlusher<C, S> {
    pub fn new(cache: Arc<C>, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            store,
            clock,
            pending: DashMap::new(),
        }
    }

    /// Schedules a catch-up flush of `code` once `after` has elapsed.
    ///
    /// A code has at most one pending flush; scheduling again replaces
    /// the earlier deadline.
    pub fn schedule(&self, code: &ShortCode, after: Duration) {
        let now = self.clock.now();
        let deadline = SignedDuration::try_from(after)
            .ok()
            .and_then(|after| now.checked_add(after).ok())
            .unwrap_or(Timestamp::MAX);

        trace!(code = %code, deadline = %deadline, "Scheduled catch-up flush");
        self.pending.insert(code.clone(), deadline);
    }

    /// Number of codes waiting for a catch-up flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flushes every code whose deadline has passed.
    pub async fn flush_due(&self) -> FlushReport {
        let now = self.clock.now();
        self.flush_matching(|deadline| deadline <= now).await
    }

    /// Flushes every pending code regardless of its deadline.
    ///
    /// Counters are running totals, so flushing early is always safe.
    pub async fn flush_all(&self) -> FlushReport {
        self.flush_matching(|_| true).await
    }

    /// Runs flush passes every `tick` until `shutdown` resolves, then
    /// flushes everything still pending.
    ///
    /// Each tick also asks the cache to drop counters whose TTL lapsed.
    pub async fn run<F>(&self, tick: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let report = self.flush_due().await;
                    if report != FlushReport::default() {
                        debug!(
                            flushed = report.flushed,
                            vacant = report.vacant,
                            failed = report.failed,
                            "Catch-up flush pass finished"
                        );
                    }
                    self.sweep().await;
                }
            }
        }

        let report = self.flush_all().await;
        info!(
            flushed = report.flushed,
            failed = report.failed,
            "Flushed pending visit counts on shutdown"
        );
    }

    async fn sweep(&self) {
        match self.cache.sweep_expired().await {
            Ok(0) => {}
            Ok(swept) => trace!(swept, "Swept expired cache entries"),
            Err(e) => warn!(error = %e, "Failed to sweep expired cache entries"),
        }
    }

    async fn flush_matching(&self, due: impl Fn(Timestamp) -> bool) -> FlushReport {
        let ready: Vec<(ShortCode, Timestamp)> = self
            .pending
            .iter()
            .filter(|entry| due(*entry.value()))
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let mut report = FlushReport::default();
        for (code, deadline) in ready {
            match self.attempt(&code).await {
                Attempt::Flushed(count) => {
                    debug!(code = %code, count, "Catch-up flush wrote visit count");
                    report.flushed += 1;
                }
                Attempt::Vacant => {
                    trace!(code = %code, "Counter already evicted, nothing to flush");
                    report.vacant += 1;
                }
                Attempt::Failed => {
                    report.failed += 1;
                    continue;
                }
            }

            // A new window may have rescheduled the code meanwhile.
            self.pending
                .remove_if(&code, |_, scheduled| *scheduled == deadline);
        }

        report
    }

    async fn attempt(&self, code: &ShortCode) -> Attempt {
        let count = match self.cache.get(&visit_counter_key(code)).await {
            Ok(Some(count)) => count,
            Ok(None) => return Attempt::Vacant,
            Err(e) => {
                warn!(code = %code, error = %e, "Cache error during catch-up flush, will retry");
                return Attempt::Failed;
            }
        };

        match self.store.store_visit_count(code, count).await {
            Ok(()) => Attempt::Flushed(count),
            Err(e) => {
                warn!(code = %code, count, error = %e, "Failed to store visit count, will retry");
                Attempt::Failed
            }
        }
    }
}

impl<C, S> std::fmt::Debug for WindowFlusher<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowFlusher")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
