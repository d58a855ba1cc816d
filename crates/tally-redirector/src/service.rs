use crate::aggregator::VisitRecorder;
use crate::redirector::Redirector;
use crate::{RedirectorError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{Clock, LinkRecord, LinkStore, ShortCode, SystemClock};
use tracing::{debug, info, trace, warn};

/// How a redirect waits for its visit to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitDispatch {
    /// Spawn the recording and return at once.
    #[default]
    Detached,
    /// Wait for the recording for at most the given duration, then leave
    /// it running in the background.
    WaitUpTo(Duration),
}

/// Resolves short codes and records a visit for every redirect.
pub struct RedirectorService<S, V> {
    store: Arc<S>,
    recorder: Arc<V>,
    dispatch: VisitDispatch,
    clock: Arc<dyn Clock>,
}

impl<S, V> Clone for RedirectorService<S, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            recorder: Arc::clone(&self.recorder),
            dispatch: self.dispatch,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, V> std::fmt::Debug for RedirectorService<S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectorService")
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

impl<S: LinkStore, V: VisitRecorder> RedirectorService<S, V> {
    pub fn new(store: S, recorder: V) -> Self {
        Self {
            store: Arc::new(store),
            recorder: Arc::new(recorder),
            dispatch: VisitDispatch::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_dispatch(mut self, dispatch: VisitDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn resolve(&self, code: &ShortCode) -> Result<String> {
        Redirector::resolve(self, code).await
    }

    pub async fn inspect(&self, code: &ShortCode) -> Result<LinkRecord> {
        Redirector::inspect(self, code).await
    }

    /// Fetches a record and enforces its expiry.
    ///
    /// An expired record is deleted and reported as `Gone`. A failed delete
    /// is only logged; the next lookup will find the record expired again.
    async fn lookup_active(&self, code: &ShortCode) -> Result<LinkRecord> {
        let Some(record) = self.store.get(code).await? else {
            trace!(code = %code, "Short code not found");
            return Err(RedirectorError::NotFound(code.to_string()));
        };

        if record.is_expired_at(self.clock.now()) {
            debug!(code = %code, "Record has expired, deleting");
            if let Err(e) = self.store.delete(code).await {
                warn!(code = %code, error = %e, "Failed to delete expired record");
            }
            return Err(RedirectorError::Gone(code.to_string()));
        }

        Ok(record)
    }

    async fn dispatch_visit(&self, code: &ShortCode, seed_count: u64) {
        let recorder = Arc::clone(&self.recorder);
        let owned = code.clone();
        let handle = tokio::spawn(async move {
            recorder.record_visit(&owned, seed_count).await;
        });

        match self.dispatch {
            VisitDispatch::Detached => {}
            VisitDispatch::WaitUpTo(budget) => {
                // Dropping the handle on timeout leaves the task running.
                match tokio::time::timeout(budget, handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(code = %code, error = %e, "Visit recording task failed"),
                    Err(_) => trace!(code = %code, "Visit recording still running, detaching"),
                }
            }
        }
    }
}

#[async_trait]
impl<S: LinkStore, V: VisitRecorder> Redirector for RedirectorService<S, V> {
    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        trace!(code = %code, "Resolving short code");

        let record = self.lookup_active(code).await?;
        self.dispatch_visit(code, record.visit_count).await;

        debug!(code = %code, destination = %record.destination, "Resolved short code");
        Ok(record.destination)
    }

    async fn inspect(&self, code: &ShortCode) -> Result<LinkRecord> {
        self.lookup_active(code).await
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let deleted = self.store.delete(code).await?;
        if deleted {
            info!(code = %code, "Deleted short link");
        }
        Ok(deleted)
    }

    async fn list(&self, limit: u64, offset: u64) -> Result<Vec<LinkRecord>> {
        let links = self.store.list(self.clock.now(), limit, offset).await?;
        trace!(limit, offset, returned = links.len(), "Listed short links");
        Ok(links)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let purged = self.store.purge_expired(self.clock.now()).await?;
        info!(purged, "Purged expired short links");
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::{SignedDuration, Timestamp};
    use std::sync::Mutex;
    use tally_core::{ManualClock, StorageError};
    use tally_storage::InMemoryLinkStore;
    use tokio::sync::Notify;

    /// Records every visit it is handed.
    #[derive(Default)]
    struct RecordingRecorder {
        visits: Mutex<Vec<(ShortCode, u64)>>,
        notify: Notify,
    }

    impl RecordingRecorder {
        fn visits(&self) -> Vec<(ShortCode, u64)> {
            self.visits.lock().unwrap().clone()
        }

        async fn wait_for(&self, n: usize) {
            loop {
                let notified = self.notify.notified();
                if self.visits.lock().unwrap().len() >= n {
                    return;
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl VisitRecorder for RecordingRecorder {
        async fn record_visit(&self, code: &ShortCode, seed_count: u64) {
            self.visits.lock().unwrap().push((code.clone(), seed_count));
            self.notify.notify_waiters();
        }
    }

    /// Never finishes recording within a test's lifetime.
    struct StalledRecorder;

    #[async_trait]
    impl VisitRecorder for StalledRecorder {
        async fn record_visit(&self, _code: &ShortCode, _seed_count: u64) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    /// Wraps a store and refuses deletes.
    struct NoDeleteStore(InMemoryLinkStore);

    #[async_trait]
    impl LinkStore for NoDeleteStore {
        async fn get(&self, code: &ShortCode) -> tally_core::store::Result<Option<LinkRecord>> {
            self.0.get(code).await
        }

        async fn insert(&self, record: LinkRecord) -> tally_core::store::Result<()> {
            self.0.insert(record).await
        }

        async fn delete(&self, _code: &ShortCode) -> tally_core::store::Result<bool> {
            Err(StorageError::Unavailable("delete refused".to_string()))
        }

        async fn store_visit_count(
            &self,
            code: &ShortCode,
            count: u64,
        ) -> tally_core::store::Result<()> {
            self.0.store_visit_count(code, count).await
        }

        async fn increment_visit_count(&self, code: &ShortCode) -> tally_core::store::Result<()> {
            self.0.increment_visit_count(code).await
        }

        async fn list(
            &self,
            now: Timestamp,
            limit: u64,
            offset: u64,
        ) -> tally_core::store::Result<Vec<LinkRecord>> {
            self.0.list(now, limit, offset).await
        }

        async fn purge_expired(&self, now: Timestamp) -> tally_core::store::Result<u64> {
            self.0.purge_expired(now).await
        }
    }

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn now() -> Timestamp {
        Timestamp::from_second(1_700_000_000).unwrap()
    }

    async fn store_with(records: Vec<LinkRecord>) -> Arc<InMemoryLinkStore> {
        let store = Arc::new(InMemoryLinkStore::new());
        for record in records {
            store.insert(record).await.unwrap();
        }
        store
    }

    fn service(
        store: Arc<InMemoryLinkStore>,
        recorder: Arc<RecordingRecorder>,
    ) -> RedirectorService<Arc<InMemoryLinkStore>, Arc<RecordingRecorder>> {
        RedirectorService::new(store, recorder).with_clock(Arc::new(ManualClock::new(now())))
    }

    #[tokio::test]
    async fn resolve_returns_destination_and_records_visit() {
        let record = LinkRecord::new(code("abc123"), "https://example.com", now()).with_visit_count(41);
        let store = store_with(vec![record]).await;
        let recorder = Arc::new(RecordingRecorder::default());
        let service = service(store, recorder.clone());

        let destination = service.resolve(&code("abc123")).await.unwrap();
        assert_eq!(destination, "https://example.com");

        recorder.wait_for(1).await;
        assert_eq!(recorder.visits(), vec![(code("abc123"), 41)]);
    }

    #[tokio::test]
    async fn resolve_unknown_code() {
        let recorder = Arc::new(RecordingRecorder::default());
        let service = service(store_with(vec![]).await, recorder.clone());

        let err = service.resolve(&code("nope00")).await.unwrap_err();
        assert!(matches!(err, RedirectorError::NotFound(c) if c == "nope00"));

        tokio::task::yield_now().await;
        assert!(recorder.visits().is_empty());
    }

    #[tokio::test]
    async fn resolve_expired_code_deletes_it() {
        let record = LinkRecord::new(code("xyz789"), "https://example.com", now())
            .with_expiry(now() - SignedDuration::from_hours(24));
        let store = store_with(vec![record]).await;
        let recorder = Arc::new(RecordingRecorder::default());
        let service = service(store.clone(), recorder.clone());

        let err = service.resolve(&code("xyz789")).await.unwrap_err();
        assert!(matches!(err, RedirectorError::Gone(_)));
        assert!(store.get(&code("xyz789")).await.unwrap().is_none());

        let err = service.resolve(&code("xyz789")).await.unwrap_err();
        assert!(matches!(err, RedirectorError::NotFound(_)));
        assert!(recorder.visits().is_empty());
    }

    #[tokio::test]
    async fn expiry_boundary_is_gone() {
        let record =
            LinkRecord::new(code("edge01"), "https://example.com", now()).with_expiry(now());
        let service = service(
            store_with(vec![record]).await,
            Arc::new(RecordingRecorder::default()),
        );

        let err = service.resolve(&code("edge01")).await.unwrap_err();
        assert!(matches!(err, RedirectorError::Gone(_)));
    }

    #[tokio::test]
    async fn failed_expiry_delete_still_answers_gone() {
        let record = LinkRecord::new(code("xyz789"), "https://example.com", now())
            .with_expiry(now() - SignedDuration::from_secs(1));
        let inner = InMemoryLinkStore::new();
        inner.insert(record).await.unwrap();
        let service = RedirectorService::new(NoDeleteStore(inner), RecordingRecorder::default())
            .with_clock(Arc::new(ManualClock::new(now())));

        for _ in 0..2 {
            let err = service.resolve(&code("xyz789")).await.unwrap_err();
            assert!(matches!(err, RedirectorError::Gone(_)));
        }
    }

    #[tokio::test]
    async fn inspect_does_not_record_a_visit() {
        let record = LinkRecord::new(code("abc123"), "https://example.com", now()).with_visit_count(3);
        let recorder = Arc::new(RecordingRecorder::default());
        let service = service(store_with(vec![record.clone()]).await, recorder.clone());

        assert_eq!(service.inspect(&code("abc123")).await.unwrap(), record);
        tokio::task::yield_now().await;
        assert!(recorder.visits().is_empty());
    }

    #[tokio::test]
    async fn delete_and_purge() {
        let live = LinkRecord::new(code("live01"), "https://a.example", now());
        let old = LinkRecord::new(code("old001"), "https://b.example", now())
            .with_expiry(now() - SignedDuration::from_mins(1));
        let store = store_with(vec![live, old]).await;
        let service = service(store.clone(), Arc::new(RecordingRecorder::default()));

        assert_eq!(Redirector::purge_expired(&service).await.unwrap(), 1);
        assert!(Redirector::delete(&service, &code("live01")).await.unwrap());
        assert!(!Redirector::delete(&service, &code("live01")).await.unwrap());
        assert!(store.get(&code("live01")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_skips_expired_links() {
        let first = LinkRecord::new(code("first1"), "https://a.example", now() - SignedDuration::from_hours(2));
        let second = LinkRecord::new(code("second"), "https://b.example", now() - SignedDuration::from_hours(1));
        let old = LinkRecord::new(code("old001"), "https://c.example", now() - SignedDuration::from_hours(3))
            .with_expiry(now() - SignedDuration::from_mins(1));
        let service = service(
            store_with(vec![second, old, first]).await,
            Arc::new(RecordingRecorder::default()),
        );

        let links = Redirector::list(&service, 10, 0).await.unwrap();
        let codes: Vec<_> = links.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, ["first1", "second"]);

        let page = Redirector::list(&service, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].code, code("second"));
    }

    #[tokio::test]
    async fn wait_up_to_does_not_hold_the_redirect() {
        let record = LinkRecord::new(code("abc123"), "https://example.com", now());
        let service = RedirectorService::new(store_with(vec![record]).await, StalledRecorder)
            .with_dispatch(VisitDispatch::WaitUpTo(Duration::from_millis(20)));

        let started = std::time::Instant::now();
        let destination = service.resolve(&code("abc123")).await.unwrap();
        assert_eq!(destination, "https://example.com");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn wait_up_to_waits_for_fast_recorders() {
        let record = LinkRecord::new(code("abc123"), "https://example.com", now());
        let recorder = Arc::new(RecordingRecorder::default());
        let service = RedirectorService::new(store_with(vec![record]).await, recorder.clone())
            .with_clock(Arc::new(ManualClock::new(now())))
            .with_dispatch(VisitDispatch::WaitUpTo(Duration::from_secs(5)));

        service.resolve(&code("abc123")).await.unwrap();
        assert_eq!(recorder.visits().len(), 1);
    }
}
