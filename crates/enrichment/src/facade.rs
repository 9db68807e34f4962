//! The enrichment facade: retrieves a twin's current JSON view, preferring
//! an incremental update over an already-cached snapshot and falling back
//! to a full fetch whenever the snapshot and the known events don't align.

use crate::apply::apply_event;
use async_trait::async_trait;
use entity_cache::{Entry, EntityCache, Loader, LoaderError, LoaderErrorBox};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use twin_kernel::domain::event::Event;
use twin_kernel::domain::ids::TwinId;
use twin_kernel::domain::revision::Revision;
use twin_kernel::domain::twin::Twin;

/// Fetches the authoritative twin snapshot from upstream. Implementations
/// typically call out to the thing persistence service or its own cache.
#[async_trait]
pub trait ThingFetcher: Send + Sync {
    async fn fetch_thing(&self, twin_id: &TwinId) -> Result<Entry<Twin>, LoaderError>;
}

struct ThingFetcherAdapter(Arc<dyn ThingFetcher>);

#[async_trait]
impl Loader<TwinId, Twin> for ThingFetcherAdapter {
    async fn load(&self, key: &TwinId) -> Result<Entry<Twin>, LoaderError> {
        self.0.fetch_thing(key).await
    }
}

pub struct EnrichmentFacade {
    cache: Arc<EntityCache<TwinId, Twin>>,
}

impl EnrichmentFacade {
    pub fn new(fetcher: Arc<dyn ThingFetcher>, capacity: usize, ttl: Duration) -> Self {
        let cache = Arc::new(EntityCache::new(
            "thing",
            Arc::new(ThingFetcherAdapter(fetcher)),
            capacity,
            ttl,
        ));
        Self { cache }
    }

    /// Retrieves the twin's current JSON view. `None` means the twin does
    /// not exist (deleted or never created).
    pub async fn retrieve_thing(
        &self,
        twin_id: &TwinId,
        known_events: &[Event],
        expected_revision: Revision,
    ) -> Result<Option<serde_json::Value>, Arc<LoaderErrorBox>> {
        if expected_revision.is_unknown() || known_events.is_empty() {
            return self.full_fetch(twin_id).await;
        }

        match self.try_incremental(twin_id, known_events, expected_revision) {
            Some(outcome) => Ok(outcome.map(|t| t.to_json())),
            None => self.full_fetch(twin_id).await,
        }
    }

    /// `None` means the incremental path couldn't confirm the current state
    /// and the caller must fall back to a full fetch. `Some(None)` means the
    /// twin was determined to be deleted. `Some(Some(twin))` is the
    /// incrementally-updated snapshot.
    fn try_incremental(
        &self,
        twin_id: &TwinId,
        known_events: &[Event],
        expected_revision: Revision,
    ) -> Option<Option<Twin>> {
        let cached = self.cache.peek(twin_id)?;
        if !cached.exists {
            return None;
        }
        let mut twin = cached.value?;
        if twin.revision != expected_revision {
            trace!(%twin_id, cached = %twin.revision, expected = %expected_revision, "cached revision mismatch, falling back to full fetch");
            return None;
        }

        let mut ordered: Vec<&Event> = known_events
            .iter()
            .filter(|e| !e.is_stale_against(twin.revision))
            .collect();
        if ordered.is_empty() {
            return None;
        }
        ordered.sort_by_key(|e| e.revision);

        for event in ordered {
            if !event.is_immediate_successor_of(twin.revision) {
                return None;
            }
            if event.kind.is_deleted() {
                self.cache.invalidate(twin_id);
                return Some(None);
            }
            if apply_event(&mut twin, event).is_err() {
                return None;
            }
        }

        self.cache.put(twin_id.clone(), Entry::found(twin.revision, twin.clone()));
        Some(Some(twin))
    }

    async fn full_fetch(&self, twin_id: &TwinId) -> Result<Option<serde_json::Value>, Arc<LoaderErrorBox>> {
        let entry = self.cache.get(twin_id).await?;
        Ok(entry.value.map(|t| t.to_json()))
    }

    pub fn invalidate(&self, twin_id: &TwinId) {
        self.cache.invalidate(twin_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use twin_kernel::domain::event::EventKind;
    use twin_kernel::domain::ids::TwinId;

    struct ScriptedFetcher {
        twin: Mutex<Twin>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ThingFetcher for ScriptedFetcher {
        async fn fetch_thing(&self, _twin_id: &TwinId) -> Result<Entry<Twin>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let twin = self.twin.lock().unwrap().clone();
            Ok(Entry::found(twin.revision, twin))
        }
    }

    fn twin(revision: i64) -> Twin {
        Twin {
            twin_id: "org:t1".parse().unwrap(),
            policy_id: Some("org:p1".parse().unwrap()),
            revision: Revision(revision),
            attributes: serde_json::json!({}),
            features: BTreeMap::new(),
            modified: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    fn attr_event(twin_id: &TwinId, revision: i64) -> Event {
        Event {
            twin_id: twin_id.clone(),
            revision: Revision(revision),
            timestamp: Utc::now(),
            kind: EventKind::AttributeModified {
                pointer: "/x".to_string(),
                value: serde_json::json!(revision),
            },
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn unknown_expected_revision_forces_full_fetch() {
        let fetcher = Arc::new(ScriptedFetcher { twin: Mutex::new(twin(1)), calls: AtomicUsize::new(0) });
        let facade = EnrichmentFacade::new(fetcher.clone(), 10, Duration::from_secs(60));
        let id: TwinId = "org:t1".parse().unwrap();

        let result = facade.retrieve_thing(&id, &[], Revision::UNKNOWN).await.unwrap();
        assert!(result.is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn aligned_event_applies_incrementally_without_refetching() {
        let fetcher = Arc::new(ScriptedFetcher { twin: Mutex::new(twin(1)), calls: AtomicUsize::new(0) });
        let facade = EnrichmentFacade::new(fetcher.clone(), 10, Duration::from_secs(60));
        let id: TwinId = "org:t1".parse().unwrap();

        facade.retrieve_thing(&id, &[], Revision::UNKNOWN).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let events = vec![attr_event(&id, 2)];
        let result = facade.retrieve_thing(&id, &events, Revision(1)).await.unwrap().unwrap();
        assert_eq!(result["attributes"]["x"], 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn revision_gap_falls_back_to_full_fetch() {
        let fetcher = Arc::new(ScriptedFetcher { twin: Mutex::new(twin(5)), calls: AtomicUsize::new(0) });
        let facade = EnrichmentFacade::new(fetcher.clone(), 10, Duration::from_secs(60));
        let id: TwinId = "org:t1".parse().unwrap();

        facade.retrieve_thing(&id, &[], Revision::UNKNOWN).await.unwrap();
        let events = vec![attr_event(&id, 9)];
        facade.retrieve_thing(&id, &events, Revision(5)).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deleted_event_reports_missing_without_refetching() {
        let fetcher = Arc::new(ScriptedFetcher { twin: Mutex::new(twin(1)), calls: AtomicUsize::new(0) });
        let facade = EnrichmentFacade::new(fetcher.clone(), 10, Duration::from_secs(60));
        let id: TwinId = "org:t1".parse().unwrap();
        facade.retrieve_thing(&id, &[], Revision::UNKNOWN).await.unwrap();

        let deleted = Event {
            twin_id: id.clone(),
            revision: Revision(2),
            timestamp: Utc::now(),
            kind: EventKind::Deleted,
            payload: serde_json::Value::Null,
        };
        let result = facade.retrieve_thing(&id, &[deleted], Revision(1)).await.unwrap();
        assert!(result.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
