//! The policy enforcer cache and its reload policy.
//!
//! For each request, the reload predicate looks at the current cached entry
//! against the required revision: reload if `invalidatePolicy` is set, or
//! the entry is missing or nonexistent, or its revision is older than the
//! required one. A reload is an `invalidate + re-get`; at most one reload
//! is attempted per request.

use crate::domain::Policy;
use crate::enforcer::Enforcer;
use async_trait::async_trait;
use entity_cache::{Entry, EntityCache, Loader, LoaderError, LoaderErrorBox, ProjectedCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use twin_kernel::{PolicyId, Revision};

#[async_trait]
pub trait PolicyLoader: Send + Sync {
    async fn load_policy(&self, policy_id: &PolicyId) -> Result<Entry<Policy>, LoaderError>;
}

struct PolicyLoaderAdapter(Arc<dyn PolicyLoader>);

#[async_trait]
impl Loader<PolicyId, Policy> for PolicyLoaderAdapter {
    async fn load(&self, key: &PolicyId) -> Result<Entry<Policy>, LoaderError> {
        self.0.load_policy(key).await
    }
}

/// Wraps the raw `Policy` cache with a `Policy -> Enforcer` projection and
/// the reload policy used before serving a required revision.
pub struct PolicyEnforcerCache {
    policies: Arc<EntityCache<PolicyId, Policy>>,
    enforcers: ProjectedCache<PolicyId, Policy, Enforcer>,
    reload_initial_delay: Duration,
}

impl PolicyEnforcerCache {
    pub fn new(
        loader: Arc<dyn PolicyLoader>,
        capacity: usize,
        ttl: Duration,
        reload_initial_delay: Duration,
    ) -> Self {
        let policies = Arc::new(EntityCache::new(
            "policy",
            Arc::new(PolicyLoaderAdapter(loader)),
            capacity,
            ttl,
        ));
        let enforcers = ProjectedCache::new(policies.clone(), |p: &Policy| Enforcer::compile(p));
        Self {
            policies,
            enforcers,
            reload_initial_delay,
        }
    }

    fn should_reload(entry: Option<&Entry<Enforcer>>, required_revision: Revision, invalidate_policy: bool) -> bool {
        match entry {
            None => true,
            Some(e) if !e.exists => true,
            Some(e) => invalidate_policy || e.revision < required_revision,
        }
    }

    /// Fetches the enforcer for `policy_id`, applying the reload policy
    /// against `required_revision`. At most one reload is attempted.
    pub async fn get(
        &self,
        policy_id: &PolicyId,
        required_revision: Revision,
        invalidate_policy: bool,
    ) -> Result<Entry<Enforcer>, Arc<LoaderErrorBox>> {
        // At most one reload attempt per request: the initial lookup above,
        // followed by a single invalidate+re-get if it's stale.
        let mut entry = self.enforcers.get(policy_id).await?;

        if Self::should_reload(Some(&entry), required_revision, invalidate_policy) {
            debug!(%policy_id, "reloading policy enforcer: stale or invalidated");
            self.enforcers.invalidate(policy_id);
            tokio::time::sleep(self.reload_initial_delay).await;
            entry = self.enforcers.get(policy_id).await?;
        }

        if entry.exists && entry.revision < required_revision {
            warn!(%policy_id, required = %required_revision, got = %entry.revision, "policy enforcer still stale after single reload attempt");
        }

        Ok(entry)
    }

    pub fn invalidate(&self, policy_id: &PolicyId) {
        self.policies.invalidate(policy_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Policy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedLoader {
        revisions: Mutex<Vec<i64>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PolicyLoader for ScriptedLoader {
        async fn load_policy(&self, policy_id: &PolicyId) -> Result<Entry<Policy>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rev = self.revisions.lock().unwrap().remove(0);
            Ok(Entry::found(Revision(rev), Policy::new(policy_id.clone(), Revision(rev))))
        }
    }

    #[tokio::test]
    async fn reloads_once_when_entry_is_stale() {
        let loader = Arc::new(ScriptedLoader {
            revisions: Mutex::new(vec![1, 2]),
            calls: AtomicUsize::new(0),
        });
        let cache = PolicyEnforcerCache::new(loader.clone(), 10, Duration::from_secs(60), Duration::from_millis(0));
        let id: PolicyId = "org:p".parse().unwrap();

        let first = cache.get(&id, Revision(1), false).await.unwrap();
        assert_eq!(first.revision, Revision(1));

        let second = cache.get(&id, Revision(2), false).await.unwrap();
        assert_eq!(second.revision, Revision(2));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_policy_flag_forces_reload_even_if_fresh() {
        let loader = Arc::new(ScriptedLoader {
            revisions: Mutex::new(vec![5, 5]),
            calls: AtomicUsize::new(0),
        });
        let cache = PolicyEnforcerCache::new(loader.clone(), 10, Duration::from_secs(60), Duration::from_millis(0));
        let id: PolicyId = "org:p".parse().unwrap();

        cache.get(&id, Revision(5), false).await.unwrap();
        cache.get(&id, Revision(5), true).await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }
}
