//! MongoDB-backed `ThingFetcher` and `PolicyLoader` adapters: the upstream
//! collaborators the enrichment facade and the policy enforcer cache treat
//! as opaque loaders (`sudoRetrieveThing`, `loadPolicy`).

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::Collection;

use entity_cache::{Entry, LoaderError};
use enrichment::ThingFetcher;
use policy_enforcer::{Policy, PolicyLoader};
use twin_kernel::domain::ids::{PolicyId, TwinId};
use twin_kernel::domain::twin::Twin;

use crate::ask::{ask_with_retry, AskConfig};

pub struct MongoThingFetcher {
    collection: Collection<Twin>,
    ask: AskConfig,
}

impl MongoThingFetcher {
    pub fn new(collection: Collection<Twin>, ask: AskConfig) -> Self {
        Self { collection, ask }
    }
}

#[async_trait]
impl ThingFetcher for MongoThingFetcher {
    async fn fetch_thing(&self, twin_id: &TwinId) -> Result<Entry<Twin>, LoaderError> {
        let filter = doc! { "twin_id.namespace": twin_id.namespace(), "twin_id.name": twin_id.name() };
        let found = ask_with_retry(&self.ask, "fetch_thing", || async {
            self.collection.find_one(filter.clone()).await
        })
        .await
        .map_err(|err| Box::new(err) as LoaderError)?;

        Ok(match found {
            Some(twin) => Entry::found(twin.revision, twin),
            None => Entry::missing(),
        })
    }
}

pub struct MongoPolicyLoader {
    collection: Collection<Policy>,
    ask: AskConfig,
}

impl MongoPolicyLoader {
    pub fn new(collection: Collection<Policy>, ask: AskConfig) -> Self {
        Self { collection, ask }
    }
}

#[async_trait]
impl PolicyLoader for MongoPolicyLoader {
    async fn load_policy(&self, policy_id: &PolicyId) -> Result<Entry<Policy>, LoaderError> {
        let filter = doc! { "policy_id.namespace": policy_id.namespace(), "policy_id.name": policy_id.name() };
        let found = ask_with_retry(&self.ask, "load_policy", || async {
            self.collection.find_one(filter.clone()).await
        })
        .await
        .map_err(|err| Box::new(err) as LoaderError)?;

        Ok(match found {
            Some(policy) => {
                let revision = policy.revision;
                Entry::found(revision, policy)
            }
            None => Entry::missing(),
        })
    }
}

/// Shares the underlying `AskConfig` between the two adapters without
/// threading it through every call site.
#[derive(Clone)]
pub struct MongoAdapters {
    pub thing_fetcher: Arc<MongoThingFetcher>,
    pub policy_loader: Arc<MongoPolicyLoader>,
}

impl MongoAdapters {
    pub fn new(twins: Collection<Twin>, policies: Collection<Policy>, ask: AskConfig) -> Self {
        Self {
            thing_fetcher: Arc::new(MongoThingFetcher::new(twins, ask)),
            policy_loader: Arc::new(MongoPolicyLoader::new(policies, ask)),
        }
    }
}
