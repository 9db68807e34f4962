//! Mongo-backed `RecoveryStore`: reads the search-index collection's
//! persisted document directly, the same shape the bulk writer maintains.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::Collection;
use search_index::PersistedState;
use twin_kernel::domain::ids::TwinId;
use twin_kernel::domain::revision::Revision;

use crate::recovery::{RecoveryError, RecoveryStore};

pub struct MongoRecoveryStore {
    collection: Collection<Document>,
}

impl MongoRecoveryStore {
    pub fn new(collection: Collection<Document>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl RecoveryStore for MongoRecoveryStore {
    async fn load(&self, twin_id: &TwinId) -> Result<Option<PersistedState>, RecoveryError> {
        let filter = doc! { "_id": twin_id.to_string() };
        let found = self
            .collection
            .find_one(filter)
            .await
            .map_err(|e| RecoveryError(Box::new(e)))?;

        let Some(bson_doc) = found else {
            return Ok(None);
        };

        let revision = bson_doc
            .get_i64("_revision")
            .map(Revision)
            .unwrap_or(Revision::UNKNOWN);
        let document = serde_json::to_value(bson_doc).map_err(|e| RecoveryError(Box::new(e)))?;

        Ok(Some(PersistedState { document, revision }))
    }
}
