//! The tagged write-model union produced by the search-index differ.
//!
//! Generic over the document representation `D` so this crate does not pull
//! in a MongoDB dependency; `search-index` instantiates `WriteModel<bson::Document>`.

use crate::domain::metadata::Metadata;
use crate::domain::revision::Revision;

#[derive(Debug, Clone)]
pub enum WriteModel<D> {
    /// The twin's search-index document should be removed.
    Delete(Metadata),
    /// Full replacement of the search-index document.
    Put(Metadata, D),
    /// Conditional partial update, applied only if the persisted revision
    /// still matches `filter_revision`.
    Patch(Metadata, D, Revision),
}

impl<D> WriteModel<D> {
    pub fn metadata(&self) -> &Metadata {
        match self {
            WriteModel::Delete(m) => m,
            WriteModel::Put(m, _) => m,
            WriteModel::Patch(m, _, _) => m,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, WriteModel::Delete(_))
    }

    /// Revision the twin update task should cache as `lastModel` once this
    /// write model is durably applied.
    pub fn revision(&self) -> Revision {
        self.metadata().thing_revision
    }

    /// Builds the virtual `Delete` used by a forced update: the differ then
    /// always emits a full `Put` on the next round.
    pub fn as_virtual_delete(&self) -> WriteModel<D> {
        WriteModel::Delete(self.metadata().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::TwinId;

    fn meta(rev: i64) -> Metadata {
        Metadata::new("org:t".parse::<TwinId>().unwrap(), Revision(rev))
    }

    #[test]
    fn revision_reads_through_every_variant() {
        assert_eq!(WriteModel::<()>::Delete(meta(1)).revision(), Revision(1));
        assert_eq!(WriteModel::Put(meta(2), ()).revision(), Revision(2));
        assert_eq!(
            WriteModel::Patch(meta(3), (), Revision(2)).revision(),
            Revision(3)
        );
    }

    #[test]
    fn virtual_delete_preserves_metadata() {
        let put = WriteModel::Put(meta(5), ());
        let forced = put.as_virtual_delete();
        assert!(forced.is_delete());
        assert_eq!(forced.revision(), Revision(5));
    }
}
