//! Shared kernel for the twin update pipeline.
//!
//! Exposes only the truly cross-cutting vocabulary: namespaced identifiers,
//! the logical twin/event shapes, accumulated-change metadata and the
//! write-model union. Any crate downstream of this one (cache, enforcement
//! flow, search index, twin updater) depends on these types instead of
//! redefining them.

pub mod event;
pub mod ids;
pub mod metadata;
pub mod revision;
pub mod twin;
pub mod write_model;

pub use event::{latest_event, Event, EventKind};
pub use ids::{NamespacedIdError, PolicyId, TwinId};
pub use metadata::{Metadata, UpdateReason};
pub use revision::Revision;
pub use twin::{Feature, FeatureId, Twin};
pub use write_model::WriteModel;
