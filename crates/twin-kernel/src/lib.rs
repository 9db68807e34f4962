//! Shared kernel (Shared Kernel) for the Ditto twin-update pipeline.
//!
//! Only the vocabulary genuinely common to every bounded context lives here:
//! namespaced ids, event/metadata/write-model shapes, and the pipeline-wide
//! error kind. No business logic, no infrastructure.

pub mod domain;
pub mod error;

pub use domain::{
    latest_event, Event, EventKind, Feature, FeatureId, Metadata, NamespacedIdError, PolicyId,
    Revision, Twin, TwinId, UpdateReason, WriteModel,
};
pub use error::{PipelineError, PipelineResult};
