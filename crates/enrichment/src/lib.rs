//! Signal enrichment: turns a twin id plus a trickle of known events into
//! its current JSON view, avoiding a full fetch whenever a cached snapshot
//! can be brought up to date incrementally instead.

mod apply;
mod facade;

pub use apply::{apply_event, NotIncrementallyApplicable};
pub use facade::{EnrichmentFacade, ThingFetcher};
