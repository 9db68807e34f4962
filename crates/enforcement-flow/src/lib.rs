//! Turns one flush window's accumulated per-twin metadata into write
//! models, fetching JSON through the enrichment facade and the policy
//! enforcer through its cache, then partitions the output the way the
//! bulk writer needs for per-twin write ordering.

mod bound;
mod flow;
mod partition;

pub use bound::bound_arrays;
pub use flow::{run_enforcement_round, EnforcementConfig};
pub use partition::partition_of;
