//! Routes a twin id to one of `P` ordering partitions by hash, the unit the
//! bulk writer later serializes writes within.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use twin_kernel::domain::ids::TwinId;

pub fn partition_of(twin_id: &TwinId, partitions: usize) -> usize {
    let partitions = partitions.max(1);
    let mut hasher = DefaultHasher::new();
    twin_id.hash(&mut hasher);
    (hasher.finish() as usize) % partitions
}
