//! The task's externally observable state. Transitions are driven entirely
//! by `task::TwinUpdateTask::run`; this enum exists so tests and logs can
//! assert on where a task currently sits without peeking at its private
//! fields.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Loading `lastModel` before accepting any mailbox traffic.
    Recovering,
    /// Idle or accumulating; the next mailbox item triggers `Persisting`.
    Ready,
    /// A write model is being diffed and written; new mailbox items are
    /// merged into the next round rather than handled immediately.
    Persisting,
    /// Backing off after a transient write failure, bounded by `maxRetries`.
    Retrying { attempt: u32 },
    /// Draining the in-flight persistence only; no new work is accepted.
    ShuttingDown,
}
