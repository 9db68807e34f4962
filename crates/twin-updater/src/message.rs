//! Mailbox messages a twin update task accepts.

use twin_kernel::domain::event::Event;
use twin_kernel::domain::ids::PolicyId;
use twin_kernel::domain::revision::Revision;

#[derive(Debug, Clone)]
pub enum Message {
    /// A twin event observed for this twin id.
    TwinEvent(Event),
    /// Operator-triggered manual reindex: the next round ignores
    /// `lastModel` and emits a full `Put`.
    ManualUpdate,
    /// The twin's policy changed; the next round invalidates the policy
    /// enforcer cache before projecting.
    PolicyChanged { policy_id: PolicyId, policy_revision: Revision },
    /// Periodic nudge that retries a previously given-up persistence
    /// attempt even with no new events.
    Sync,
    /// Cooperative shutdown request.
    Shutdown,
}
