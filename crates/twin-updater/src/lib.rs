//! The twin update task: one cooperative, single-owner state machine per
//! twin id, coordinating recovery, event stashing, persistence handoff,
//! retry, and shutdown on top of the enrichment facade, policy enforcer
//! cache, and search-index bulk writer.

mod dispatcher;
mod error;
mod message;
mod mongo_recovery;
mod recovery;
mod state;
mod task;

pub use dispatcher::Dispatcher;
pub use error::TaskError;
pub use message::Message;
pub use mongo_recovery::MongoRecoveryStore;
pub use recovery::{NoRecovery, RecoveryError, RecoveryStore};
pub use state::TaskState;
pub use task::{TwinUpdateConfig, TwinUpdateTask};
