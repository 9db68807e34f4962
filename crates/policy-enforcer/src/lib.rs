//! The policy enforcer oracle: a stateless, trie-compiled `Enforcer` over a
//! `Policy`, plus the cache and reload policy used to keep a twin's
//! enforcer in step with its policy revision.

pub mod cache;
pub mod domain;
pub mod enforcer;

pub use cache::{PolicyEnforcerCache, PolicyLoader};
pub use domain::{Permission, Policy, PolicyEntry, ResourceTarget};
pub use enforcer::{Decision, Enforcer, Explanation};
