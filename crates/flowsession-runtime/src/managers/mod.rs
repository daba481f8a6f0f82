//! Stateful managers for the session runtime
//!
//! The store keeps session state between engine calls; the replay tracker
//! decides when unacknowledged events go out again.

pub mod replay;
pub mod store;

pub use replay::{ReplayDecision, ReplayStatistics, ReplayTracker};
pub use store::SessionStore;
