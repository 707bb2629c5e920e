//! Tenant sessions: the per-tenant state machine, the task that drives it,
//! and the registry that owns them all.

pub mod handle;
mod lifecycle;
pub mod manager;

pub use handle::Session;
pub use manager::{SessionManager, StartOutcome};
