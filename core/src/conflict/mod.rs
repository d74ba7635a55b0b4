//! Human-in-the-loop conflict arbitration.

pub mod coordinator;
pub mod types;

pub use coordinator::ConflictCoordinator;
pub use types::{ConflictId, ConflictRequest, ConflictState, Decision, Resolution};
