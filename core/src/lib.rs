//! Conflict arbitration and event relay between a background sync engine and
//! the user surfaces that drive it.

pub mod api;
pub mod bridge;
pub mod config;
pub mod conflict;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod relay;
