#[allow(clippy::module_inception)]
pub mod bridge;
pub mod commands;

pub use bridge::SyncBridge;
pub use commands::COMMANDS;
