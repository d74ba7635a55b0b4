//! Filesystem-backed sync engine.

pub mod images;
pub mod local;
pub mod manifest;
pub mod store;

pub use local::{LocalMirrorEngine, ENGINE_NAME};
pub use manifest::Manifest;
pub use store::SettingsStore;
