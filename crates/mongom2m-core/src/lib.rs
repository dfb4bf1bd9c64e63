//! # mongom2m-core
//!
//! Error types, settings, and logging setup shared by the mongom2m crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Settings and the optional global instance
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{M2MError, M2MResult};
pub use settings::{DatabaseSettings, Settings, SETTINGS};
