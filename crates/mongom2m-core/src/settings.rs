//! Settings for mongom2m.
//!
//! [`Settings`] holds the handful of knobs the relationship layer reads:
//! logging, the configured document databases, and how much of a query set
//! is shown when it is formatted. [`SETTINGS`] is an optional process-wide
//! instance for applications that prefer global configuration.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Document database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The storage engine (e.g. `mongom2m.store.memory`).
    pub engine: String,
    /// Connection URI for network stores.
    pub uri: String,
    /// The database name.
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "mongom2m.store.memory".to_string(),
            uri: String::new(),
            name: "default".to_string(),
        }
    }
}

/// The complete set of settings.
///
/// # Examples
///
/// ```
/// use mongom2m_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.default_database, "default");
/// assert_eq!(settings.repr_output_size, 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// The log level filter (e.g. "info", "mongom2m=debug").
    pub log_level: String,
    /// Database configurations, keyed by alias.
    pub databases: HashMap<String, DatabaseSettings>,
    /// The alias used when none is given.
    pub default_database: String,
    /// How many entries a formatted query set shows before truncating.
    pub repr_output_size: usize,
    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = HashMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());

        Self {
            debug: true,
            log_level: "info".to_string(),
            databases,
            default_database: "default".to_string(),
            repr_output_size: 20,
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    /// Returns the settings of the default database, if configured.
    pub fn default_database_settings(&self) -> Option<&DatabaseSettings> {
        self.databases.get(&self.default_database)
    }
}

/// A lazily-initialized, globally-accessible settings container.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns the configured settings, or `None` before `configure`.
    pub fn try_get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.default_database, "default");
        assert_eq!(s.repr_output_size, 20);
        assert!(s.extra.is_empty());
    }

    #[test]
    fn test_default_database() {
        let s = Settings::default();
        let db = s.default_database_settings().expect("default db should exist");
        assert_eq!(db.engine, "mongom2m.store.memory");
        assert_eq!(db.name, "default");
    }

    #[test]
    fn test_lazy_settings_configure_and_get() {
        let lazy = LazySettings::new();
        assert!(!lazy.is_configured());
        assert!(lazy.try_get().is_none());

        let settings = Settings {
            repr_output_size: 5,
            ..Settings::default()
        };
        lazy.configure(settings);
        assert!(lazy.is_configured());
        assert_eq!(lazy.try_get().map(|s| s.repr_output_size), Some(5));
    }

    #[test]
    #[should_panic(expected = "already been configured")]
    fn test_lazy_settings_double_configure_panics() {
        let lazy = LazySettings::new();
        lazy.configure(Settings::default());
        lazy.configure(Settings::default());
    }
}
