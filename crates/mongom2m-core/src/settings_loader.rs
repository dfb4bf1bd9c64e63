//! Settings loading from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `MONGOM2M_DEBUG` | `debug` |
//! | `MONGOM2M_LOG_LEVEL` | `log_level` |
//! | `MONGOM2M_DEFAULT_DATABASE` | `default_database` |
//! | `MONGOM2M_DATABASE_URI` | `databases[default_database].uri` |
//! | `MONGOM2M_REPR_OUTPUT_SIZE` | `repr_output_size` |

use std::path::Path;

use crate::error::M2MError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Keys missing from the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, M2MError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| M2MError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, M2MError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, M2MError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, M2MError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| M2MError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, M2MError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `MONGOM2M_*` environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("MONGOM2M_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("MONGOM2M_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("MONGOM2M_DEFAULT_DATABASE") {
        settings.default_database = val;
    }

    if let Ok(val) = std::env::var("MONGOM2M_DATABASE_URI") {
        settings
            .databases
            .entry(settings.default_database.clone())
            .or_default()
            .uri = val;
    }

    if let Ok(val) = std::env::var("MONGOM2M_REPR_OUTPUT_SIZE") {
        if let Ok(size) = val.parse::<usize>() {
            settings.repr_output_size = size;
        }
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, M2MError> {
    std::fs::read_to_string(path).map_err(|e| {
        M2MError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, M2MError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        M2MError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        M2MError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
