//! Logging integration for mongom2m.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating spans around
//! relationship manager operations.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise structured JSON. Installing a
/// second subscriber is silently ignored.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for an operation on one relationship field.
///
/// # Examples
///
/// ```
/// use mongom2m_core::logging::relation_span;
///
/// let span = relation_span("tags", "TestArticle");
/// let _guard = span.enter();
/// tracing::debug!("adding tags");
/// ```
pub fn relation_span(field: &str, host: &str) -> tracing::Span {
    tracing::debug_span!("m2m", field = field, host = host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let settings = Settings {
            log_level: "not a valid filter [".to_string(),
            ..Settings::default()
        };
        setup_logging(&settings);
        setup_logging(&Settings::default());
    }

    #[test]
    fn test_relation_span_enters() {
        let span = relation_span("categories", "TestArticle");
        let _guard = span.enter();
        tracing::debug!("inside span");
    }
}
