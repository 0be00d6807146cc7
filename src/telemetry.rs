//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber from logging config.
///
/// Returns whether this call installed it; a second call (or a subscriber
/// installed by the embedding application) leaves the existing one in place.
pub fn init(logging: &LoggingConfig) -> bool {
    if !logging.stdout {
        return false;
    }

    let directive = logging.filter.as_deref().unwrap_or("info");
    let filter =
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match logging.stdout_format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}
