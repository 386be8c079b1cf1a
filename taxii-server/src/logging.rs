//! Log subscriber setup.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Builds filter directives from configured levels.
///
/// `root` becomes the default level; every other key is a target.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = Vec::new();
    let root = config
        .levels
        .iter()
        .find(|(target, _)| target.eq_ignore_ascii_case("root"))
        .map(|(_, level)| level.to_lowercase())
        .unwrap_or_else(|| "info".to_string());
    directives.push(root);

    for (target, level) in &config.levels {
        if !target.eq_ignore_ascii_case("root") {
            directives.push(format!("{}={}", target, level.to_lowercase()));
        }
    }
    directives.join(",")
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured levels when set.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config))?,
    };

    match config.format {
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
    }
}
