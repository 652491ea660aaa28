//! Tracing subscriber setup for the arena binary.

use tracing_subscriber::EnvFilter;

use echo_core::config::GeneralConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `general.log_level`. Calling this twice is harmless:
/// the second call leaves the first subscriber in place and returns `false`.
pub fn init(config: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if config.json_logs {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
