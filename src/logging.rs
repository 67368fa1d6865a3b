//! Diagnostic logging.
//!
//! Logs go to stderr so they never interleave with the conversation on
//! stdout. The filter comes from `ARCHITECT_LOG`, then `RUST_LOG`, then
//! [`DEFAULT_LOG_LEVEL`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "ARCHITECT_LOG";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Install the global subscriber. Calling it again is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
