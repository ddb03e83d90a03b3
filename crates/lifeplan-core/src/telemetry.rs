//! Tracing bootstrap for the reminder daemon and anything else embedding
//! the planner services.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

/// Install the global subscriber from the loaded configuration
/// (`LOG_FORMAT`, `LOG_LEVEL`).
///
/// `RUST_LOG` still wins when set, so per-module filtering stays available
/// without touching the service config. Calling this twice is a no-op: the
/// global subscriber can only be installed once per process, and tests that
/// construct services concurrently rely on the second call being silent.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let text = fmt::layer().with_target(false);
    let installed = if config.log_format_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(text.json())
            .try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(text).try_init()
    };
    installed.ok();
}
