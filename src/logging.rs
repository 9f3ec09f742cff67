//! Logging setup
//!
//! Logs go to stderr; stdout is reserved for JSON. The filter comes from
//! `RUST_LOG` and defaults to `warn`.

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_INIT: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber; later calls are no-ops
pub fn init(verbose: bool) {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { DEFAULT_FILTER }));
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false);

        let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
    });
}
