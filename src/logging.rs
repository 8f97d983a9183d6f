// 📜 Logging - tracing subscriber setup shared by both binaries
//
// Filter comes from RUST_LOG when set, otherwise from the configured default.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt().with_env_filter(filter).with_target(true).init();
    });
}
