//! Logging setup of the binaries.

use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

/// Directives used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str = "blf=info,blf_engine=info";

/// Logs to stderr, filtered by `RUST_LOG`. Extracted data never goes
/// through the log, so stdout stays free for the caller.
pub fn init() {
    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_filter(filter()),
        )
        .init();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
