//! Utilities for logging.
//!
//! Filtering is driven by `RUST_LOG` with a per-call default directive when
//! the variable is unset.
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a global subscriber writing to stderr.
///
/// Calling this more than once is a no-op; the first subscriber stays
/// installed.
pub fn init(default_level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Install a subscriber that writes through the test harness so output is
/// captured per test.
pub fn init_test() {
    let subscriber = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_file(true)
        .with_line_number(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}
