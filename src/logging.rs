//! Logging init: structured events to stderr.
//!
//! stdout is reserved for `render` output, so everything goes to stderr.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,readout=debug";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `quiet` drops the default to warnings only.
pub fn init_logging(quiet: bool) {
    let fallback = if quiet { "warn" } else { DEFAULT_FILTER };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // A second init (e.g. from tests) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
