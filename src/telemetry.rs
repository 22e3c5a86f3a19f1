//! Telemetry logic.
//! Support logging and metrics.

use metrics::{Unit, describe_counter};
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Does nothing if the host already installed a global subscriber.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    if installed.is_err() {
        tracing::debug!("global subscriber already set");
    }
}

/// Describe every metric recorded by the crate.
///
/// Values are only kept once the host installs a `metrics` recorder.
pub fn describe_metrics() {
    describe_counter!(
        "ou_lookups_total",
        Unit::Count,
        "OU lookups by outcome: cache_hit, resolved or not_found."
    );
    describe_counter!(
        "dn_resolution_total",
        Unit::Count,
        "DN lookups per resolution strategy and outcome."
    );
    describe_counter!(
        "search_results_filtered_total",
        Unit::Count,
        "Filtered result categories by writeback decision."
    );
}
