//! Diagnostic tracing for the loop.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted.
//!
//! - **Iteration logging (`io/iteration_log`)**: per-iteration artifacts in
//!   `.storyloop/iterations/`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise defaults to `warn`, or to
/// `storyloop=debug` when `verbose` is requested.
///
/// # Example
/// ```bash
/// RUST_LOG=storyloop=trace storyloop 5
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,storyloop=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
