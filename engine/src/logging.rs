//! Development-time tracing for debugging the engine.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of run output.
//!
//! - **Execution logs (`io/execution_log`)**: Per-run entries returned by
//!   `ExecutionLogger::get_logs` and written next to the snapshot as
//!   `runs/<run-id>/log.jsonl`. Always recorded, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `warn`, or
/// `plan_engine=info` when `verbose` is requested, which mirrors every
/// execution log entry to stderr as it is recorded.
///
/// # Example
/// ```bash
/// RUST_LOG=plan_engine=debug plan-engine run --plan plan.json
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("warn,plan_engine=info")
    } else {
        EnvFilter::new("warn")
    }
}
