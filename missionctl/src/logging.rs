//! Diagnostic logging to stderr.
//!
//! Stdout is reserved for the result envelope (or the human-readable report), so
//! every diagnostic line goes to stderr. Agent stderr forwarded by the invoker is
//! written raw to the same stream and does not pass through this subscriber.

use std::fmt;

use chrono::Utc;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{
    EnvFilter, fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Wall-clock `HH:MM:SS` (UTC) timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Utc::now().format("%H:%M:%S"))
    }
}

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `missionctl=info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=missionctl=debug missionctl run ./src
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("missionctl=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt_layer::layer()
                .with_writer(std::io::stderr)
                .with_timer(ClockTime)
                .with_target(false)
                .compact(),
        )
        .init();
}
