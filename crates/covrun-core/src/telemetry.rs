//! Log output for the covrun binary.
//!
//! Logs go to stderr so stdout carries only the run summary (or the JSON
//! outcome with `--json`). Tool output streams to the same terminal, so the
//! plain format leaves out timestamps and targets to keep stage lines short.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Later calls are ignored.
///
/// `RUST_LOG` overrides `level`. With `json` every event is one JSON object
/// per line, timestamps included.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time(),
            )
            .try_init()
    };
    installed.ok();
}
