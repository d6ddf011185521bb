//! Progress reporting collaborator.
//!
//! Pipelines never log through globals directly; they talk to an injected
//! [`Reporter`]. [`TracingReporter`] forwards to `tracing`, while
//! [`MemoryReporter`](crate::fakes::MemoryReporter) records lines for tests.

use tracing::{info, warn};

/// Sink for user-facing progress messages.
pub trait Reporter: Send + Sync {
    /// A pipeline stage is starting.
    fn stage(&self, name: &str);

    /// Informational message.
    fn info(&self, message: &str);

    /// Recoverable problem; the run continues.
    fn warn(&self, message: &str);

    /// An external command is about to run.
    fn command(&self, line: &str);
}

/// Reporter that emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn stage(&self, name: &str) {
        info!(stage = %name, "Starting stage");
    }

    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn command(&self, line: &str) {
        info!("$ {line}");
    }
}
