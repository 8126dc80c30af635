//! Human-readable workflow reporting.
//!
//! Every recovery action and stage transition emits a report line; this is
//! the auditable log of what the workflow did and why. The default sink
//! forwards to `tracing`, tests collect lines for assertions.

use tracing::info;

/// Receives human-readable report lines from the workflow.
pub trait Reporter: Send + Sync {
    /// Records one report line.
    fn report(&self, message: &str);
}

/// A reporter that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl Reporter for NoOpReporter {
    fn report(&self, _message: &str) {}
}

/// A reporter that forwards to the tracing framework at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter;

impl Reporter for LoggingReporter {
    fn report(&self, message: &str) {
        info!(target: "wannierflow::report", "{message}");
    }
}

/// A reporter that collects messages, for testing.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: parking_lot::Mutex<Vec<String>>,
}

impl CollectingReporter {
    /// Creates an empty collecting reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the collected messages.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Returns true if any collected message contains the needle.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|m| m.contains(needle))
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        reporter.report("launching pw_scf<1>");
        reporter.report("Action taken: halved num_mpiprocs_per_machine");
        assert_eq!(reporter.messages().len(), 2);
        assert!(reporter.contains("Action taken"));
        assert!(!reporter.contains("never reported"));
    }

    #[test]
    fn test_noop_reporter_discards() {
        NoOpReporter.report("dropped");
    }
}
