use std::sync::Mutex;

use crate::log::{log_level::LogLevel, log_sink::LogSink};

/// In-memory sink that keeps every record. Used by tests to assert that a
/// fault was diagnosed without surfacing as an error.
#[derive(Debug, Default)]
pub struct CaptureLogSink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl CaptureLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured records.
    #[must_use]
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        match self.lines.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any record at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(l, text)| *l == level && text.contains(needle))
    }
}

impl LogSink for CaptureLogSink {
    fn log(&self, level: LogLevel, msg: &str, _target: &'static str) {
        let mut guard = match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((level, msg.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_level_and_text() {
        let sink = CaptureLogSink::new();
        sink.log(LogLevel::Warn, "peer bob unreachable", "test");
        sink.log(LogLevel::Info, "started", "test");

        assert!(sink.contains(LogLevel::Warn, "unreachable"));
        assert!(!sink.contains(LogLevel::Info, "unreachable"));
        assert_eq!(sink.lines().len(), 2);
    }
}
