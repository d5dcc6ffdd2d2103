use crate::log::log_level::LogLevel;

/// A single log record as it travels to the writer thread.
#[derive(Debug, Clone)]
pub struct LogMsg {
    pub level: LogLevel,
    /// Milliseconds since the UNIX epoch.
    pub ts_ms: u128,
    pub text: String,
    /// Module path of the call site.
    pub target: &'static str,
}

impl LogMsg {
    pub fn new(
        level: LogLevel,
        text: impl Into<String>,
        target: &'static str,
        ts_ms: u128,
    ) -> Self {
        Self {
            level,
            ts_ms,
            text: text.into(),
            target,
        }
    }

    /// One line as written to the log file.
    #[must_use]
    pub fn format_line(&self) -> String {
        format!(
            "[{}] {} {} | {}",
            self.level, self.ts_ms, self.target, self.text
        )
    }
}
