use crate::log::log_level::LogLevel;

/// Destination for log records. Implementations must never block the caller
/// for long: the event loop logs from its hot path.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}
