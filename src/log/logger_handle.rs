use std::sync::mpsc;

use crate::log::{log_level::LogLevel, log_msg::LogMsg, log_sink::LogSink, now_millis};

/// Cloneable producer side of the file [`Logger`](super::logger::Logger).
///
/// `try_log` never blocks: when the bounded queue is full the record is
/// dropped and the error returned. As a [`LogSink`] the error is ignored.
#[derive(Clone)]
pub struct LoggerHandle {
    pub(super) tx: mpsc::SyncSender<LogMsg>,
}

impl LogSink for LoggerHandle {
    #[inline]
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        let _ = self.try_log(level, msg, target);
    }
}

impl LoggerHandle {
    /// Enqueue a record stamped with the current wall-clock time.
    ///
    /// # Errors
    /// `TrySendError::Full` when the queue is at capacity,
    /// `TrySendError::Disconnected` once the writer thread is gone.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), mpsc::TrySendError<LogMsg>> {
        self.tx
            .try_send(LogMsg::new(level, text, target, now_millis()))
    }
}
