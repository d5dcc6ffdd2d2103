use crate::{
    config::LoggingConfig,
    log::{log_level::LogLevel, log_msg::LogMsg, logger_handle::LoggerHandle, now_millis},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

/// Flush every 100 lines when debugging so a crash leaves recent history on disk.
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

/// Queue depth between producers and the writer thread.
pub const DEFAULT_LOG_QUEUE: usize = 4_096;

/// Bounded, non-blocking logger writing one file per process.
///
/// Producers (the event loop, connection workers, discovery) hold cloned
/// [`LoggerHandle`]s and enqueue with `try_send`; a `logger-worker` thread
/// drains the queue into the file. Warn/Error lines are optionally echoed to
/// stderr for the console front-end.
pub struct Logger {
    handle: LoggerHandle,
    thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Start a logger as described by the `[Logging]` section.
    #[must_use]
    pub fn start(cfg: &LoggingConfig) -> Self {
        let dir = cfg
            .path
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| exe_dir_fallback_cwd().join("logs"));
        Self::start_in_dir(dir, cfg.filename.as_deref(), DEFAULT_LOG_QUEUE, cfg.echo_stderr)
    }

    /// Start the writer in `dir`, creating it if missing.
    ///
    /// File name: `<app_name>-<unix_secs>-pid<pid>.log`, or without the prefix
    /// when `app_name` is `None`.
    pub fn start_in_dir<D: AsRef<Path>>(
        dir: D,
        app_name: Option<&str>,
        cap: usize,
        echo_stderr: bool,
    ) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let secs = now_millis() / 1_000;
        let pid = std::process::id();
        let fname = match app_name {
            Some(name) => format!("{name}-{secs}-pid{pid}.log"),
            None => format!("lanpeer-{secs}-pid{pid}.log"),
        };
        let file_path = dir.join(fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let path_for_worker = file_path.clone();

        let thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || run_writer(&path_for_worker, &rx, echo_stderr))
            .ok();

        Self {
            handle: LoggerHandle { tx },
            thread,
            file_path,
        }
    }

    /// Cloneable producer handle; also usable as `Arc<dyn LogSink>`.
    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Drop the producer side held by this logger and wait for the writer to
    /// flush. Other cloned handles keep the writer alive until they drop.
    pub fn shutdown(self) {
        let Self { handle, thread, .. } = self;
        drop(handle);
        if let Some(t) = thread {
            let _ = t.join();
        }
    }
}

fn run_writer(path: &Path, rx: &mpsc::Receiver<LogMsg>, echo_stderr: bool) {
    // Target file, then a temp-dir fallback, then a sink. Never panic.
    let writer: Box<dyn Write + Send> =
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Box::new(f),
            Err(_) => {
                let fallback = std::env::temp_dir().join("lanpeer-fallback.log");
                match OpenOptions::new().create(true).append(true).open(&fallback) {
                    Ok(f) => Box::new(f),
                    Err(_) => Box::new(io::sink()),
                }
            }
        };
    let mut out = BufWriter::new(writer);
    let mut lines_written: u32 = 0;

    while let Ok(m) = rx.recv() {
        let line = m.format_line();
        let _ = writeln!(&mut out, "{line}");
        lines_written = lines_written.wrapping_add(1);

        if lines_written.is_multiple_of(FLUSH_BATCH_SIZE) || m.level == LogLevel::Error {
            let _ = out.flush();
        }
        if echo_stderr && m.level >= LogLevel::Warn {
            eprintln!("{line}");
        }
    }

    let _ = out.flush();
}

/// Directory of the running executable, or the working directory.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Expands a leading `~` to the user's home directory.
fn expand_path(path_str: &str) -> PathBuf {
    let rest = match path_str.strip_prefix('~') {
        Some(rest) => rest,
        None => return PathBuf::from(path_str),
    };
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from);
    match home {
        Some(home) if rest.is_empty() => home,
        Some(mut home) if rest.starts_with('/') || rest.starts_with('\\') => {
            home.push(&rest[1..]);
            home
        }
        _ => PathBuf::from(path_str),
    }
}
