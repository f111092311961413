//! Process-wide logger selection (component L), grounded on `log_open`/
//! `log_reopen`/`log_log` in the original project's `nslcd/log.c`: `none`
//! discards everything, `syslog` opens a syslog connection, and an
//! absolute path opens that file for append and reopens it on `SIGHUP` so
//! external log rotation doesn't need to restart the daemon.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::{LevelFilter, Log, Metadata, Record};
use syslog::{BasicLogger, Facility, Formatter3164};

use nslcd_config::{LogLevel, LogTarget};

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Crit => LevelFilter::Error,
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warning => LevelFilter::Warn,
        LogLevel::Notice => LevelFilter::Info,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
    }
}

fn level_to_u8(level: LevelFilter) -> u8 {
    level as u8
}

fn u8_to_level(value: u8) -> LevelFilter {
    match value {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

struct NopLogger;

impl Log for NopLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        false
    }
    fn log(&self, _record: &Record) {}
    fn flush(&self) {}
}

/// Reopenable file sink; `reopen` re-opens the same path in append mode so
/// a rotate-then-SIGHUP sequence starts writing to the new inode.
struct FileLogger {
    path: PathBuf,
    file: Mutex<File>,
    level: AtomicU8,
}

impl FileLogger {
    fn open(path: PathBuf, level: LevelFilter) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(FileLogger {
            path,
            file: Mutex::new(file),
            level: AtomicU8::new(level_to_u8(level)),
        })
    }

    fn reopen(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("reopening log file {}", self.path.display()))?;
        *self.file.lock().unwrap() = file;
        Ok(())
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= u8_to_level(self.level.load(Ordering::Relaxed))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "{} nslcd[{}]: {}", record.level(), std::process::id(), record.args());
    }

    fn flush(&self) {
        let _ = self.file.lock().unwrap().flush();
    }
}

/// Handle kept by the daemon so a `SIGHUP` can reopen a file sink and the
/// admin channel's `reload-log-level` command can adjust verbosity without
/// restarting.
pub enum LogHandle {
    None,
    Syslog,
    File(&'static FileLogger),
}

impl LogHandle {
    /// Re-open the underlying file, a no-op for the other sinks.
    pub fn reopen(&self) -> Result<()> {
        match self {
            LogHandle::File(logger) => logger.reopen(),
            _ => Ok(()),
        }
    }

    pub fn set_level(&self, level: LevelFilter) {
        log::set_max_level(level);
        if let LogHandle::File(logger) = self {
            logger.level.store(level_to_u8(level), Ordering::Relaxed);
        }
    }
}

/// Install the process-wide logger per `target`/`level`. Must be called
/// exactly once, before any worker starts logging.
pub fn init(target: &LogTarget, level: LogLevel) -> Result<LogHandle> {
    let filter = level_filter(level);
    match target {
        LogTarget::None => {
            log::set_boxed_logger(Box::new(NopLogger)).context("installing logger")?;
            log::set_max_level(LevelFilter::Off);
            Ok(LogHandle::None)
        }
        LogTarget::Syslog => {
            let formatter = Formatter3164 {
                facility: Facility::LOG_DAEMON,
                hostname: None,
                process: "nslcd".into(),
                pid: std::process::id(),
            };
            let logger = syslog::unix(formatter).context("connecting to syslog")?;
            log::set_boxed_logger(Box::new(BasicLogger::new(logger))).context("installing logger")?;
            log::set_max_level(filter);
            Ok(LogHandle::Syslog)
        }
        LogTarget::File(path) => {
            let logger: &'static FileLogger = Box::leak(Box::new(FileLogger::open(PathBuf::from(path), filter)?));
            log::set_logger(logger).context("installing logger")?;
            log::set_max_level(filter);
            Ok(LogHandle::File(logger))
        }
    }
}

/// Map the admin channel's free-form level name to a [`LevelFilter`].
pub fn parse_level_name(name: &str) -> Option<LevelFilter> {
    match name.to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}
