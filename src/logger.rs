//! Rolling file logger installed as the global `log` sink.
//!
//! Every subsystem logs through the `log` facade (`log::info!`, etc.); this
//! module is the one concrete `log::Log` implementation wired up at boot.
//! Grounded on the teacher's `SimpleLogger`: a chrono-timestamped, bounded
//! ring buffer flushed to a single file under a mutex.

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DEFAULT_LOG_PATH: &str = "concierge.log";
const MAX_ENTRIES: usize = 5_000;

struct RollingFileLogger {
    path: PathBuf,
    max_entries: usize,
    buffer: Mutex<VecDeque<String>>,
    level: LevelFilter,
}

impl RollingFileLogger {
    fn new(path: PathBuf, max_entries: usize, level: LevelFilter) -> Self {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = fs::create_dir_all(parent) {
                    eprintln!("logger: failed to create {}: {}", parent.display(), err);
                }
            }
        }

        let buffer = Self::read_existing(&path, max_entries).unwrap_or_else(|err| {
            eprintln!(
                "logger: failed to read existing log {}: {}",
                path.display(),
                err
            );
            VecDeque::with_capacity(max_entries)
        });

        Self {
            path,
            max_entries,
            buffer: Mutex::new(buffer),
            level,
        }
    }

    fn read_existing(path: &Path, max_entries: usize) -> io::Result<VecDeque<String>> {
        if !path.exists() {
            return Ok(VecDeque::with_capacity(max_entries));
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = VecDeque::with_capacity(max_entries);
        for line in reader.lines() {
            let line = line?;
            if lines.len() == max_entries {
                lines.pop_front();
            }
            lines.push_back(line);
        }
        Ok(lines)
    }

    fn write_all(path: &Path, lines: &VecDeque<String>) -> io::Result<()> {
        let mut file = File::create(path)?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}

impl Log for RollingFileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let now = Local::now();
        let timestamp = format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            now.format("%Y"),
            now.format("%m"),
            now.format("%d"),
            now.format("%H"),
            now.format("%M"),
            now.format("%S"),
            now.timestamp_subsec_millis()
        );
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let entry = format!(
            "{} {:<5} {}: {}",
            timestamp,
            level,
            record.target(),
            record.args()
        );

        let mut buffer = match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                eprintln!("logger: mutex poisoned, recovering buffer");
                poisoned.into_inner()
            }
        };

        buffer.push_back(entry);
        if buffer.len() > self.max_entries {
            buffer.pop_front();
        }

        if let Err(err) = Self::write_all(&self.path, &buffer) {
            eprintln!("logger: failed to write {}: {}", self.path.display(), err);
        }
    }

    fn flush(&self) {}
}

/// Install the rolling file logger as the global `log` sink.
///
/// Safe to call once; subsequent calls are no-ops (matches `log`'s own
/// single-initialization contract).
pub fn install(path: impl Into<PathBuf>, level: LevelFilter) {
    let logger = RollingFileLogger::new(path.into(), MAX_ENTRIES, level);
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
}

/// Install with the default path (`concierge.log`) and `Info` level.
pub fn install_default() {
    install(DEFAULT_LOG_PATH, LevelFilter::Info);
}
