//! Timestamped, tagged log lines
//!
//! Every line has the shape `<timestamp> <LEVEL> [TAG][thread] message` and goes to stderr.
//! [`init`] may add an append-only file; lines written there carry the run id so several
//! sessions appended to one file can be told apart.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use time::macros::format_description;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
        })
    }
}

struct FileSink {
    file: File,
    run_id: String,
}

static SINK: Mutex<Option<FileSink>> = Mutex::new(None);
static RUN_ID: OnceLock<String> = OnceLock::new();

/// Set up logging for this process and return its run id.
///
/// Safe to call more than once; the run id is fixed by the first call and a later
/// `log_file` replaces the earlier one.
pub fn init(log_file: Option<PathBuf>) -> String {
    let rid = RUN_ID.get_or_init(new_run_id).clone();

    let Some(path) = log_file else {
        return rid;
    };
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            if let Ok(mut sink) = SINK.lock() {
                *sink = Some(FileSink { file, run_id: rid.clone() });
            }
        }
        // No sink yet, so this goes to stderr only.
        Err(e) => log_line(Level::Warn, "LOG", &format!("cannot open {}: {e}", path.display())),
    }
    rid
}

fn new_run_id() -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    format!("{:08x}", (nanos as u64 ^ u64::from(std::process::id())) & 0xffff_ffff)
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `YYYY-MM-DD HH:MM:SS.mmm`, local time when the offset is known, else UTC.
pub fn log_timestamp() -> String {
    now()
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"))
        .unwrap_or_else(|_| "????-??-?? ??:??:??.???".to_string())
}

/// `HH:MM` stamp for build-result lines.
pub fn clock_hhmm() -> String {
    now()
        .format(format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| "--:--".to_string())
}

fn thread_label() -> String {
    let t = std::thread::current();
    match t.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", t.id()),
    }
}

#[doc(hidden)]
pub fn format_line(level: Level, tag: &str, msg: &str) -> String {
    format!("{} {level} [{tag}][{}] {msg}", log_timestamp(), thread_label())
}

#[doc(hidden)]
pub fn log_line(level: Level, tag: &str, msg: &str) {
    let line = format_line(level, tag, msg);
    eprintln!("{line}");

    let Ok(mut guard) = SINK.lock() else { return };
    if let Some(sink) = guard.as_mut() {
        // A failing log file must never take the preview down.
        let _ = writeln!(sink.file, "{} {line}", sink.run_id);
    }
}

#[macro_export]
macro_rules! logi {
    ($tag:expr, $($arg:tt)*) => {
        $crate::logging::log_line($crate::logging::Level::Info, $tag, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! logw {
    ($tag:expr, $($arg:tt)*) => {
        $crate::logging::log_line($crate::logging::Level::Warn, $tag, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! loge {
    ($tag:expr, $($arg:tt)*) => {
        $crate::logging::log_line($crate::logging::Level::Error, $tag, &format!($($arg)*))
    };
}
