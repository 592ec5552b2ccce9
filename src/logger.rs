//! Session logger: writes editor log output to a single file in the OS data directory.
//!
//! The file is **truncated at each launch**, so it only ever contains output
//! from the most-recent editing session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\MemeFE\memefe.log`
//!   Linux:    `~/.local/share/MemeFE/memefe.log`
//!   macOS:    `~/Library/Application Support/MemeFE/memefe.log`
//!
//! `MEMEFE_LOG_DIR` overrides the directory.  Anywhere in the crate use the
//! `log_debug!` / `log_info!` / `log_warn!` / `log_err!` macros; debug lines
//! are only written after [`set_verbose`]`(true)`.  Until [`init`] has been
//! called (library use, tests) every write is a silent no-op.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Environment variable that overrides the log directory.
pub const LOG_DIR_ENV: &str = "MEMEFE_LOG_DIR";

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Write a line to the session log.  I/O errors are swallowed so that
/// logging never takes the editor down.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Enable or disable `DEBUG` lines (pointer traces, per-render timings).
pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Write a timestamped, level-tagged line to the session log.
pub fn write(level: &str, msg: &str) {
    let ts = timestamp();
    write_line(&format!("[{}] [{}] {}", ts, level, msg));
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::logger::is_verbose() {
            $crate::logger::write("DEBUG", &format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        { $crate::logger::write("INFO", &format!($($arg)*)) }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        { $crate::logger::write("WARN", &format!($($arg)*)) }
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        { $crate::logger::write("ERROR", &format!($($arg)*)) }
    };
}

/// Initialise the session logger.  Call once at startup, before the editor
/// window opens.
///
/// * Creates (or truncates) the log file.
/// * Installs a panic hook that mirrors the panic message into the log.
pub fn init() {
    let path = log_file_path();

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);

    match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            let _ = LOG_FILE.set(Mutex::new(f));
        }
        Err(e) => {
            // Not fatal: the editor runs without a log.
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return;
        }
    }

    write_line(&format!(
        "=== MemeFE session started {} ===",
        human_timestamp()
    ));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    if let Ok(dir) = std::env::var(LOG_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir).join("memefe.log");
    }
    data_dir().join("MemeFE").join("memefe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            let h = (secs % 86400) / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            format!("{:02}:{:02}:{:02}", h, m, s)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
