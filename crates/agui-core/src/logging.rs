//! Wire transcript logging.
//!
//! When a log directory is configured, every frame sent or received is
//! appended to `{log_dir}/{log_id}.log` as a timestamped line. Diagnostic
//! logging goes through the `log` facade instead.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Thread-safe handle to an append-only transcript file.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// Direction label for a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
    Fallback,
    FallbackReply,
}

impl Direction {
    fn label(&self) -> &'static str {
        match self {
            Direction::Send => "SEND",
            Direction::Recv => "RECV",
            Direction::Fallback => "FALLBACK",
            Direction::FallbackReply => "FALLBACK-REPLY",
        }
    }
}

/// Write a timestamped line to the transcript (if one is open).
pub fn log_frame(handle: &LogHandle, direction: Direction, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            let _ = writeln!(file, "[{}] {}: {}", ts, direction.label(), data);
            let _ = file.flush();
        }
    }
}

/// Open (or create) `{log_dir}/{log_id}.log` and return a shared handle.
///
/// Without a directory, or when the file cannot be opened, the handle is
/// empty and logging is a no-op.
pub fn open_transcript(log_dir: Option<&Path>, log_id: &str) -> LogHandle {
    let file = log_dir.and_then(|dir| {
        let path = dir.join(format!("{}.log", log_id));
        if let Err(e) = std::fs::create_dir_all(dir) {
            log::warn!("Cannot create transcript dir {}: {}", dir.display(), e);
            return None;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| log::warn!("Cannot open transcript {}: {}", path.display(), e))
            .ok()
    });
    Arc::new(Mutex::new(file))
}
