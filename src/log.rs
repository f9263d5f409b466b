use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Append-only event log, mirrored to stdout.
///
/// Each line reads `[2026-10-17T08:15:02.114Z] message`. A failed file
/// write never interrupts the caller; the stdout copy is still printed.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Log that only prints to stdout.
    pub fn stdout_only() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn write(&self, msg: impl AsRef<str>) {
        let line = format_line(Utc::now(), msg.as_ref());

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = fs::create_dir_all(parent);
                }
            }
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{line}");
            }
        }

        println!("{line}");
    }
}

fn format_line(at: DateTime<Utc>, msg: &str) -> String {
    format!("[{}] {}", at.format("%Y-%m-%dT%H:%M:%S%.3fZ"), msg)
}
