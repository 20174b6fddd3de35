// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only audit log of scan decisions.
//!
//! One log file per scan class. Each record is a single self-contained line:
//!
//! ```text
//! 2026-01-12T08:30:00.125Z [ALERT] /home/alice/payload.exe: Virus found (Eicar-Signature), moved to /var/lib/clamav/quarantine/realtime/payload.exe
//! ```
//!
//! Records are written, flushed and synced before `append` returns. Rotation
//! is left to logrotate.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Alert,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Alert => write!(f, "ALERT"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A single audit record. Never modified after it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub path: PathBuf,
    pub message: String,
}

impl LogRecord {
    #[must_use]
    pub fn new(level: Level, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Render as one log line (without trailing newline).
    /// Embedded line breaks are escaped so a record never spans lines.
    #[must_use]
    pub fn render(&self) -> String {
        let line = format!(
            "{} [{}] {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.path.display(),
            self.message
        );
        line.replace('\r', "\\r").replace('\n', "\\n")
    }
}

/// Append-only audit log file.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and sync it to disk.
    pub fn append(&self, record: &LogRecord) -> Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{}", record.render())
            .with_context(|| format!("Failed to write audit log {}", self.path.display()))?;
        file.flush()?;
        file.sync_data()
            .with_context(|| format!("Failed to sync audit log {}", self.path.display()))?;
        Ok(())
    }

    /// Build, mirror to the journal, and append a record.
    ///
    /// Write failures are reported to the journal only; a broken audit log
    /// must not stop scanning.
    pub fn record(&self, level: Level, path: &Path, message: impl Into<String>) {
        let record = LogRecord::new(level, path, message);
        match level {
            Level::Info => info!("{}: {}", path.display(), record.message),
            Level::Warning => warn!("{}: {}", path.display(), record.message),
            Level::Alert | Level::Error => error!("{}: {}", path.display(), record.message),
        }
        if let Err(e) = self.append(&record) {
            error!("Audit log write failed: {e:#}");
        }
    }
}
