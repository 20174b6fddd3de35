// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Admission of reported paths for scanning.
//!
//! Two stages, cheapest first:
//! 1. exclusion glob patterns against the full path (no syscall)
//! 2. existence and file type (`lstat`)
//!
//! Rejections are recorded in the audit log with their reason; admissions
//! are not (the scan outcome is logged later).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::audit::{AuditLog, Level};

/// Default exclusion patterns: editor swap/backup files, dotfiles and
/// anything inside dot-directories (version control metadata included).
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "**/*.swp",
    "**/*.swx",
    "**/*.swo",
    "**/*~",
    "**/*.bak",
    "**/*.tmp",
    "**/#*#",
    "**/.*",
    "**/.*/**",
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
];

/// Filter decision for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Scan it.
    Admit,
    /// Matched an exclusion pattern.
    Excluded(String),
    /// Gone before it could be checked (event/scan race).
    Vanished,
    /// Exists but could not be inspected.
    Unreadable(String),
    /// A directory; its files get their own events.
    Directory,
    /// Symlink, FIFO, socket or device.
    NotRegular,
}

impl Admission {
    /// Audit severity and message for a rejection, `None` for `Admit`.
    #[must_use]
    pub fn rejection(&self) -> Option<(Level, String)> {
        match self {
            Self::Admit => None,
            Self::Excluded(pattern) => Some((
                Level::Info,
                format!("Skipping excluded path (pattern '{pattern}')"),
            )),
            Self::Vanished => Some((
                Level::Warning,
                "File vanished before scan, skipping".to_string(),
            )),
            Self::Unreadable(e) => Some((Level::Warning, format!("Cannot inspect file: {e}"))),
            Self::Directory => Some((Level::Info, "Skipping directory".to_string())),
            Self::NotRegular => Some((Level::Info, "Skipping non-regular file".to_string())),
        }
    }
}

/// Decides whether a reported path warrants a scan.
pub struct EventFilter {
    patterns: Vec<String>,
    set: GlobSet,
    audit: Arc<AuditLog>,
}

impl EventFilter {
    /// Compile the exclusion patterns.
    pub fn new(patterns: &[String], audit: Arc<AuditLog>) -> Result<Self> {
        let set = build_exclusions(patterns)?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
            audit,
        })
    }

    /// First exclusion pattern matching `path`.
    #[must_use]
    pub fn excluded_by(&self, path: &Path) -> Option<&str> {
        self.set
            .matches(path)
            .into_iter()
            .min()
            .map(|idx| self.patterns[idx].as_str())
    }

    /// Classify a path without logging.
    #[must_use]
    pub fn check(&self, path: &Path) -> Admission {
        if let Some(pattern) = self.excluded_by(path) {
            return Admission::Excluded(pattern.to_string());
        }

        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_file() => Admission::Admit,
            Ok(meta) if meta.is_dir() => Admission::Directory,
            Ok(_) => Admission::NotRegular,
            Err(e) if e.kind() == ErrorKind::NotFound => Admission::Vanished,
            Err(e) => Admission::Unreadable(e.to_string()),
        }
    }

    /// Admit `path` for scanning, recording the reason if it is rejected.
    pub fn admit(&self, path: &Path) -> bool {
        let admission = self.check(path);
        match admission.rejection() {
            None => true,
            Some((level, message)) => {
                self.audit.record(level, path, message);
                false
            }
        }
    }
}

/// Compile exclusion patterns. `*` does not cross `/`; use `**` for that.
pub fn build_exclusions(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile(pattern)?);
    }
    builder.build().context("Failed to build exclusion set")
}

fn compile(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid exclusion pattern '{pattern}'"))
}
