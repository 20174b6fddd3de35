// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Failure kinds.
//!
//! Per-file failures ([`ScanFailure`]) are logged and never stop the process.
//! Setup failures ([`SetupError`]) abort startup.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::audit::Level;

/// A scan attempt that did not end in a clean or handled-infected state.
#[derive(Debug, Error)]
pub enum ScanFailure {
    /// Engine exited with a code other than 0 or 1.
    #[error("engine exited with code {code}")]
    Engine { code: i32 },

    /// Engine could not be run at all.
    #[error("engine invocation failed: {0}")]
    Invocation(String),

    /// Engine call exceeded the configured timeout.
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),

    /// Engine reported an infection but the file did not land in quarantine.
    #[error("infected file not quarantined under {}: {reason}", .root.display())]
    QuarantineVerification { root: PathBuf, reason: String },
}

impl ScanFailure {
    /// Audit severity for this failure.
    #[must_use]
    pub const fn level(&self) -> Level {
        match self {
            Self::QuarantineVerification { .. } => Level::Alert,
            Self::Engine { .. } | Self::Invocation(_) | Self::Timeout(_) => Level::Error,
        }
    }
}

/// Conditions that prevent the process from starting in a safe state.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("watch root {} does not exist or is not a directory", .0.display())]
    MissingRoot(PathBuf),

    #[error(
        "inotify watch limit reached at {}; raise fs.inotify.max_user_watches",
        .0.display()
    )]
    WatchLimit(PathBuf),

    #[error("failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("quarantine root {}: {reason}", .path.display())]
    Quarantine { path: PathBuf, reason: String },

    #[error("neither service account '{service}' nor fallback '{fallback}' exists")]
    NoOwnerAccount { service: String, fallback: String },

    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
}
