// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::engine::{ClamdEngine, CommandEngine, CommandFlavor, DEFAULT_CLAMD_SOCKET, ScanEngine};
use crate::error::SetupError;
use crate::filter::{DEFAULT_EXCLUSIONS, build_exclusions};
use crate::quarantine::ScanClass;

const fn default_workers() -> usize {
    4
}

const fn default_queue_capacity() -> usize {
    1024
}

const fn default_scan_timeout_secs() -> u64 {
    300
}

fn default_realtime_log() -> PathBuf {
    PathBuf::from("/var/log/clamav/realtime-scan.log")
}

fn default_daily_log() -> PathBuf {
    PathBuf::from("/var/log/clamav/daily-scan.log")
}

fn default_exclusions() -> Vec<String> {
    DEFAULT_EXCLUSIONS.iter().map(ToString::to_string).collect()
}

fn default_service_account() -> String {
    "clamav".to_string()
}

fn default_fallback_account() -> String {
    "root".to_string()
}

/// Scan engine selection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineConfig {
    /// `clamdscan` client handing files to the running clamd.
    Clamdscan {
        #[serde(default = "EngineConfig::default_clamdscan")]
        binary: PathBuf,
    },
    /// Standalone `clamscan`.
    Clamscan {
        #[serde(default = "EngineConfig::default_clamscan")]
        binary: PathBuf,
    },
    /// Direct clamd socket with fd passing.
    Clamd {
        #[serde(default = "EngineConfig::default_socket")]
        socket: PathBuf,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Clamdscan {
            binary: Self::default_clamdscan(),
        }
    }
}

impl EngineConfig {
    fn default_clamdscan() -> PathBuf {
        PathBuf::from("clamdscan")
    }

    fn default_clamscan() -> PathBuf {
        PathBuf::from("clamscan")
    }

    fn default_socket() -> PathBuf {
        PathBuf::from(DEFAULT_CLAMD_SOCKET)
    }

    /// Instantiate the configured engine.
    #[must_use]
    pub fn build(&self) -> Arc<dyn ScanEngine> {
        match self {
            Self::Clamdscan { binary } => {
                Arc::new(CommandEngine::new(CommandFlavor::Clamdscan, binary.clone()))
            }
            Self::Clamscan { binary } => {
                Arc::new(CommandEngine::new(CommandFlavor::Clamscan, binary.clone()))
            }
            Self::Clamd { socket } => Arc::new(ClamdEngine::new(socket.clone())),
        }
    }
}

/// Process configuration, loaded once at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Root of the real-time watch.
    pub watch_path: PathBuf,

    /// Root of the scheduled full scan (default: `watch_path`).
    #[serde(default)]
    pub scan_path: Option<PathBuf>,

    /// Quarantine base; each scan class gets its own subdirectory.
    pub quarantine_path: PathBuf,

    #[serde(default = "default_realtime_log")]
    pub realtime_log: PathBuf,

    #[serde(default = "default_daily_log")]
    pub daily_log: PathBuf,

    /// Glob patterns matched against the full path.
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,

    /// Maximum concurrent scans (distinct paths).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the event queue between watcher and scanners.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-scan timeout in seconds; 0 disables it.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Preferred owner of quarantined files.
    #[serde(default = "default_service_account")]
    pub service_account: String,

    /// Owner used when the service account does not exist.
    #[serde(default = "default_fallback_account")]
    pub fallback_account: String,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Check if a path is an accessible directory.
fn check_dir(dir: &Path) -> Result<(), &'static str> {
    match dir.metadata() {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err("is not a directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => Err("does not exist"),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err("permission denied"),
        Err(_) => Err("is not accessible"),
    }
}

impl Config {
    /// Root of the scheduled full scan.
    #[must_use]
    pub fn scan_root(&self) -> &Path {
        self.scan_path.as_deref().unwrap_or(self.watch_path.as_path())
    }

    /// Engine call timeout, `None` when disabled.
    #[must_use]
    pub const fn scan_timeout(&self) -> Option<Duration> {
        match self.scan_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Audit log file for a scan class.
    #[must_use]
    pub fn log_path(&self, class: ScanClass) -> &Path {
        match class {
            ScanClass::Realtime => &self.realtime_log,
            ScanClass::Daily => &self.daily_log,
        }
    }

    /// Validate configuration.
    /// Returns `Ok(())` if valid, or `Err(Vec<String>)` with error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = check_dir(&self.watch_path) {
            errors.push(format!("watchPath {} {e}", self.watch_path.display()));
        }
        if let Some(scan_path) = &self.scan_path {
            if let Err(e) = check_dir(scan_path) {
                errors.push(format!("scanPath {} {e}", scan_path.display()));
            }
        }

        if !self.quarantine_path.is_absolute() {
            errors.push("quarantinePath must be absolute".to_string());
        }
        if self.quarantine_path == self.watch_path {
            errors.push("quarantinePath must not be the watch root itself".to_string());
        }

        if self.workers == 0 {
            errors.push("workers must be at least 1".to_string());
        }
        if self.queue_capacity == 0 {
            errors.push("queueCapacity must be at least 1".to_string());
        }
        if self.service_account.is_empty() && self.fallback_account.is_empty() {
            errors.push("No quarantine owner account configured".to_string());
        }
        if self.realtime_log == self.daily_log {
            errors.push("realtimeLog and dailyLog must differ".to_string());
        }

        if let Err(e) = build_exclusions(&self.exclusions) {
            errors.push(format!("{e:#}"));
        }

        match &self.engine {
            EngineConfig::Clamdscan { binary } | EngineConfig::Clamscan { binary }
                if binary.as_os_str().is_empty() =>
            {
                errors.push("engine binary must not be empty".to_string());
            }
            EngineConfig::Clamd { socket } if socket.as_os_str().is_empty() => {
                errors.push("engine socket must not be empty".to_string());
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Log configuration info.
    pub fn log_config_info(&self) {
        info!(
            "Watching {} with {} workers (queue {})",
            self.watch_path.display(),
            self.workers,
            self.queue_capacity
        );
        match self.scan_timeout() {
            Some(timeout) => debug!("Scan timeout: {timeout:?}"),
            None => info!("Scan timeout disabled"),
        }
        debug!("Engine: {:?}", self.engine);
        debug!("Exclusions: {:?}", self.exclusions);
    }

    fn parse(config_path: &Path) -> Result<Self> {
        let config_data = fs::read(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_slice(&config_data).context("Failed to parse config JSON")
    }

    /// Load and validate configuration from file.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = Self::parse(config_path)?;

        if let Err(errors) = config.validate() {
            for err in &errors {
                error!("Configuration: {err}");
            }
            return Err(SetupError::InvalidConfig(errors).into());
        }

        config.log_config_info();
        Ok(config)
    }
}

/// Verify configuration file without starting daemon.
pub fn verify_config(config_path: &Path) -> Result<()> {
    let config = Config::parse(config_path)?;

    match config.validate() {
        Ok(()) => {
            eprintln!("Configuration valid");
            Ok(())
        }
        Err(errors) => {
            for err in &errors {
                eprintln!("{err}");
            }
            anyhow::bail!("Configuration has {} errors", errors.len());
        }
    }
}
