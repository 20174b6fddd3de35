// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Scan engine contract and `ClamAV` implementations.
//!
//! An engine takes a path and a quarantine directory, scans the path
//! (recursively, archives included, excluded directories skipped) and moves
//! every infected file into the quarantine directory within the same call.
//! It answers with a clamscan-style exit code:
//!
//! - `0`: no virus found
//! - `1`: virus found (and expected to be quarantined)
//! - anything else: engine error
//!
//! Two engines are provided:
//! - [`CommandEngine`] runs `clamdscan` or `clamscan` with `--move`
//! - [`ClamdEngine`] talks to clamd over its Unix socket using FILDES and
//!   performs the quarantine move itself

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use sendfd::SendWithFd;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::quarantine::move_into;

/// Exit code used when the engine result has to be synthesized
/// (killed by a signal, failed to start, timed out).
pub const ENGINE_FAILURE_CODE: i32 = 2;

/// Default clamd control socket.
pub const DEFAULT_CLAMD_SOCKET: &str = "/run/clamav/clamd.ctl";

/// Socket read/write timeout for a single clamd request.
const CLAMD_IO_TIMEOUT: Duration = Duration::from_secs(120);

/// How often a blocked clamd read checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Timeout for `--version` availability probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Types
// =============================================================================

/// A single scan request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// File (or, for full scans, directory) to scan.
    pub path: PathBuf,
    /// Directory infected files must be moved into.
    pub quarantine_root: PathBuf,
    /// Directories never scanned, even when nested under `path`.
    pub excluded: Vec<PathBuf>,
}

/// Classification of an engine exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    Infected,
    EngineError,
}

impl ScanOutcome {
    /// Fixed exit code mapping: 0 clean, 1 infected, anything else error.
    #[must_use]
    pub const fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Self::Clean,
            1 => Self::Infected,
            _ => Self::EngineError,
        }
    }
}

/// Raw engine answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResponse {
    pub exit_code: i32,
    pub output: String,
}

/// Interpreted engine answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanVerdict {
    pub outcome: ScanOutcome,
    pub raw_message: String,
    pub exit_code: i32,
}

impl ScanVerdict {
    /// Verdict for a scan that produced no usable engine answer.
    #[must_use]
    pub fn engine_failure(message: impl Into<String>) -> Self {
        Self {
            outcome: ScanOutcome::EngineError,
            raw_message: message.into(),
            exit_code: ENGINE_FAILURE_CODE,
        }
    }
}

impl From<EngineResponse> for ScanVerdict {
    fn from(response: EngineResponse) -> Self {
        Self {
            outcome: ScanOutcome::from_exit_code(response.exit_code),
            raw_message: response.output,
            exit_code: response.exit_code,
        }
    }
}

/// External scan engine.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Validate that the engine is available and functional.
    async fn validate_availability(&self) -> Result<()>;

    /// Scan `request.path`, moving detections into `request.quarantine_root`.
    ///
    /// Once `cancel` fires the engine stops without moving anything further
    /// and returns; the caller awaits that return before releasing the path.
    /// Returns `Err` only if the engine could not be invoked at all.
    async fn scan(
        &self,
        request: &ScanRequest,
        cancel: &CancellationToken,
    ) -> Result<EngineResponse>;
}

/// Paths covering `path` minus the excluded directories.
///
/// Without overlap this is just `path`. When an excluded directory is nested
/// inside, the tree is split along the way down to it: every sibling on that
/// route becomes its own target. Empty when `path` itself is excluded.
#[must_use]
pub fn scan_targets(path: &Path, excluded: &[PathBuf]) -> Vec<PathBuf> {
    if excluded.iter().any(|e| path.starts_with(e)) {
        return Vec::new();
    }
    let nested: Vec<&PathBuf> = excluded.iter().filter(|e| e.starts_with(path)).collect();
    if nested.is_empty() {
        return vec![path.to_path_buf()];
    }

    let Ok(entries) = fs::read_dir(path) else {
        return vec![path.to_path_buf()];
    };
    let mut children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    children.sort();

    let mut targets = Vec::new();
    for child in children {
        if nested.iter().any(|e| **e == child) {
            debug!("Not scanning excluded {}", child.display());
            continue;
        }
        let on_route = nested.iter().any(|e| e.starts_with(&child));
        let is_dir = fs::symlink_metadata(&child).is_ok_and(|m| m.is_dir());
        if on_route && is_dir {
            targets.extend(scan_targets(&child, excluded));
        } else {
            targets.push(child);
        }
    }
    targets
}

/// Extract `<path>: <signature> FOUND` lines from engine output.
#[must_use]
pub fn parse_found_lines(output: &str) -> Vec<(PathBuf, String)> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_suffix(" FOUND"))
        .filter_map(|line| line.rsplit_once(": "))
        .map(|(path, signature)| (PathBuf::from(path), signature.to_string()))
        .collect()
}

/// Destination the engine reports for `path` in a `<path>: moved to '<dest>'`
/// line, if any.
#[must_use]
pub fn reported_destination(output: &str, path: &Path) -> Option<PathBuf> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_suffix('\''))
        .filter_map(|line| line.rsplit_once(": moved to '"))
        .find(|(moved, _)| Path::new(moved) == path)
        .map(|(_, dest)| PathBuf::from(dest))
}

// =============================================================================
// CommandEngine
// =============================================================================

/// Which `ClamAV` command line client to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlavor {
    /// `clamdscan`: hands the scan to the running clamd (multi-threaded).
    Clamdscan,
    /// `clamscan`: standalone scanner, loads signatures per invocation.
    Clamscan,
}

/// Runs a `ClamAV` command line client as a child process.
pub struct CommandEngine {
    flavor: CommandFlavor,
    binary: PathBuf,
}

impl CommandEngine {
    #[must_use]
    pub const fn new(flavor: CommandFlavor, binary: PathBuf) -> Self {
        Self { flavor, binary }
    }

    /// Command line arguments for scanning `targets` on behalf of a request.
    fn args(&self, request: &ScanRequest, targets: &[PathBuf]) -> Vec<OsString> {
        let mut move_arg = OsString::from("--move=");
        move_arg.push(&request.quarantine_root);

        let mut args: Vec<OsString> = match self.flavor {
            // Archive scanning is clamd configuration (ScanArchive)
            CommandFlavor::Clamdscan => vec!["--multiscan".into(), "--fdpass".into()],
            CommandFlavor::Clamscan => vec!["--recursive".into(), "--scan-archive=yes".into()],
        };
        args.push("--infected".into());
        args.push(move_arg);
        args.push("--".into());
        args.extend(targets.iter().map(|t| t.clone().into_os_string()));
        args
    }
}

async fn read_all(pipe: Option<impl AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            warn!("Failed to read engine output: {e}");
        }
    }
    buf
}

#[async_trait]
impl ScanEngine for CommandEngine {
    async fn validate_availability(&self) -> Result<()> {
        let probe = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(PROBE_TIMEOUT, probe)
            .await
            .with_context(|| format!("{} --version timed out", self.binary.display()))?
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            );
        }
        info!(
            "Scan engine available: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn scan(
        &self,
        request: &ScanRequest,
        cancel: &CancellationToken,
    ) -> Result<EngineResponse> {
        let targets = scan_targets(&request.path, &request.excluded);
        if targets.is_empty() {
            debug!("Nothing to scan under {}", request.path.display());
            return Ok(EngineResponse {
                exit_code: 0,
                output: String::new(),
            });
        }
        debug!(
            "Running {} on {}",
            self.binary.display(),
            request.path.display()
        );

        let mut child = tokio::process::Command::new(&self.binary)
            .args(self.args(request, &targets))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async { tokio::join!(read_all(stdout), read_all(stderr), child.wait()) };
        let finished = tokio::select! {
            done = run => Some(done),
            () = cancel.cancelled() => None,
        };
        let Some((stdout, stderr, status)) = finished else {
            // Reap the child so no move of its outlives this call
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {e}", self.binary.display());
            }
            anyhow::bail!("{} cancelled", self.binary.display());
        };
        let status =
            status.with_context(|| format!("Failed to wait for {}", self.binary.display()))?;

        let mut text = String::from_utf8_lossy(&stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&stderr));

        let exit_code = status.code().unwrap_or_else(|| {
            warn!("{} terminated by signal", self.binary.display());
            ENGINE_FAILURE_CODE
        });

        Ok(EngineResponse {
            exit_code,
            output: text,
        })
    }
}

// =============================================================================
// ClamdEngine
// =============================================================================

/// Per-file clamd response.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Detection {
    Clean,
    Infected(String),
    Error(String),
}

/// `ClamAV` daemon client using the FILDES command over a Unix socket.
///
/// Each file is opened here and its descriptor passed to clamd, so the bytes
/// scanned are the bytes of the file that gets moved.
pub struct ClamdEngine {
    socket: PathBuf,
}

impl ClamdEngine {
    #[must_use]
    pub const fn new(socket: PathBuf) -> Self {
        Self { socket }
    }

    fn connect(socket: &Path) -> std::io::Result<UnixStream> {
        let stream = UnixStream::connect(socket)?;
        stream.set_read_timeout(Some(CLAMD_IO_TIMEOUT))?;
        stream.set_write_timeout(Some(CLAMD_IO_TIMEOUT))?;
        Ok(stream)
    }

    fn read_reply(stream: &mut UnixStream) -> std::io::Result<String> {
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..n])
            .trim_matches('\0')
            .trim()
            .to_string())
    }

    fn ping(socket: &Path) -> std::io::Result<String> {
        let mut stream = Self::connect(socket)?;
        stream.write_all(b"zPING\0")?;
        Self::read_reply(&mut stream)
    }

    /// Wait for a scan reply in short slices so cancellation is noticed.
    ///
    /// `None` once `cancel` fires; the overall wait is still bounded by
    /// `CLAMD_IO_TIMEOUT`.
    fn read_scan_reply(
        stream: &mut UnixStream,
        cancel: &CancellationToken,
    ) -> io::Result<Option<String>> {
        stream.set_read_timeout(Some(CANCEL_POLL))?;
        let started = Instant::now();
        loop {
            match Self::read_reply(stream) {
                Ok(reply) => return Ok(Some(reply)),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    if started.elapsed() >= CLAMD_IO_TIMEOUT {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send_fd_for_scan(
        socket: &Path,
        fd: BorrowedFd<'_>,
        cancel: &CancellationToken,
    ) -> io::Result<Option<String>> {
        let mut stream = Self::connect(socket)?;
        stream.write_all(b"nFILDES\n")?;
        stream.send_with_fd(&[0], &[fd.as_raw_fd()])?;
        Self::read_scan_reply(&mut stream, cancel)
    }

    /// Parse a clamd response line.
    fn parse_response(response: &str) -> Detection {
        if response.ends_with("OK") {
            return Detection::Clean;
        }

        if let Some(rest) = response.strip_suffix(" FOUND") {
            let signature = rest.rsplit_once(": ").map_or("unknown", |(_, s)| s);
            return Detection::Infected(signature.to_string());
        }

        Detection::Error(response.to_string())
    }

    /// Regular files under `path` (or `path` itself), symlinks skipped.
    fn collect_files(path: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![path.to_path_buf()];
        while let Some(entry) = stack.pop() {
            let Ok(meta) = fs::symlink_metadata(&entry) else {
                continue;
            };
            let ft = meta.file_type();
            if ft.is_dir() {
                if let Ok(entries) = fs::read_dir(&entry) {
                    stack.extend(entries.flatten().map(|e| e.path()));
                }
            } else if ft.is_file() {
                files.push(entry);
            }
        }
        files.sort();
        files
    }

    /// Regular files a request covers, excluded directories left out.
    fn request_files(request: &ScanRequest) -> Vec<PathBuf> {
        scan_targets(&request.path, &request.excluded)
            .iter()
            .flat_map(|target| Self::collect_files(target))
            .collect()
    }

    /// Scan every file under the request path and quarantine detections.
    ///
    /// Stops at the next file or reply boundary once `cancel` fires and
    /// never moves a file after that.
    fn scan_blocking(
        socket: &Path,
        request: &ScanRequest,
        cancel: &CancellationToken,
    ) -> EngineResponse {
        let mut output = String::new();
        let mut found = false;
        let mut errors = false;

        for file_path in Self::request_files(request) {
            if cancel.is_cancelled() {
                errors = true;
                output.push_str("scan cancelled\n");
                break;
            }
            let display = file_path.display();
            let file = match File::open(&file_path) {
                Ok(f) => f,
                Err(e) => {
                    output.push_str(&format!("{display}: {e} ERROR\n"));
                    errors = true;
                    continue;
                }
            };

            let response = match Self::send_fd_for_scan(socket, file.as_fd(), cancel) {
                Ok(Some(r)) => r,
                Ok(None) => {
                    errors = true;
                    output.push_str(&format!("{display}: scan cancelled\n"));
                    break;
                }
                Err(e) => {
                    error!("clamd connection error: {e}");
                    output.push_str(&format!("{display}: clamd unavailable: {e} ERROR\n"));
                    errors = true;
                    continue;
                }
            };
            drop(file);

            match Self::parse_response(&response) {
                Detection::Clean => debug!("Clean: {display}"),
                Detection::Infected(signature) => {
                    found = true;
                    output.push_str(&format!("{display}: {signature} FOUND\n"));
                    if cancel.is_cancelled() {
                        output.push_str(&format!("{display}: not moved, scan cancelled\n"));
                        break;
                    }
                    match move_into(&file_path, &request.quarantine_root) {
                        Ok(dest) => {
                            output.push_str(&format!("{display}: moved to '{}'\n", dest.display()));
                        }
                        Err(e) => {
                            output.push_str(&format!("{display}: failed to move: {e}\n"));
                        }
                    }
                }
                Detection::Error(message) => {
                    errors = true;
                    output.push_str(&format!("{display}: {message}\n"));
                }
            }
        }

        // A detection outranks errors on other files, as with clamscan --move
        let exit_code = if found {
            1
        } else if errors {
            ENGINE_FAILURE_CODE
        } else {
            0
        };
        EngineResponse { exit_code, output }
    }
}

#[async_trait]
impl ScanEngine for ClamdEngine {
    async fn validate_availability(&self) -> Result<()> {
        let socket = self.socket.clone();
        let response = tokio::task::spawn_blocking(move || ClamdEngine::ping(&socket))
            .await
            .context("clamd ping task failed")?
            .with_context(|| format!("Failed to connect to clamd at {}", self.socket.display()))?;

        if response == "PONG" {
            info!("clamd available: {}", self.socket.display());
            Ok(())
        } else {
            Err(anyhow::anyhow!("Unexpected clamd ping response: {response}"))
        }
    }

    async fn scan(
        &self,
        request: &ScanRequest,
        cancel: &CancellationToken,
    ) -> Result<EngineResponse> {
        let socket = self.socket.clone();
        let request = request.clone();
        // Dropping this future also stops the blocking scan
        let token = cancel.child_token();
        let worker = token.clone();
        let _stop_on_drop = token.drop_guard();
        tokio::task::spawn_blocking(move || ClamdEngine::scan_blocking(&socket, &request, &worker))
            .await
            .context("clamd scan task failed")
    }
}

// =============================================================================
// Test engine
// =============================================================================
