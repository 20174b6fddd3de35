// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Scheduled whole-tree scan.
//!
//! One engine invocation over the whole scan root, moving detections into
//! the `daily` quarantine root so it never collides with the real-time
//! watcher. The quarantine base is left out even when it lies inside the
//! scan root. The process exit code mirrors the engine classification.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::audit::Level;
use crate::dispatcher::ScanDispatcher;
use crate::engine::{
    ENGINE_FAILURE_CODE, ScanOutcome, ScanVerdict, parse_found_lines, reported_destination,
};

/// Result of one full scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullScanSummary {
    pub outcome: ScanOutcome,
    pub exit_code: i32,
    pub duration: Duration,
    /// Files the engine reported as infected.
    pub infected: Vec<PathBuf>,
}

/// Full-tree scan over the same engine, quarantine and audit pipeline as
/// the real-time path.
pub struct FullScanJob {
    dispatcher: ScanDispatcher,
}

impl FullScanJob {
    #[must_use]
    pub const fn new(dispatcher: ScanDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Scan `scan_root` and record start, engine output and result.
    pub async fn run(&self, scan_root: &Path) -> FullScanSummary {
        let audit = self.dispatcher.audit();
        let quarantine = self.dispatcher.quarantine();
        let started = Instant::now();

        audit.record(
            Level::Info,
            scan_root,
            format!(
                "Starting full scan (quarantine {})",
                quarantine.root().display()
            ),
        );

        let request = quarantine.request(scan_root);
        let mut before = quarantine.snapshot();
        let verdict = match self.dispatcher.invoke(&request).await {
            Ok(response) => ScanVerdict::from(response),
            Err(failure) => {
                audit.record(
                    failure.level(),
                    scan_root,
                    format!("Full scan failed: {failure}"),
                );
                return FullScanSummary {
                    outcome: ScanOutcome::EngineError,
                    exit_code: ENGINE_FAILURE_CODE,
                    duration: started.elapsed(),
                    infected: Vec::new(),
                };
            }
        };

        for line in verdict.raw_message.lines().map(str::trim) {
            if !line.is_empty() {
                audit.record(Level::Info, scan_root, line);
            }
        }

        let mut found = parse_found_lines(&verdict.raw_message);
        found.sort();
        found.dedup_by(|a, b| a.0 == b.0);

        if verdict.outcome == ScanOutcome::Infected {
            for (file, signature) in &found {
                let reported = reported_destination(&verdict.raw_message, file);
                match quarantine.verify(file, reported.as_deref(), &mut before) {
                    Ok(dest) => audit.record(
                        Level::Alert,
                        file,
                        format!("Virus found ({signature}), moved to {}", dest.display()),
                    ),
                    Err(failure) => audit.record(
                        failure.level(),
                        file,
                        format!("Virus found ({signature}) but {failure}; threat unresolved"),
                    ),
                }
            }
        }

        let duration = started.elapsed();
        match verdict.outcome {
            ScanOutcome::Clean => audit.record(
                Level::Info,
                scan_root,
                format!("Full scan finished: no virus found ({duration:.1?})"),
            ),
            ScanOutcome::Infected => audit.record(
                Level::Alert,
                scan_root,
                format!(
                    "Full scan finished: {} infected file(s) ({duration:.1?})",
                    found.len()
                ),
            ),
            ScanOutcome::EngineError => audit.record(
                Level::Error,
                scan_root,
                format!(
                    "Full scan failed (exit code {}) ({duration:.1?})",
                    verdict.exit_code
                ),
            ),
        }

        FullScanSummary {
            outcome: verdict.outcome,
            exit_code: verdict.exit_code,
            duration,
            infected: found.into_iter().map(|(path, _)| path).collect(),
        }
    }
}
