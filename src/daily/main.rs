// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, warn};

use ghaf_clamav_watch::audit::AuditLog;
use ghaf_clamav_watch::config::Config;
use ghaf_clamav_watch::dispatcher::ScanDispatcher;
use ghaf_clamav_watch::engine::ENGINE_FAILURE_CODE;
use ghaf_clamav_watch::error::SetupError;
use ghaf_clamav_watch::fullscan::{FullScanJob, FullScanSummary};
use ghaf_clamav_watch::quarantine::{QuarantineManager, ScanClass};
use ghaf_clamav_watch::util::init_logger;

#[derive(Parser)]
#[command(name = "clamav-fullscan")]
#[command(about = "Scheduled full ClamAV scan; exits 0 clean, 1 infected, 2 error")]
struct Cli {
    #[arg(short, long)]
    config: PathBuf,
    /// Directory to scan (default: scanPath from the configuration)
    #[arg(short, long)]
    path: Option<PathBuf>,
    #[arg(short, long)]
    debug: bool,
}

async fn run(cli: &Cli) -> Result<FullScanSummary> {
    init_logger(cli.debug)?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let scan_root = cli
        .path
        .clone()
        .unwrap_or_else(|| config.scan_root().to_path_buf());
    if !scan_root.is_dir() {
        return Err(SetupError::MissingRoot(scan_root).into());
    }

    let audit = Arc::new(AuditLog::open(config.log_path(ScanClass::Daily))?);
    let quarantine = Arc::new(
        QuarantineManager::prepare(
            &config.quarantine_path,
            ScanClass::Daily,
            &config.service_account,
            &config.fallback_account,
        )
        .context("Failed to prepare quarantine")?,
    );
    quarantine.record_owner(&audit);

    let engine = config.engine.build();
    if let Err(e) = engine.validate_availability().await {
        warn!("Scan engine unavailable: {e:#}");
    }

    // A whole-tree scan is not bounded by the per-file timeout
    let job = FullScanJob::new(ScanDispatcher::new(engine, quarantine, audit, None));
    Ok(job.run(&scan_root).await)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(&cli).await {
        Ok(summary) => summary.exit_code,
        Err(e) => {
            error!("Full scan setup failed: {e:#}");
            eprintln!("clamav-fullscan: {e:#}");
            ENGINE_FAILURE_CODE
        }
    };

    std::process::exit(code);
}
