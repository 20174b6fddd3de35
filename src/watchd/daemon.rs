// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

use std::pin::pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ghaf_clamav_watch::audit::AuditLog;
use ghaf_clamav_watch::config::Config;
use ghaf_clamav_watch::dispatcher::{ScanDispatcher, ScanScheduler};
use ghaf_clamav_watch::filter::EventFilter;
use ghaf_clamav_watch::quarantine::{QuarantineManager, ScanClass};
use ghaf_clamav_watch::util::wait_for_shutdown;
use ghaf_clamav_watch::watcher::{FileEvent, Watcher, WatcherConfig};

// =============================================================================
// Daemon
// =============================================================================

pub struct Daemon {
    config: Config,
}

/// Main daemon entry point: sets up the pipeline and handles shutdown.
impl Daemon {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config;
        info!("clamav-watchd: starting");

        // Setup: every step here is fatal, nothing runs half-configured
        let audit = Arc::new(AuditLog::open(config.log_path(ScanClass::Realtime))?);
        let quarantine = Arc::new(
            QuarantineManager::prepare(
                &config.quarantine_path,
                ScanClass::Realtime,
                &config.service_account,
                &config.fallback_account,
            )
            .context("Failed to prepare quarantine")?,
        );
        quarantine.record_owner(&audit);

        let engine = config.engine.build();
        if let Err(e) = engine.validate_availability().await {
            warn!("Scan engine unavailable: {e:#}. Scans will be logged as engine errors.");
        }

        let filter = EventFilter::new(&config.exclusions, Arc::clone(&audit))?;
        let watcher = Watcher::subscribe(
            &config.watch_path,
            WatcherConfig {
                excludes: vec![config.quarantine_path.clone()],
            },
        )
        .context("Failed to establish watch")?;
        info!(
            "clamav-watchd: monitoring {} ({} directories)",
            config.watch_path.display(),
            watcher.watch_count()
        );

        let dispatcher = ScanDispatcher::new(engine, quarantine, audit, config.scan_timeout());
        let cancel = CancellationToken::new();
        let scheduler = ScanScheduler::new(dispatcher, filter, config.workers, cancel.clone());
        let (tx, rx) = mpsc::channel(config.queue_capacity);

        let mut ingest = tokio::spawn(ingest(watcher, tx, cancel.clone()));
        let schedule = tokio::spawn(schedule(rx, scheduler, cancel.clone()));

        info!("clamav-watchd: ready");

        let source_ended = tokio::select! {
            signal = wait_for_shutdown() => {
                match signal {
                    Ok(signal) => info!("clamav-watchd: {signal:?}, shutting down"),
                    Err(e) => error!("Signal handling failed: {e:#}"),
                }
                false
            }
            _ = &mut ingest => true,
        };

        debug!("Stopping event ingestion...");
        cancel.cancel();
        if !source_ended {
            if let Err(e) = ingest.await {
                warn!("Ingest task failed: {e}");
            }
        }

        debug!("Waiting for in-flight scans...");
        if let Err(e) = schedule.await {
            warn!("Scheduler task failed: {e}");
        }

        if source_ended {
            anyhow::bail!("Event source ended unexpectedly");
        }
        info!("clamav-watchd: stopped");
        Ok(())
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Move watcher events into the bounded queue.
///
/// A full queue blocks this task; the kernel queue buffers meanwhile and
/// an overflow there triggers a rescan in the watcher.
async fn ingest(watcher: Watcher, tx: mpsc::Sender<FileEvent>, cancel: CancellationToken) {
    let mut events = pin!(watcher.into_stream());

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.next() => {
                let Some(event) = event else {
                    error!("Inotify event stream ended");
                    break;
                };
                event
            }
        };

        if tx.capacity() == 0 {
            debug!("Event queue full, waiting for scanners");
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Ingest stopped");
}

/// Hand queued events to the scheduler until shutdown, then drain workers.
async fn schedule(
    mut rx: mpsc::Receiver<FileEvent>,
    scheduler: ScanScheduler,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        scheduler.submit(event).await;
    }

    let dropped = rx.len();
    if dropped > 0 {
        warn!("Shutdown: dropping {dropped} queued events");
    }
    scheduler.shutdown().await;
    debug!("All scans finished");
}
