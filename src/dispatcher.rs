// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Scan dispatch and scheduling.
//!
//! [`ScanDispatcher`] runs one engine call and turns the exit code into a
//! verdict and an audit record. [`ScanScheduler`] feeds it from the event
//! queue: one worker task per path with pending events, so scans of the
//! same path never overlap and run in arrival order, while different paths
//! run concurrently up to the worker limit.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::audit::{AuditLog, Level};
use crate::engine::{
    EngineResponse, ScanEngine, ScanOutcome, ScanRequest, ScanVerdict, parse_found_lines,
    reported_destination,
};
use crate::error::ScanFailure;
use crate::filter::EventFilter;
use crate::quarantine::{QuarantineManager, QuarantineSnapshot};
use crate::util::single_line;
use crate::watcher::FileEvent;

// =============================================================================
// ScanDispatcher
// =============================================================================

/// Invokes the engine for one request and records the outcome.
pub struct ScanDispatcher {
    engine: Arc<dyn ScanEngine>,
    quarantine: Arc<QuarantineManager>,
    audit: Arc<AuditLog>,
    timeout: Option<Duration>,
}

impl ScanDispatcher {
    #[must_use]
    pub fn new(
        engine: Arc<dyn ScanEngine>,
        quarantine: Arc<QuarantineManager>,
        audit: Arc<AuditLog>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            quarantine,
            audit,
            timeout,
        }
    }

    #[must_use]
    pub fn quarantine(&self) -> &QuarantineManager {
        &self.quarantine
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Run the engine once, bounded by the configured timeout.
    ///
    /// On timeout the engine is cancelled and awaited, so nothing it does
    /// outlives this call. A detection it completed before noticing the
    /// cancellation is still returned, since its move may have happened.
    pub async fn invoke(&self, request: &ScanRequest) -> Result<EngineResponse, ScanFailure> {
        let cancel = CancellationToken::new();
        let mut scan = self.engine.scan(request, &cancel);
        let result = match self.timeout {
            Some(limit) => tokio::select! {
                result = &mut scan => result,
                () = tokio::time::sleep(limit) => {
                    cancel.cancel();
                    return match scan.await {
                        Ok(late) if late.exit_code == 1 => {
                            debug!(
                                "Detection finished past the timeout: {}",
                                request.path.display()
                            );
                            Ok(late)
                        }
                        _ => Err(ScanFailure::Timeout(limit)),
                    };
                }
            },
            None => scan.await,
        };
        result.map_err(|e| ScanFailure::Invocation(format!("{e:#}")))
    }

    /// Scan a single file and record the result.
    ///
    /// Never fails: every problem becomes an `EngineError` verdict with an
    /// audit record.
    pub async fn dispatch(&self, request: &ScanRequest) -> ScanVerdict {
        let path = request.path.as_path();
        let mut before = self.quarantine.snapshot();
        let verdict = match self.invoke(request).await {
            Ok(response) => ScanVerdict::from(response),
            Err(failure) => {
                self.record_failure(path, &failure);
                return ScanVerdict::engine_failure(failure.to_string());
            }
        };

        match verdict.outcome {
            ScanOutcome::Clean => {
                self.audit.record(Level::Info, path, "No virus found");
            }
            ScanOutcome::Infected => self.handle_infected(path, &verdict, &mut before),
            ScanOutcome::EngineError => {
                // The file stays where it is; nothing is deleted
                let failure = ScanFailure::Engine {
                    code: verdict.exit_code,
                };
                self.audit.record(
                    failure.level(),
                    path,
                    format!(
                        "Scan failed (exit code {}): {}",
                        verdict.exit_code,
                        single_line(&verdict.raw_message)
                    ),
                );
            }
        }
        verdict
    }

    fn handle_infected(
        &self,
        path: &Path,
        verdict: &ScanVerdict,
        before: &mut QuarantineSnapshot,
    ) {
        let signature = signature_for(path, &verdict.raw_message);
        let reported = reported_destination(&verdict.raw_message, path);
        match self.quarantine.verify(path, reported.as_deref(), before) {
            Ok(dest) => self.audit.record(
                Level::Alert,
                path,
                format!("Virus found ({signature}), moved to {}", dest.display()),
            ),
            Err(failure) => self.audit.record(
                failure.level(),
                path,
                format!("Virus found ({signature}) but {failure}; threat unresolved"),
            ),
        }
    }

    fn record_failure(&self, path: &Path, failure: &ScanFailure) {
        self.audit
            .record(failure.level(), path, format!("Scan failed: {failure}"));
    }
}

/// Signature reported for `path`, or the first one in the output.
fn signature_for(path: &Path, output: &str) -> String {
    let found = parse_found_lines(output);
    found
        .iter()
        .find(|(p, _)| p == path)
        .or_else(|| found.first())
        .map_or_else(|| "unknown signature".to_string(), |(_, s)| s.clone())
}

// =============================================================================
// PathSerializer
// =============================================================================

/// Tracks which paths have a worker and the events queued behind it.
#[derive(Default)]
pub struct PathSerializer {
    pending: Mutex<HashMap<PathBuf, VecDeque<FileEvent>>>,
}

impl PathSerializer {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, VecDeque<FileEvent>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the event's path for a new worker.
    ///
    /// Returns the event back if the caller now owns the path, `None` if it
    /// was queued behind the worker that already does.
    pub fn claim(&self, event: FileEvent) -> Option<FileEvent> {
        let mut pending = self.lock();
        if let Some(queue) = pending.get_mut(&event.path) {
            queue.push_back(event);
            return None;
        }
        pending.insert(event.path.clone(), VecDeque::new());
        Some(event)
    }

    /// Next queued event for `path`, releasing the path when there is none.
    pub fn next(&self, path: &Path) -> Option<FileEvent> {
        let mut pending = self.lock();
        let next = pending.get_mut(path).and_then(VecDeque::pop_front);
        if next.is_none() {
            pending.remove(path);
        }
        next
    }

    /// Release `path`, returning how many queued events were discarded.
    pub fn release(&self, path: &Path) -> usize {
        self.lock().remove(path).map_or(0, |queue| queue.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// =============================================================================
// ScanScheduler
// =============================================================================

struct Shared {
    dispatcher: ScanDispatcher,
    filter: EventFilter,
    permits: Arc<Semaphore>,
    paths: PathSerializer,
    cancel: CancellationToken,
}

/// Per-path serialized scan scheduling over a bounded worker pool.
pub struct ScanScheduler {
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl ScanScheduler {
    #[must_use]
    pub fn new(
        dispatcher: ScanDispatcher,
        filter: EventFilter,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                filter,
                permits: Arc::new(Semaphore::new(workers.max(1))),
                paths: PathSerializer::default(),
                cancel,
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Queue an event.
    ///
    /// If a worker already owns the path the event waits behind it;
    /// otherwise this waits for a free worker slot and starts one.
    pub async fn submit(&self, event: FileEvent) {
        let path = event.path.clone();
        let Some(event) = self.shared.paths.claim(event) else {
            debug!("Queued behind running scan: {}", path.display());
            return;
        };

        let Ok(permit) = Arc::clone(&self.shared.permits).acquire_owned().await else {
            // Semaphore is never closed
            self.shared.paths.release(&event.path);
            return;
        };

        let shared = Arc::clone(&self.shared);
        self.tracker.spawn(async move {
            let _permit = permit;
            shared.drain(event).await;
        });
    }

    /// Stop accepting work and wait for running workers.
    ///
    /// Workers finish their current scan; once the cancellation token is
    /// triggered they drop whatever is still queued for their path.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Shared {
    /// Process `event` and then every event queued for the same path.
    async fn drain(&self, mut event: FileEvent) {
        loop {
            self.process(&event).await;

            if self.cancel.is_cancelled() {
                let dropped = self.paths.release(&event.path);
                if dropped > 0 {
                    warn!(
                        "Shutdown: dropping {dropped} queued events for {}",
                        event.path.display()
                    );
                }
                return;
            }

            match self.paths.next(&event.path) {
                Some(next) => event = next,
                None => return,
            }
        }
    }

    async fn process(&self, event: &FileEvent) {
        if !self.filter.admit(&event.path) {
            return;
        }
        debug!("Scanning {} ({:?})", event.path.display(), event.kind);
        let request = self.dispatcher.quarantine().request(&event.path);
        self.dispatcher.dispatch(&request).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{ERROR_MARKER, INFECTED_MARKER, ScriptedEngine};
    use crate::engine::{ClamdEngine, CommandEngine, CommandFlavor};
    use crate::filter::DEFAULT_EXCLUSIONS;
    use crate::quarantine::{ScanClass, move_into};
    use crate::watcher::FileEventKind;
    use anyhow::Result;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use nix::unistd::{Uid, User};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixListener;
    use std::sync::atomic::Ordering;
    use std::thread;

    struct Fixture {
        dir: tempfile::TempDir,
        home: PathBuf,
        log_path: PathBuf,
        quarantine: Arc<QuarantineManager>,
        audit: Arc<AuditLog>,
    }

    impl Fixture {
        fn new() -> Self {
            // tempfile's default `.tmp` prefix would match the dotfile exclusions
            let dir = tempfile::Builder::new().prefix("dispatch").tempdir().unwrap();
            let home = dir.path().join("home/alice");
            fs::create_dir_all(&home).unwrap();
            let me = User::from_uid(Uid::current()).unwrap().unwrap().name;
            let quarantine = QuarantineManager::prepare(
                &dir.path().join("quarantine"),
                ScanClass::Realtime,
                &me,
                &me,
            )
            .unwrap();
            let log_path = dir.path().join("log/realtime-scan.log");
            let audit = Arc::new(AuditLog::open(&log_path).unwrap());
            Self {
                dir,
                home,
                log_path,
                quarantine: Arc::new(quarantine),
                audit,
            }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.home.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
            path
        }

        fn dispatcher(&self, engine: Arc<dyn ScanEngine>, timeout: Option<Duration>) -> ScanDispatcher {
            ScanDispatcher::new(
                engine,
                Arc::clone(&self.quarantine),
                Arc::clone(&self.audit),
                timeout,
            )
        }

        fn scheduler(&self, engine: Arc<dyn ScanEngine>, workers: usize) -> ScanScheduler {
            let patterns: Vec<String> = DEFAULT_EXCLUSIONS.iter().map(ToString::to_string).collect();
            let filter = EventFilter::new(&patterns, Arc::clone(&self.audit)).unwrap();
            ScanScheduler::new(
                self.dispatcher(engine, None),
                filter,
                workers,
                CancellationToken::new(),
            )
        }

        fn log(&self) -> Vec<String> {
            fs::read_to_string(&self.log_path)
                .unwrap()
                .lines()
                .map(ToString::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn clean_file_logged_and_left_in_place() {
        let fx = Fixture::new();
        let doc = fx.file("doc.txt", "hello");
        let dispatcher = fx.dispatcher(Arc::new(ScriptedEngine::default()), None);

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&doc)).await;

        assert_eq!(verdict.outcome, ScanOutcome::Clean);
        assert_eq!(verdict.exit_code, 0);
        assert!(doc.exists());
        let log = fx.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].ends_with(&format!("[INFO] {}: No virus found", doc.display())));
    }

    #[tokio::test]
    async fn infected_file_quarantined_and_alerted() {
        let fx = Fixture::new();
        let payload = fx.file("payload.exe", INFECTED_MARKER);
        let dispatcher = fx.dispatcher(Arc::new(ScriptedEngine::default()), None);

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&payload)).await;

        assert_eq!(verdict.outcome, ScanOutcome::Infected);
        assert!(!payload.exists());
        let dest = fx.quarantine.root().join("payload.exe");
        assert!(dest.exists());
        assert!(fx.quarantine.root().ends_with("realtime"));

        let log = fx.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains(&format!("[ALERT] {}:", payload.display())));
        assert!(log[0].contains("Virus found (Eicar-Signature)"));
        assert!(log[0].contains(&dest.display().to_string()));
    }

    #[tokio::test]
    async fn failed_move_is_unresolved_alert() {
        let fx = Fixture::new();
        let payload = fx.file("payload.exe", INFECTED_MARKER);
        let engine = ScriptedEngine::without_move();
        let dispatcher = fx.dispatcher(Arc::new(engine), None);

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&payload)).await;

        assert_eq!(verdict.outcome, ScanOutcome::Infected);
        assert!(payload.exists());
        let log = fx.log();
        assert!(log[0].contains("[ALERT]"));
        assert!(log[0].contains("file still present at original path"));
        assert!(log[0].contains("threat unresolved"));
    }

    #[tokio::test]
    async fn engine_error_logged_and_file_kept() {
        let fx = Fixture::new();
        let broken = fx.file("broken.bin", ERROR_MARKER);
        let dispatcher = fx.dispatcher(Arc::new(ScriptedEngine::default()), None);

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&broken)).await;

        assert_eq!(verdict.outcome, ScanOutcome::EngineError);
        assert_eq!(verdict.exit_code, 2);
        assert!(broken.exists());
        let log = fx.log();
        assert!(log[0].contains(&format!("[ERROR] {}:", broken.display())));
        assert!(log[0].contains("exit code 2"));
    }

    #[tokio::test]
    async fn timeout_is_engine_error() {
        let fx = Fixture::new();
        let doc = fx.file("slow.txt", "hello");
        let engine = Arc::new(ScriptedEngine::with_delay(Duration::from_secs(10)));
        let dispatcher = fx.dispatcher(engine, Some(Duration::from_millis(50)));

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&doc)).await;

        assert_eq!(verdict.outcome, ScanOutcome::EngineError);
        assert_eq!(verdict.exit_code, 2);
        assert!(doc.exists());
        assert!(fx.log()[0].contains("timed out"));
    }

    /// clamd stand-in answering its first FILDES request with a detection
    /// after `delay`.
    fn slow_clamd(socket: &Path, delay: Duration) -> thread::JoinHandle<()> {
        let listener = UnixListener::bind(socket).unwrap();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf);
            thread::sleep(delay);
            let _ = stream.write_all(b"1: fd[10]: Eicar-Test-Signature FOUND\0");
        })
    }

    #[tokio::test]
    async fn timeout_stops_clamd_scan_before_quarantine() {
        let fx = Fixture::new();
        let payload = fx.file("payload.exe", INFECTED_MARKER);
        let socket = fx.dir.path().join("clamd.ctl");
        let clamd = slow_clamd(&socket, Duration::from_millis(400));
        let engine = Arc::new(ClamdEngine::new(socket));
        let dispatcher = fx.dispatcher(engine, Some(Duration::from_millis(50)));

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&payload)).await;
        assert_eq!(verdict.outcome, ScanOutcome::EngineError);
        assert!(payload.exists());

        // The detection arrives after the timeout and must not move anything
        clamd.join().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(payload.exists());
        assert_eq!(fs::read_dir(fx.quarantine.root()).unwrap().count(), 0);

        let log = fx.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains(&format!("[ERROR] {}:", payload.display())));
        assert!(log[0].contains("timed out after 50ms"));
    }

    /// Engine that ignores cancellation and quarantines after a fixed delay.
    struct UncancellableEngine;

    #[async_trait]
    impl ScanEngine for UncancellableEngine {
        async fn validate_availability(&self) -> Result<()> {
            Ok(())
        }

        async fn scan(
            &self,
            request: &ScanRequest,
            _cancel: &CancellationToken,
        ) -> Result<EngineResponse> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let dest = move_into(&request.path, &request.quarantine_root)?;
            Ok(EngineResponse {
                exit_code: 1,
                output: format!(
                    "{}: Eicar FOUND\n{}: moved to '{}'\n",
                    request.path.display(),
                    request.path.display(),
                    dest.display()
                ),
            })
        }
    }

    #[tokio::test]
    async fn detection_finished_past_timeout_is_still_alerted() {
        let fx = Fixture::new();
        let payload = fx.file("payload.exe", INFECTED_MARKER);
        let dispatcher = fx.dispatcher(
            Arc::new(UncancellableEngine),
            Some(Duration::from_millis(50)),
        );

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&payload)).await;

        // The move happened, so the log must say so
        assert_eq!(verdict.outcome, ScanOutcome::Infected);
        assert!(!payload.exists());
        let log = fx.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("[ALERT]"));
        assert!(log[0].contains("moved to"));
    }

    #[tokio::test]
    async fn stale_quarantine_entry_does_not_count_as_the_move() {
        let fx = Fixture::new();
        let payload = fx.file("payload.exe", INFECTED_MARKER);
        fs::write(fx.quarantine.root().join("payload.exe"), "quarantined last week").unwrap();
        let dispatcher = fx.dispatcher(Arc::new(ScriptedEngine::deleting()), None);

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&payload)).await;

        assert_eq!(verdict.outcome, ScanOutcome::Infected);
        assert!(!payload.exists());
        let log = fx.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("[ALERT]"));
        assert!(log[0].contains("file not found under quarantine root"));
        assert!(log[0].contains("threat unresolved"));
        assert!(!log[0].contains("moved to"));
    }

    #[tokio::test]
    async fn infected_file_beside_older_namesake_gets_suffix() {
        let fx = Fixture::new();
        let payload = fx.file("payload.exe", INFECTED_MARKER);
        fs::write(fx.quarantine.root().join("payload.exe"), "quarantined last week").unwrap();
        let dispatcher = fx.dispatcher(Arc::new(ScriptedEngine::default()), None);

        dispatcher.dispatch(&fx.quarantine.request(&payload)).await;

        let dest = fx.quarantine.root().join("payload.exe.1");
        assert!(dest.exists());
        assert!(fx.log()[0].contains(&format!("moved to {}", dest.display())));
    }

    #[tokio::test]
    async fn missing_engine_binary_is_engine_error() {
        let fx = Fixture::new();
        let doc = fx.file("doc.txt", "hello");
        let engine = CommandEngine::new(
            CommandFlavor::Clamscan,
            PathBuf::from("/nonexistent/clamscan"),
        );
        let dispatcher = fx.dispatcher(Arc::new(engine), None);

        let verdict = dispatcher.dispatch(&fx.quarantine.request(&doc)).await;

        assert_matches!(verdict.outcome, ScanOutcome::EngineError);
        assert!(fx.log()[0].contains("engine invocation failed"));
    }

    #[test]
    fn signature_prefers_matching_path() {
        let output = "/a: Sig.A FOUND\n/b: Sig.B FOUND\n";
        assert_eq!(signature_for(Path::new("/b"), output), "Sig.B");
        assert_eq!(signature_for(Path::new("/c"), output), "Sig.A");
        assert_eq!(signature_for(Path::new("/c"), ""), "unknown signature");
    }

    #[test]
    fn serializer_queues_behind_owner() {
        let paths = PathSerializer::default();
        let a = PathBuf::from("/home/alice/a");
        let event = |kind| FileEvent::new(a.clone(), kind);

        assert!(paths.claim(event(FileEventKind::Created)).is_some());
        assert!(paths.claim(event(FileEventKind::Written)).is_none());
        assert!(paths.claim(event(FileEventKind::MovedIn)).is_none());
        assert!(!paths.is_empty());

        assert_eq!(paths.next(&a).unwrap().kind, FileEventKind::Written);
        assert_eq!(paths.next(&a).unwrap().kind, FileEventKind::MovedIn);
        assert!(paths.next(&a).is_none());
        assert!(paths.is_empty());

        // Released path can be claimed again
        assert!(paths.claim(event(FileEventKind::Written)).is_some());
        assert!(paths.claim(event(FileEventKind::Written)).is_none());
        assert_eq!(paths.release(&a), 1);
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn excluded_path_never_reaches_engine() {
        let fx = Fixture::new();
        let head = fx.file(".git/HEAD", "ref: refs/heads/main");
        let engine = Arc::new(ScriptedEngine::default());
        let scheduler = fx.scheduler(engine.clone(), 2);

        scheduler
            .submit(FileEvent::new(head.clone(), FileEventKind::Written))
            .await;
        scheduler.shutdown().await;

        assert_eq!(engine.calls(), 0);
        let log = fx.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains(&format!("[INFO] {}: Skipping excluded path", head.display())));
    }

    #[tokio::test]
    async fn same_path_scans_never_overlap() {
        let fx = Fixture::new();
        let doc = fx.file("doc.txt", "hello");
        let engine = Arc::new(ScriptedEngine::with_delay(Duration::from_millis(30)));
        let scheduler = fx.scheduler(engine.clone(), 4);

        for kind in [
            FileEventKind::Created,
            FileEventKind::Written,
            FileEventKind::Written,
            FileEventKind::MovedIn,
        ] {
            scheduler.submit(FileEvent::new(doc.clone(), kind)).await;
        }
        scheduler.shutdown().await;

        assert_eq!(engine.calls(), 4);
        assert_eq!(engine.max_active_per_path.load(Ordering::SeqCst), 1);
        assert!(scheduler.shared.paths.is_empty());
    }

    #[tokio::test]
    async fn worker_limit_caps_concurrency() {
        let fx = Fixture::new();
        let engine = Arc::new(ScriptedEngine::with_delay(Duration::from_millis(50)));
        let scheduler = fx.scheduler(engine.clone(), 2);

        for i in 0..6 {
            let path = fx.file(&format!("file{i}.txt"), "hello");
            scheduler
                .submit(FileEvent::new(path, FileEventKind::Written))
                .await;
        }
        scheduler.shutdown().await;

        assert_eq!(engine.calls(), 6);
        assert!(engine.max_active.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn duplicate_event_for_quarantined_file_is_skipped() {
        let fx = Fixture::new();
        let payload = fx.file("payload.exe", INFECTED_MARKER);
        let engine = Arc::new(ScriptedEngine::default());
        let scheduler = fx.scheduler(engine.clone(), 2);

        scheduler
            .submit(FileEvent::new(payload.clone(), FileEventKind::Created))
            .await;
        scheduler
            .submit(FileEvent::new(payload.clone(), FileEventKind::Written))
            .await;
        scheduler.shutdown().await;

        assert_eq!(engine.calls(), 1);
        let log = fx.log();
        assert_eq!(log.len(), 2);
        assert!(log[0].contains("[ALERT]"));
        assert!(log[1].contains("[WARNING]"));
        assert!(log[1].contains("vanished"));
    }

    #[tokio::test]
    async fn cancellation_drops_queued_events() {
        let fx = Fixture::new();
        let doc = fx.file("doc.txt", "hello");
        let engine = Arc::new(ScriptedEngine::with_delay(Duration::from_millis(100)));
        let cancel = CancellationToken::new();
        let filter = EventFilter::new(&[], Arc::clone(&fx.audit)).unwrap();
        let scheduler = ScanScheduler::new(
            fx.dispatcher(engine.clone(), None),
            filter,
            2,
            cancel.clone(),
        );

        for _ in 0..3 {
            scheduler
                .submit(FileEvent::new(doc.clone(), FileEventKind::Written))
                .await;
        }
        cancel.cancel();
        scheduler.shutdown().await;

        // The in-flight scan completes, the rest is dropped
        assert_eq!(engine.calls(), 1);
        assert_eq!(fx.log().len(), 1);
    }
}
