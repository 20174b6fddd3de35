// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use inotify::{EventMask, EventStream, Inotify, WatchDescriptor, WatchMask};
use log::{debug, error, warn};
use rustix::io::Errno;

use crate::error::SetupError;

// =============================================================================
// Constants
// =============================================================================

/// Inotify read buffer size.
const INOTIFY_BUFFER_SIZE: usize = 4096;

/// Overflow backoff: base delay before rescan.
const OVERFLOW_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Overflow backoff: maximum delay (cap for exponential growth).
const OVERFLOW_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Overflow backoff: reset count after this period without overflow.
const OVERFLOW_RESET_AFTER: Duration = Duration::from_secs(300);

// =============================================================================
// Types
// =============================================================================

/// File event emitted by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Full path to the file.
    pub path: PathBuf,
    /// Event type.
    pub kind: FileEventKind,
    /// When the watcher observed the event.
    pub observed_at: DateTime<Utc>,
}

impl FileEvent {
    #[must_use]
    pub fn new(path: PathBuf, kind: FileEventKind) -> Self {
        Self {
            path,
            kind,
            observed_at: Utc::now(),
        }
    }
}

/// Type of file event. Everything else reported by inotify is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// File was created.
    Created,
    /// File was closed after writing.
    Written,
    /// File was moved in (from outside the tree or renamed within it).
    MovedIn,
}

/// Configuration for the watcher.
#[derive(Debug, Clone, Default)]
pub struct WatcherConfig {
    /// Directories to exclude from recursive watching (e.g. quarantine).
    pub excludes: Vec<PathBuf>,
}

// =============================================================================
// Watcher
// =============================================================================

/// Recursive inotify watcher over one root directory.
pub struct Watcher {
    config: WatcherConfig,
    /// Async inotify event stream for reading kernel events.
    stream: EventStream<Vec<u8>>,
    /// Maps watch descriptors to the watched directory.
    watches: HashMap<WatchDescriptor, PathBuf>,
    /// Root directory, for rescan on overflow.
    root: PathBuf,
    /// Events ready for dispatch via `next()`.
    ready: VecDeque<FileEvent>,
    /// Overflow backoff: consecutive overflow count.
    overflow_count: u32,
    /// Overflow backoff: time of last overflow (for reset).
    last_overflow: Option<Instant>,
}

const fn watch_mask() -> WatchMask {
    WatchMask::CREATE
        .union(WatchMask::CLOSE_WRITE)
        .union(WatchMask::MOVED_TO)
}

impl Watcher {
    /// Start watching `root` and every directory below it.
    ///
    /// # Errors
    /// Fails if the root is missing, inotify cannot be initialized, or any
    /// directory in the tree cannot be watched (including the watch limit).
    /// Running with a partial watch set is not an option.
    pub fn subscribe(root: &Path, config: WatcherConfig) -> Result<Self> {
        if !root.is_dir() {
            return Err(SetupError::MissingRoot(root.to_path_buf()).into());
        }

        let inotify = Inotify::init().context("Failed to initialize inotify")?;
        let buffer = vec![0u8; INOTIFY_BUFFER_SIZE];
        let stream = inotify.into_event_stream(buffer)?;

        let mut watcher = Self {
            config,
            stream,
            watches: HashMap::new(),
            root: root.to_path_buf(),
            ready: VecDeque::new(),
            overflow_count: 0,
            last_overflow: None,
        };
        watcher.add_recursive(root)?;
        debug!(
            "Watching {} ({} directories)",
            root.display(),
            watcher.watches.len()
        );
        Ok(watcher)
    }

    /// Number of watched directories.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Consume the watcher as an endless event stream.
    pub fn into_stream(self) -> impl Stream<Item = FileEvent> + Send {
        futures::stream::unfold(self, |mut watcher| async move {
            watcher.next().await.map(|event| (event, watcher))
        })
    }

    /// Get the next file event.
    ///
    /// Returns `None` if the inotify stream ends.
    pub async fn next(&mut self) -> Option<FileEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }

            match self.stream.next().await? {
                Ok(event) if event.mask.contains(EventMask::Q_OVERFLOW) => {
                    self.handle_overflow().await;
                }
                Ok(event) => self.handle_inotify_event(&event.wd, event.mask, event.name),
                Err(e) => warn!("Inotify read error: {e}"),
            }
        }
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    fn is_excluded(&self, path: &Path) -> bool {
        self.config
            .excludes
            .iter()
            .any(|excl| path.starts_with(excl))
    }

    fn add_watch(&mut self, dir: &Path) -> std::io::Result<()> {
        let wd = self.stream.watches().add(dir, watch_mask())?;
        self.watches.insert(wd, dir.to_path_buf());
        Ok(())
    }

    /// Watch the whole tree at startup. Any failure is fatal.
    fn add_recursive(&mut self, root: &Path) -> Result<()> {
        let mut stack = vec![root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            if self.is_excluded(&dir) {
                debug!("Excluding directory: {}", dir.display());
                continue;
            }

            if let Err(e) = self.add_watch(&dir) {
                if Errno::from_io_error(&e) == Some(Errno::NOSPC) {
                    return Err(SetupError::WatchLimit(dir).into());
                }
                return Err(SetupError::Watch {
                    path: dir,
                    source: e,
                }
                .into());
            }

            if let Ok(entries) = fs::read_dir(&dir) {
                stack.extend(
                    entries
                        .flatten()
                        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
                        .map(|e| e.path()),
                );
            }
        }

        Ok(())
    }

    /// Watch a directory that appeared after startup and emit events for
    /// files already inside it (written before the watch existed).
    fn add_new_tree(&mut self, dir: &Path, kind: FileEventKind) {
        let mut stack = vec![dir.to_path_buf()];

        while let Some(dir) = stack.pop() {
            if self.is_excluded(&dir) {
                debug!("Excluding new directory: {}", dir.display());
                continue;
            }

            if let Err(e) = self.add_watch(&dir) {
                error!("Failed to add watch for new directory {}: {e}", dir.display());
                continue;
            }
            debug!("Added watch for new directory: {}", dir.display());

            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(ft) = entry.file_type() else {
                    continue;
                };
                if ft.is_dir() {
                    stack.push(entry.path());
                } else if ft.is_file() {
                    self.ready.push_back(FileEvent::new(entry.path(), kind));
                }
            }
        }
    }

    /// Re-emit every regular file under the root as written.
    fn rescan(&mut self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            if self.is_excluded(&dir) {
                continue;
            }
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(ft) = entry.file_type() else {
                    continue;
                };
                // Only recurse into real directories, not symlinks
                if ft.is_dir() {
                    stack.push(entry.path());
                } else if ft.is_file() {
                    self.ready
                        .push_back(FileEvent::new(entry.path(), FileEventKind::Written));
                    count += 1;
                }
            }
        }
        count
    }

    /// Handle inotify queue overflow with exponential backoff.
    async fn handle_overflow(&mut self) {
        // Reset overflow count if enough time has passed
        if let Some(last) = self.last_overflow {
            if last.elapsed() >= OVERFLOW_RESET_AFTER {
                self.overflow_count = 0;
            }
        }

        // Calculate exponential backoff: base * 2^count, capped at max
        let backoff =
            OVERFLOW_BACKOFF_BASE.saturating_mul(2_u32.saturating_pow(self.overflow_count));
        let backoff = backoff.min(OVERFLOW_BACKOFF_MAX);

        warn!(
            "Inotify queue overflow #{} - waiting {:?} before rescan",
            self.overflow_count + 1,
            backoff
        );
        tokio::time::sleep(backoff).await;
        self.overflow_count += 1;
        self.last_overflow = Some(Instant::now());

        self.ready.clear();
        let count = self.rescan();
        warn!("Overflow rescan queued {count} files");
    }

    /// Translate a single inotify event.
    fn handle_inotify_event(
        &mut self,
        wd: &WatchDescriptor,
        mask: EventMask,
        name: Option<std::ffi::OsString>,
    ) {
        if mask.contains(EventMask::IGNORED) {
            if let Some(dir) = self.watches.remove(wd) {
                debug!("Watch removed: {}", dir.display());
            }
            return;
        }

        let Some(dir_path) = self.watches.get(wd) else {
            return;
        };
        let Some(name) = name else { return };
        let path = dir_path.join(name);

        if mask.contains(EventMask::ISDIR) {
            if mask.contains(EventMask::CREATE) {
                self.add_new_tree(&path, FileEventKind::Created);
            } else if mask.contains(EventMask::MOVED_TO) {
                self.add_new_tree(&path, FileEventKind::MovedIn);
            }
            return;
        }

        let kind = if mask.contains(EventMask::CLOSE_WRITE) {
            FileEventKind::Written
        } else if mask.contains(EventMask::MOVED_TO) {
            FileEventKind::MovedIn
        } else if mask.contains(EventMask::CREATE) {
            FileEventKind::Created
        } else {
            return;
        };

        if self.is_excluded(&path) {
            return;
        }
        self.ready.push_back(FileEvent::new(path, kind));
    }
}
