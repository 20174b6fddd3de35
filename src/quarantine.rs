// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Quarantine directories.
//!
//! Each scan class owns its own root under the quarantine base:
//!
//! ```text
//! <base>/
//! ├── realtime/   # files quarantined by the watcher
//! └── daily/      # files quarantined by the scheduled full scan
//! ```
//!
//! Infected files keep their basename. On collision a numeric suffix is
//! appended (`payload.exe`, `payload.exe.1`, ...); nothing is overwritten.
//! No index is kept: the file's path under the root is the record. A
//! quarantined file is read-only and owned by the owner of its root.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use nix::unistd::User;
use rustix::fs::{CWD, Gid, RenameFlags, Uid};
use rustix::io::Errno;
use tempfile::NamedTempFile;

use crate::audit::{AuditLog, Level};
use crate::engine::ScanRequest;
use crate::error::{ScanFailure, SetupError};

/// Mode for quarantine roots: owner-only rwx.
const ROOT_MODE: u32 = 0o700;

/// Mode for quarantined files: owner read-only.
const QUARANTINED_FILE_MODE: u32 = 0o400;

/// Upper bound on collision suffixes tried before giving up.
const MAX_COLLISION_SUFFIX: u32 = 10_000;

// =============================================================================
// Types
// =============================================================================

/// Origin of a scan, each with its own quarantine root and audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanClass {
    /// Event-driven scans from the watcher.
    Realtime,
    /// Scheduled full-tree scans.
    Daily,
}

impl ScanClass {
    /// Directory name under the quarantine base.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Daily => "daily",
        }
    }
}

impl fmt::Display for ScanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Account that owns quarantine contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineOwner {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    /// True if the service account was missing and the fallback was used.
    pub is_fallback: bool,
}

impl QuarantineOwner {
    /// Resolve the service account, falling back to the administrative one.
    pub fn resolve(service: &str, fallback: &str) -> Result<Self> {
        if let Some(user) = lookup_user(service)? {
            return Ok(Self::from_user(service, &user, false));
        }
        if let Some(user) = lookup_user(fallback)? {
            return Ok(Self::from_user(fallback, &user, true));
        }
        Err(SetupError::NoOwnerAccount {
            service: service.to_string(),
            fallback: fallback.to_string(),
        }
        .into())
    }

    fn from_user(name: &str, user: &User, is_fallback: bool) -> Self {
        Self {
            name: name.to_string(),
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            is_fallback,
        }
    }
}

fn lookup_user(name: &str) -> Result<Option<User>> {
    User::from_name(name).with_context(|| format!("Failed to look up account '{name}'"))
}

// =============================================================================
// QuarantineManager
// =============================================================================

/// Entry names under a quarantine root, taken before an engine call.
///
/// Verification only accepts entries missing from it, so an older file of
/// the same name is never mistaken for the one just moved.
#[derive(Debug, Default)]
pub struct QuarantineSnapshot {
    names: HashSet<OsString>,
}

/// Quarantine root of one scan class.
#[derive(Debug)]
pub struct QuarantineManager {
    class: ScanClass,
    base: PathBuf,
    root: PathBuf,
    service_account: String,
    owner: QuarantineOwner,
}

impl QuarantineManager {
    /// Create the class root with owner-only permissions and hand it to the
    /// quarantine owner. Any failure here is fatal for startup.
    pub fn prepare(
        base: &Path,
        class: ScanClass,
        service_account: &str,
        fallback_account: &str,
    ) -> Result<Self> {
        let owner = QuarantineOwner::resolve(service_account, fallback_account)?;
        debug!(
            "Quarantine owned by '{}'{}",
            owner.name,
            if owner.is_fallback { " (fallback)" } else { "" }
        );

        let root = base.join(class.dir_name());
        let setup_err = |reason: String| SetupError::Quarantine {
            path: root.clone(),
            reason,
        };

        fs::create_dir_all(&root).map_err(|e| setup_err(format!("create failed: {e}")))?;
        fs::set_permissions(&root, fs::Permissions::from_mode(ROOT_MODE))
            .map_err(|e| setup_err(format!("chmod failed: {e}")))?;

        let uid = Uid::from_raw(owner.uid);
        let gid = Gid::from_raw(owner.gid);
        rustix::fs::chown(&root, Some(uid), Some(gid))
            .map_err(|e| setup_err(format!("chown to '{}' failed: {e}", owner.name)))?;

        let meta = fs::symlink_metadata(&root).map_err(|e| setup_err(e.to_string()))?;
        if !meta.is_dir() {
            return Err(setup_err("is not a directory".to_string()).into());
        }
        let mode = meta.permissions().mode() & 0o777;
        if mode != ROOT_MODE {
            return Err(setup_err(format!("mode is {mode:o}, expected {ROOT_MODE:o}")).into());
        }

        info!(
            "Quarantine '{class}' ready at {} (owner {})",
            root.display(),
            owner.name
        );
        Ok(Self {
            class,
            base: base.to_path_buf(),
            root,
            service_account: service_account.to_string(),
            owner,
        })
    }

    /// Put a fallback owner on record in the class's audit log.
    pub fn record_owner(&self, audit: &AuditLog) {
        if self.owner.is_fallback {
            audit.record(
                Level::Warning,
                &self.root,
                format!(
                    "Service account '{}' not found, quarantine owned by fallback account '{}'",
                    self.service_account, self.owner.name
                ),
            );
        }
    }

    #[must_use]
    pub const fn class(&self) -> ScanClass {
        self.class
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn owner(&self) -> &QuarantineOwner {
        &self.owner
    }

    /// Build the scan request for `path` targeting this root.
    ///
    /// The whole quarantine base is excluded, so neither class ever scans
    /// files already quarantined.
    #[must_use]
    pub fn request(&self, path: &Path) -> ScanRequest {
        ScanRequest {
            path: path.to_path_buf(),
            quarantine_root: self.root.clone(),
            excluded: vec![self.base.clone()],
        }
    }

    /// Record the current root entries ahead of an engine call.
    #[must_use]
    pub fn snapshot(&self) -> QuarantineSnapshot {
        match fs::read_dir(&self.root) {
            Ok(entries) => QuarantineSnapshot {
                names: entries.flatten().map(|e| e.file_name()).collect(),
            },
            Err(e) => {
                warn!("Failed to list {}: {e}", self.root.display());
                QuarantineSnapshot::default()
            }
        }
    }

    /// Newest entry for `original`'s basename that is not in `before`.
    fn arrival(&self, original: &Path, before: &QuarantineSnapshot) -> Option<PathBuf> {
        let name = original.file_name()?;
        let entries = fs::read_dir(&self.root).ok()?;
        entries
            .flatten()
            .filter(|e| !before.names.contains(&e.file_name()))
            .filter_map(|e| collision_index(name, &e.file_name()).map(|idx| (idx, e.path())))
            .max_by_key(|(idx, _)| *idx)
            .map(|(_, path)| path)
    }

    /// Whether `dest` is a file in this root that `before` did not list.
    fn is_arrival(&self, dest: &Path, before: &QuarantineSnapshot) -> bool {
        dest.parent() == Some(self.root.as_path())
            && dest
                .file_name()
                .is_some_and(|name| !before.names.contains(name))
            && fs::symlink_metadata(dest).is_ok_and(|m| m.is_file())
    }

    /// Check that an infected file left its original path and landed here
    /// during the engine call `before` was taken for.
    ///
    /// A destination reported by the engine is taken when it checks out,
    /// otherwise the newest new entry with the file's name. The accepted
    /// entry is added to `before`, so several detections in one call never
    /// claim the same entry. It is handed to the quarantine owner and made
    /// read-only, whichever engine moved it.
    pub fn verify(
        &self,
        original: &Path,
        reported: Option<&Path>,
        before: &mut QuarantineSnapshot,
    ) -> Result<PathBuf, ScanFailure> {
        let failure = |reason: &str| ScanFailure::QuarantineVerification {
            root: self.root.clone(),
            reason: reason.to_string(),
        };

        if fs::symlink_metadata(original).is_ok() {
            return Err(failure("file still present at original path"));
        }
        let dest = reported
            .filter(|dest| self.is_arrival(dest, before))
            .map(Path::to_path_buf)
            .or_else(|| self.arrival(original, before))
            .ok_or_else(|| failure("file not found under quarantine root"))?;
        if let Some(name) = dest.file_name() {
            before.names.insert(name.to_os_string());
        }
        restrict_path(&dest, Some((self.owner.uid, self.owner.gid)));
        Ok(dest)
    }
}

/// Suffix index of `candidate` relative to `name`: 0 for an exact match,
/// `n` for `name.n`, `None` otherwise.
fn collision_index(name: &OsStr, candidate: &OsStr) -> Option<u32> {
    if candidate == name {
        return Some(0);
    }
    let name = name.to_str()?;
    let candidate = candidate.to_str()?;
    let suffix = candidate.strip_prefix(name)?.strip_prefix('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

fn candidate_path(root: &Path, name: &OsStr, index: u32) -> PathBuf {
    if index == 0 {
        return root.join(name);
    }
    let mut with_suffix = name.to_os_string();
    with_suffix.push(format!(".{index}"));
    root.join(with_suffix)
}

// =============================================================================
// Atomic move
// =============================================================================

/// Atomically move `src` into `root`, never overwriting an existing entry.
///
/// Uses `renameat2(RENAME_NOREPLACE)`; filesystems without it get a hard
/// link plus unlink. Across filesystems the content is copied into a temp
/// file inside `root` and published without clobbering, then the original
/// is removed. Returns the final path.
pub fn move_into(src: &Path, root: &Path) -> io::Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "path has no file name"))?;
    let owner = root_owner(root);

    for index in 0..MAX_COLLISION_SUFFIX {
        let dest = candidate_path(root, name, index);
        match rustix::fs::renameat_with(CWD, src, CWD, &dest, RenameFlags::NOREPLACE) {
            Ok(()) => return Ok(finish_move(dest, owner)),
            Err(Errno::EXIST) => {}
            Err(Errno::INVAL) => match fs::hard_link(src, &dest) {
                Ok(()) => {
                    fs::remove_file(src)?;
                    return Ok(finish_move(dest, owner));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            },
            Err(Errno::XDEV) => return copy_into(src, root, name, owner),
            Err(e) => return Err(e.into()),
        }
    }

    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free quarantine name for {}", src.display()),
    ))
}

/// Cross-filesystem move: copy into a temp file in `root`, publish, unlink.
///
/// The copy gets its owner and mode before it becomes visible.
fn copy_into(
    src: &Path,
    root: &Path,
    name: &OsStr,
    owner: Option<(u32, u32)>,
) -> io::Result<PathBuf> {
    let mut tmp = NamedTempFile::new_in(root)?;
    io::copy(&mut File::open(src)?, tmp.as_file_mut())?;
    if let Some((uid, gid)) = owner {
        let ids = (Uid::from_raw(uid), Gid::from_raw(gid));
        if let Err(e) = rustix::fs::fchown(tmp.as_file(), Some(ids.0), Some(ids.1)) {
            warn!("Failed to chown copy of {}: {e}", src.display());
        }
    }
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(QUARANTINED_FILE_MODE))?;
    tmp.as_file().sync_all()?;

    for index in 0..MAX_COLLISION_SUFFIX {
        let dest = candidate_path(root, name, index);
        match tmp.persist_noclobber(&dest) {
            Ok(_) => {
                fs::remove_file(src)?;
                debug!("Quarantined into {}", dest.display());
                return Ok(dest);
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => return Err(e.error),
        }
    }

    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free quarantine name for {}", src.display()),
    ))
}

/// Owner of a quarantine root, which quarantined files inherit.
fn root_owner(root: &Path) -> Option<(u32, u32)> {
    match fs::metadata(root) {
        Ok(meta) => Some((meta.uid(), meta.gid())),
        Err(e) => {
            warn!("Failed to stat {}: {e}", root.display());
            None
        }
    }
}

/// Hand a quarantined file to `owner` and make it read-only.
fn restrict_path(dest: &Path, owner: Option<(u32, u32)>) {
    if let Some((uid, gid)) = owner {
        let ids = (Uid::from_raw(uid), Gid::from_raw(gid));
        if let Err(e) = rustix::fs::chown(dest, Some(ids.0), Some(ids.1)) {
            warn!("Failed to chown {} to {uid}:{gid}: {e}", dest.display());
        }
    }
    if let Err(e) = fs::set_permissions(dest, fs::Permissions::from_mode(QUARANTINED_FILE_MODE)) {
        warn!("Failed to restrict {}: {e}", dest.display());
    }
}

fn finish_move(dest: PathBuf, owner: Option<(u32, u32)>) -> PathBuf {
    restrict_path(&dest, owner);
    debug!("Quarantined into {}", dest.display());
    dest
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use nix::unistd::Uid;
    use pretty_assertions::assert_eq;

    fn current_user() -> String {
        User::from_uid(Uid::current()).unwrap().unwrap().name
    }

    fn prepare(base: &Path, class: ScanClass) -> QuarantineManager {
        let me = current_user();
        QuarantineManager::prepare(base, class, &me, &me).unwrap()
    }

    #[test]
    fn collision_index_matching() {
        let name = OsStr::new("payload.exe");
        assert_eq!(collision_index(name, OsStr::new("payload.exe")), Some(0));
        assert_eq!(collision_index(name, OsStr::new("payload.exe.3")), Some(3));
        assert_eq!(collision_index(name, OsStr::new("payload.exe.")), None);
        assert_eq!(collision_index(name, OsStr::new("payload.exe.bak")), None);
        assert_eq!(collision_index(name, OsStr::new("payload.exe2")), None);
        assert_eq!(collision_index(name, OsStr::new("other.exe")), None);
    }

    #[test]
    fn prepare_creates_restricted_root() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);

        assert_eq!(q.root(), dir.path().join("realtime"));
        assert_eq!(q.class(), ScanClass::Realtime);
        let mode = fs::metadata(q.root()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
        assert!(!q.owner().is_fallback);
    }

    #[test]
    fn prepare_tightens_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("daily");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

        let q = prepare(dir.path(), ScanClass::Daily);
        let mode = fs::metadata(q.root()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn prepare_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("realtime"), "not a dir").unwrap();
        let me = current_user();
        assert!(QuarantineManager::prepare(dir.path(), ScanClass::Realtime, &me, &me).is_err());
    }

    #[test]
    fn owner_falls_back_when_service_account_missing() {
        let me = current_user();
        let owner = QuarantineOwner::resolve("no-such-account-clamwatch", &me).unwrap();
        assert!(owner.is_fallback);
        assert_eq!(owner.name, me);
    }

    #[test]
    fn owner_missing_everywhere_is_setup_error() {
        let err = QuarantineOwner::resolve("no-such-account-a", "no-such-account-b").unwrap_err();
        assert_matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::NoOwnerAccount { .. })
        );
    }

    #[test]
    fn move_into_keeps_basename() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        let src = dir.path().join("payload.exe");
        fs::write(&src, "x").unwrap();

        let dest = move_into(&src, q.root()).unwrap();
        assert_eq!(dest, q.root().join("payload.exe"));
        assert!(!src.exists());
        assert!(dest.exists());
    }

    #[test]
    fn move_into_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);

        for (i, sub) in ["a", "b", "c"].iter().enumerate() {
            let src_dir = dir.path().join(sub);
            fs::create_dir(&src_dir).unwrap();
            let src = src_dir.join("payload.exe");
            fs::write(&src, format!("copy {i}")).unwrap();
            move_into(&src, q.root()).unwrap();
        }

        assert_eq!(fs::read_to_string(q.root().join("payload.exe")).unwrap(), "copy 0");
        assert_eq!(fs::read_to_string(q.root().join("payload.exe.1")).unwrap(), "copy 1");
        assert_eq!(fs::read_to_string(q.root().join("payload.exe.2")).unwrap(), "copy 2");
    }

    #[test]
    fn quarantined_file_takes_root_owner_and_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        let src = dir.path().join("payload.exe");
        fs::write(&src, "x").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o666)).unwrap();

        let dest = move_into(&src, q.root()).unwrap();
        let meta = fs::metadata(&dest).unwrap();
        assert_eq!(meta.uid(), q.owner().uid);
        assert_eq!(meta.gid(), q.owner().gid);
        assert_eq!(meta.permissions().mode() & 0o777, 0o400);
    }

    #[test]
    fn move_into_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        assert!(move_into(&dir.path().join("gone"), q.root()).is_err());
    }

    #[test]
    fn verify_after_move() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        let src = dir.path().join("payload.exe");
        fs::write(&src, "x").unwrap();
        let mut before = q.snapshot();
        move_into(&src, q.root()).unwrap();

        assert_eq!(q.verify(&src, None, &mut before).unwrap(), q.root().join("payload.exe"));
    }

    #[test]
    fn verify_picks_the_new_entry_next_to_older_ones() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        fs::write(q.root().join("payload.exe"), "older").unwrap();
        let src = dir.path().join("payload.exe");
        fs::write(&src, "x").unwrap();

        let mut before = q.snapshot();
        move_into(&src, q.root()).unwrap();
        assert_eq!(
            q.verify(&src, None, &mut before).unwrap(),
            q.root().join("payload.exe.1")
        );
        // Already claimed, a second detection of the same name finds nothing
        assert_matches!(
            q.verify(&src, None, &mut before),
            Err(ScanFailure::QuarantineVerification { reason, .. }) if reason.contains("not found")
        );
    }

    #[test]
    fn verify_takes_reported_destination() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Daily);
        let src = dir.path().join("payload.exe");
        let mut before = q.snapshot();
        fs::write(q.root().join("payload.exe"), "first").unwrap();
        fs::write(q.root().join("payload.exe.1"), "second").unwrap();

        let reported = q.root().join("payload.exe");
        assert_eq!(q.verify(&src, Some(&reported), &mut before).unwrap(), reported);
        // A stale or foreign report falls back to the newest new entry
        let stale = q.root().join("payload.exe");
        assert_eq!(
            q.verify(&src, Some(&stale), &mut before).unwrap(),
            q.root().join("payload.exe.1")
        );
    }

    #[test]
    fn verify_ignores_stale_entry_with_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        fs::write(q.root().join("payload.exe"), "older").unwrap();
        let src = dir.path().join("payload.exe");
        fs::write(&src, "x").unwrap();

        let mut before = q.snapshot();
        // Gone, but not into the quarantine root
        fs::remove_file(&src).unwrap();
        assert_matches!(
            q.verify(&src, None, &mut before),
            Err(ScanFailure::QuarantineVerification { reason, .. }) if reason.contains("not found")
        );
    }

    #[test]
    fn verify_secures_files_moved_by_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        let src = dir.path().join("payload.exe");
        let mut before = q.snapshot();
        // As left by an external engine's own move
        fs::write(q.root().join("payload.exe"), "x").unwrap();
        fs::set_permissions(q.root().join("payload.exe"), fs::Permissions::from_mode(0o644))
            .unwrap();

        let dest = q.verify(&src, None, &mut before).unwrap();
        let meta = fs::metadata(&dest).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o400);
        assert_eq!(meta.uid(), q.owner().uid);
    }

    #[test]
    fn verify_fails_if_original_still_present() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);
        let src = dir.path().join("payload.exe");
        fs::write(&src, "x").unwrap();

        assert_matches!(
            q.verify(&src, None, &mut q.snapshot()),
            Err(ScanFailure::QuarantineVerification { reason, .. }) if reason.contains("original")
        );
    }

    #[test]
    fn verify_fails_if_file_disappeared() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Realtime);

        assert_matches!(
            q.verify(&dir.path().join("payload.exe"), None, &mut q.snapshot()),
            Err(ScanFailure::QuarantineVerification { reason, .. }) if reason.contains("not found")
        );
    }

    #[test]
    fn request_targets_class_root() {
        let dir = tempfile::tempdir().unwrap();
        let q = prepare(dir.path(), ScanClass::Daily);
        let request = q.request(Path::new("/home"));
        assert_eq!(request.path, PathBuf::from("/home"));
        assert_eq!(request.quarantine_root, dir.path().join("daily"));
        assert_eq!(request.excluded, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn fallback_owner_goes_on_record() {
        let dir = tempfile::tempdir().unwrap();
        let me = current_user();
        let q = QuarantineManager::prepare(
            dir.path(),
            ScanClass::Realtime,
            "no-such-account-clamwatch",
            &me,
        )
        .unwrap();
        let log_path = dir.path().join("realtime-scan.log");
        let audit = AuditLog::open(&log_path).unwrap();

        q.record_owner(&audit);
        let log = fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("[WARNING]"));
        assert!(log.contains("'no-such-account-clamwatch' not found"));
        assert!(log.contains(&format!("fallback account '{me}'")));

        // A resolved service account leaves nothing to record
        let q = prepare(dir.path(), ScanClass::Daily);
        q.record_owner(&audit);
        assert_eq!(fs::read_to_string(&log_path).unwrap().lines().count(), 1);
    }
}
