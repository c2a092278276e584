//! Age-based reclamation of uploads.
//!
//! A sweep runs in two stages. The file stage walks the whole storage root
//! and removes every non-directory entry older than the retention age,
//! recording each directory it passes. The directory stage sorts those
//! directories deepest-first and removes the ones that are empty at that
//! moment, so a chain like `a/b/c` left behind by an expired file collapses
//! in a single sweep. The root itself is never removed.
//!
//! No lock is shared with the allocator. An upload that lands in a token
//! directory between its emptiness check and its removal can lose that
//! directory; `remove_dir` refuses non-empty directories, so only the window
//! before the upload's file is created is exposed.

use crate::error::Result;
use crate::root::StorageRoot;
use ignore::WalkBuilder;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// How long uploads are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Files strictly older than this are removed.
    Age(Duration),
    /// Every file is removed on the next sweep.
    Debug,
}

impl Retention {
    /// Retention for the given age; zero means [`Retention::Debug`].
    pub fn from_age(age: Duration) -> Self {
        if age.is_zero() {
            Retention::Debug
        } else {
            Retention::Age(age)
        }
    }

    /// Retention of `days` whole days.
    pub fn days(days: u64) -> Self {
        Self::from_age(Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)))
    }

    /// Check whether a file of the given age should be removed.
    pub fn is_expired(&self, age: Duration) -> bool {
        match self {
            Retention::Age(max_age) => age > *max_age,
            Retention::Debug => true,
        }
    }
}

/// Statistics from a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Number of files removed.
    pub files_removed: usize,
    /// Bytes freed by removed files.
    pub bytes_freed: u64,
    /// Number of empty directories removed.
    pub dirs_removed: usize,
    /// Entries that could not be inspected or removed.
    pub failures: usize,
}

/// Deletes expired uploads and the directories they leave behind.
#[derive(Debug, Clone)]
pub struct Reclaimer {
    root: StorageRoot,
    retention: Retention,
}

impl Reclaimer {
    /// Create a reclaimer for `root`.
    pub fn new(root: StorageRoot, retention: Retention) -> Self {
        Self { root, retention }
    }

    /// Get the storage root.
    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Get the retention setting.
    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Run one sweep against the current time.
    pub fn sweep(&self) -> Result<SweepStats> {
        self.sweep_at(SystemTime::now())
    }

    /// Run one sweep, measuring file ages against `now`.
    ///
    /// Fails only when the tree cannot be traversed; individual deletion
    /// failures are logged and counted in [`SweepStats::failures`].
    pub fn sweep_at(&self, now: SystemTime) -> Result<SweepStats> {
        debug!(root = %self.root.path().display(), "sweep started");
        let mut stats = SweepStats::default();

        let dirs = self.remove_expired_files(now, &mut stats)?;
        self.remove_empty_dirs(dirs, &mut stats);

        debug!(
            files_removed = stats.files_removed,
            dirs_removed = stats.dirs_removed,
            failures = stats.failures,
            "sweep finished"
        );
        Ok(stats)
    }

    /// File stage: remove expired files and collect directories with their depth.
    fn remove_expired_files(
        &self,
        now: SystemTime,
        stats: &mut SweepStats,
    ) -> Result<Vec<(usize, PathBuf)>> {
        let mut dirs = Vec::new();

        let walker = WalkBuilder::new(self.root.path())
            .standard_filters(false) // Uploads may be hidden or look ignorable
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = entry?;

            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                if entry.depth() > 0 {
                    dirs.push((entry.depth(), entry.into_path()));
                }
                continue;
            }

            self.reclaim_file(entry.path(), now, stats);
        }

        Ok(dirs)
    }

    /// Remove a single file if it has outlived the retention age.
    fn reclaim_file(&self, path: &Path, now: SystemTime, stats: &mut SweepStats) {
        // Fresh metadata: the file may have been rewritten since it was listed
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read file metadata");
                stats.failures += 1;
                return;
            }
        };

        let age = match metadata.modified() {
            // Modification times in the future count as age zero
            Ok(mtime) => now.duration_since(mtime).unwrap_or_default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "file has no modification time");
                stats.failures += 1;
                return;
            }
        };

        if !self.retention.is_expired(age) {
            return;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), age_secs = age.as_secs(), "file removed");
                stats.files_removed += 1;
                stats.bytes_freed += metadata.len();
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove file");
                stats.failures += 1;
            }
        }
    }

    /// Directory stage: remove empty directories, deepest first.
    fn remove_empty_dirs(&self, mut dirs: Vec<(usize, PathBuf)>, stats: &mut SweepStats) {
        // Stable sort keeps walk order among directories at the same depth
        dirs.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, dir) in dirs {
            if dir == self.root.path() {
                continue;
            }

            match is_dir_empty(&dir) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "failed to list directory");
                    stats.failures += 1;
                    continue;
                }
            }

            match fs::remove_dir(&dir) {
                Ok(()) => {
                    info!(path = %dir.display(), "empty directory removed");
                    stats.dirs_removed += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) if err.kind() == io::ErrorKind::DirectoryNotEmpty => {
                    debug!(path = %dir.display(), "directory gained an entry, kept");
                }
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "failed to remove directory");
                    stats.failures += 1;
                }
            }
        }
    }
}

/// Check whether a directory has no entries.
fn is_dir_empty(dir: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(dir)?;
    Ok(entries.next().is_none())
}
