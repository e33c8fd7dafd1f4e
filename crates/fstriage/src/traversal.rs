//! Filesystem traversal with exclusion pruning
//!
//! # Design
//!
//! - Walk sequentially with `ignore::Walk`, which is a lazy iterator: stopping
//!   early never forces the rest of the tree to be listed
//! - Prune excluded directories in `filter_entry`, before descending into them
//! - Exclusions match on whole path segments (`/proc` never excludes `/proc2`)
//! - Unreadable or vanished subtrees are skipped; siblings continue

use crate::error::{Result, TriageError};
use crate::paths::absolutize;
use ignore::{Walk, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Operating-system directories never worth entering on POSIX hosts:
/// kernel/virtual filesystems and container runtime state.
pub const POSIX_DEFAULT_EXCLUDES: &[&str] = &[
    "/proc",
    "/sys",
    "/dev",
    "/run",
    "/var/lib/docker",
    "/var/run",
    "/snap",
];

/// System and program directories on Windows hosts.
pub const WINDOWS_DEFAULT_EXCLUDES: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\$Recycle.Bin",
];

/// Immutable set of absolute paths whose subtrees are pruned from traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    entries: Vec<PathBuf>,
}

impl ExclusionSet {
    /// A set that excludes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary paths; relative entries are made absolute.
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::empty().with_extra(entries)
    }

    /// The critical OS directories for the current platform.
    pub fn platform_defaults() -> Self {
        if cfg!(windows) {
            Self::new(WINDOWS_DEFAULT_EXCLUDES)
        } else {
            Self::new(POSIX_DEFAULT_EXCLUDES)
        }
    }

    /// Union of this set and `extra`.
    pub fn with_extra<I, P>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut entries = self.entries.clone();
        for path in extra {
            let path = path.as_ref();
            let absolute = absolutize(path).unwrap_or_else(|_| path.to_path_buf());
            if !entries.contains(&absolute) {
                entries.push(absolute);
            }
        }
        Self { entries }
    }

    /// True if `path` equals an entry or lies underneath one.
    ///
    /// `Path::starts_with` compares whole components, so `/proc2` is not
    /// under `/proc`.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| path.starts_with(entry))
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lazy sequence of absolute regular-file paths under a root.
///
/// Not restartable: call [`traverse`] again for a fresh walk.
pub struct Traversal {
    root: PathBuf,
    walk: Option<Walk>,
    errors: usize,
}

impl Traversal {
    /// The resolved absolute root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of entries skipped so far because they could not be read.
    pub fn errors(&self) -> usize {
        self.errors
    }
}

impl Iterator for Traversal {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        let walk = self.walk.as_mut()?;
        loop {
            match walk.next()? {
                Ok(entry) => {
                    // file_type() does not follow symlinks, so links are never yielded
                    if entry.file_type().map_or(false, |ft| ft.is_file()) {
                        return Some(entry.into_path());
                    }
                }
                Err(err) => {
                    self.errors += 1;
                    debug!(error = %err, "Skipping unreadable entry");
                }
            }
        }
    }
}

/// Walk `root`, pruning every directory covered by `excludes`.
///
/// The caller decides which exclusions apply; combine
/// [`ExclusionSet::platform_defaults`] with user entries for a host scan.
pub fn traverse(root: &Path, excludes: &ExclusionSet) -> Result<Traversal> {
    let root = absolutize(root).map_err(|e| TriageError::io(root, e))?;

    if excludes.is_excluded(&root) {
        warn!(root = %root.display(), "Traversal root is excluded; nothing to scan");
        return Ok(Traversal {
            root,
            walk: None,
            errors: 0,
        });
    }

    let prune = excludes.clone();
    let walk = WalkBuilder::new(&root)
        .hidden(false)
        .parents(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            // Only apply exclusions to directories
            if !entry.file_type().map_or(false, |ft| ft.is_dir()) {
                return true;
            }
            if prune.is_excluded(entry.path()) {
                debug!(path = %entry.path().display(), "Pruning excluded directory");
                return false;
            }
            true
        })
        .build();

    Ok(Traversal {
        root,
        walk: Some(walk),
        errors: 0,
    })
}

/// Mount points of the currently mounted storage volumes.
///
/// Only mount points that are accessible directories are returned, sorted
/// and without duplicates.
pub fn mounted_roots() -> Vec<PathBuf> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    accessible_dirs(disks.list().iter().map(|disk| disk.mount_point().to_path_buf()))
}

fn accessible_dirs(candidates: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|path| path.is_dir() && std::fs::read_dir(path).is_ok())
        .collect();
    roots.sort();
    roots.dedup();
    roots
}
