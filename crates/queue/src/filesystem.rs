//! Filesystem queries used by admission and dispatch.
//!
//! The engine never touches the filesystem directly for existence, size or
//! free-space checks; it goes through [`Filesystem`] so tests can pin volume
//! sizes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Free and total space of the volume holding a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpace {
    /// Mount point or drive label identifying the volume.
    pub label: String,
    pub available: u64,
    pub total: u64,
}

/// Filesystem collaborator.
pub trait Filesystem: Send + Sync {
    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Size of the file at `path`, if it exists.
    fn file_size(&self, path: &Path) -> Option<u64>;

    /// Space on the volume that would hold `path`. `path` need not exist.
    fn volume_space(&self, path: &Path) -> Option<VolumeSpace>;
}

/// Real filesystem backed by `std::fs` and `sysinfo` disk enumeration.
#[derive(Debug, Default, Clone)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path).ok().map(|m| m.len())
    }

    fn volume_space(&self, path: &Path) -> Option<VolumeSpace> {
        let anchor = nearest_existing_ancestor(path)?;
        let anchor = std::fs::canonicalize(&anchor).unwrap_or(anchor);

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<(PathBuf, u64, u64)> = disks
            .list()
            .iter()
            .map(|d| {
                (
                    d.mount_point().to_path_buf(),
                    d.available_space(),
                    d.total_space(),
                )
            })
            .collect();

        let (mount, available, total) = best_mount(&anchor, &mounts)?;
        Some(VolumeSpace {
            label: mount.to_string_lossy().to_string(),
            available: *available,
            total: *total,
        })
    }
}

/// Walks up from `path` to the first directory that exists.
///
/// Lets the caller reason about an output directory that has not been
/// created yet without creating it.
pub fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    let start = if path.is_dir() {
        Some(path)
    } else {
        path.parent()
    };

    let mut current = start;
    while let Some(dir) = current {
        let candidate = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        if candidate.is_dir() {
            return Some(candidate.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Picks the mount whose mount point is the longest prefix of `path`.
fn best_mount<'a>(
    path: &Path,
    mounts: &'a [(PathBuf, u64, u64)],
) -> Option<&'a (PathBuf, u64, u64)> {
    mounts
        .iter()
        .filter(|(mount, _, _)| path.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
}
