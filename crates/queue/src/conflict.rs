//! Conflict Resolver
//!
//! Detects outputs that would overwrite an existing file and rewrites them
//! according to a [`ConflictStrategy`].

use crate::filesystem::Filesystem;
use crate::item::QueueItem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How to handle outputs that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Pick `<stem> (<n>)<ext>` with the lowest free `n`.
    AutoRename,
    /// Keep the paths; the encoder replaces the existing files.
    Overwrite,
    /// Leave everything as is and abort the start.
    Cancel,
}

/// An item whose output path is already taken on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub item_id: String,
    pub existing_path: PathBuf,
}

/// Reports every item whose output path exists right now.
pub fn detect(items: &[QueueItem], fs: &dyn Filesystem) -> Vec<ConflictReport> {
    items
        .iter()
        .filter(|item| fs.exists(&item.output_path))
        .map(|item| ConflictReport {
            item_id: item.id.clone(),
            existing_path: item.output_path.clone(),
        })
        .collect()
}

/// `<stem> (<n>)<ext>` next to `path`.
pub fn rename_candidate(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(file_name)
}

/// Lowest-numbered rename candidate that is neither on disk nor reserved.
pub fn next_free_path(path: &Path, fs: &dyn Filesystem, reserved: &HashSet<PathBuf>) -> PathBuf {
    let mut n = 1u32;
    loop {
        let candidate = rename_candidate(path, n);
        if !reserved.contains(&candidate) && !fs.exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Applies `strategy` to a batch and returns the (possibly) rewritten items.
///
/// `reserved` holds output paths claimed outside the batch, e.g. by the item
/// currently encoding. With `AutoRename`, an item is renamed when its output
/// exists on disk or was already claimed by an earlier item, so the returned
/// batch never has two items writing the same file.
pub fn resolve(
    items: &[QueueItem],
    strategy: ConflictStrategy,
    fs: &dyn Filesystem,
    reserved: &HashSet<PathBuf>,
) -> Vec<QueueItem> {
    match strategy {
        ConflictStrategy::Overwrite | ConflictStrategy::Cancel => items.to_vec(),
        ConflictStrategy::AutoRename => {
            let mut claimed = reserved.clone();
            let mut resolved = Vec::with_capacity(items.len());

            for item in items {
                let mut item = item.clone();
                if claimed.contains(&item.output_path) || fs.exists(&item.output_path) {
                    let renamed = next_free_path(&item.output_path, fs, &claimed);
                    tracing::info!(
                        item_id = %item.id,
                        from = %item.output_path.display(),
                        to = %renamed.display(),
                        "output exists, renaming"
                    );
                    item.output_path = renamed;
                }
                claimed.insert(item.output_path.clone());
                resolved.push(item);
            }

            resolved
        }
    }
}
