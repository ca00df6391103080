//! Space-bounded eviction.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use walkdir::WalkDir;

use disscache_core::Error;

use super::BlobCache;

/// Which files go first when the cache is over its size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Ascending modification time.
    OldestFirst,
    /// Descending size.
    LargestFirst,
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oldest_first" | "by_mod_time" => Ok(EvictionPolicy::OldestFirst),
            "largest_first" | "by_size" => Ok(EvictionPolicy::LargestFirst),
            other => Err(Error::Unsupported(format!("eviction policy {other:?}"))),
        }
    }
}

/// Outcome of a cleaning run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    pub removed_files: usize,
    pub removed_bytes: u64,
    pub retained_bytes: u64,
    pub removed_dirs: usize,
}

struct FileInfo {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl BlobCache {
    /// Shrink the cache to at most `max_size_bytes`, then drop empty
    /// directories.
    ///
    /// Must not run concurrently with writers: the file listing is taken
    /// once up front.
    pub fn clean(&self, max_size_bytes: u64, policy: EvictionPolicy) -> Result<CleanStats, Error> {
        clean_dir(self.dir(), max_size_bytes, policy)
    }
}

fn clean_dir(dir: &Path, max_size_bytes: u64, policy: EvictionPolicy) -> Result<CleanStats, Error> {
    let mut stats = CleanStats::default();
    if !dir.is_dir() {
        return Ok(stats);
    }

    let mut files = Vec::new();
    let mut total = 0u64;
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().map_err(std::io::Error::from)?;
        total += meta.len();
        files.push(FileInfo { path: entry.into_path(), size: meta.len(), modified: meta.modified()? });
    }
    tracing::info!(total, limit = max_size_bytes, files = files.len(), "blob cache size");

    if total > max_size_bytes {
        // order so that the next victim is at the end
        match policy {
            EvictionPolicy::OldestFirst => files.sort_by(|a, b| b.modified.cmp(&a.modified)),
            EvictionPolicy::LargestFirst => files.sort_by(|a, b| a.size.cmp(&b.size)),
        }

        while total > max_size_bytes {
            let Some(file) = files.pop() else { break };
            tracing::info!(path = %file.path.display(), size = file.size, "evicting blob");
            fs::remove_file(&file.path)?;
            total -= file.size;
            stats.removed_files += 1;
            stats.removed_bytes += file.size;
        }
    }
    stats.retained_bytes = total;

    stats.removed_dirs = remove_empty_dirs(dir)?;

    tracing::info!(
        "Removed {} files and {} directories, totaling {} bytes; retained {} bytes",
        stats.removed_files,
        stats.removed_dirs,
        stats.removed_bytes,
        stats.retained_bytes
    );
    Ok(stats)
}

/// Remove empty directories below `dir`, deepest first. `dir` itself stays.
fn remove_empty_dirs(dir: &Path) -> Result<usize, Error> {
    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if fs::read_dir(entry.path())?.next().is_none() {
            fs::remove_dir(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
