//! Media root enumeration and relative-path safety.

use keepsake_model::MediaFileDescriptor;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Regular files found under the media root.
#[derive(Debug, Default)]
pub struct MediaScan {
    /// Sorted by relative path.
    pub files: Vec<MediaFileDescriptor>,
    /// Entries that could not be read or stat'd.
    pub broken: usize,
}

/// Walks `root`, skipping hidden files and directories. A missing root is
/// an empty scan.
pub fn scan_media_root(root: &Path) -> MediaScan {
    let mut scan = MediaScan::default();
    if !root.exists() {
        debug!("media root {} does not exist, nothing to scan", root.display());
        return scan;
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("unreadable media entry: {e}");
                scan.broken += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("cannot stat {}: {e}", entry.path().display());
                scan.broken += 1;
                continue;
            }
        };
        match relative_path(root, entry.path()) {
            Some(rel) => scan.files.push(MediaFileDescriptor::new(rel, metadata.len())),
            None => {
                warn!("skipping media file with non UTF-8 path: {}", entry.path().display());
                scan.broken += 1;
            }
        }
    }
    scan
}

/// `/`-joined path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    Some(parts?.join("/"))
}

/// Resolves a container-relative path under `root`, or `None` if it is
/// absolute, empty, or climbs out with `..`.
pub fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() || relative.starts_with('/') || relative.contains('\\') {
        return None;
    }
    let mut out = root.to_path_buf();
    let mut depth = 0usize;
    for part in relative.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            p => {
                if Path::new(p).components().any(|c| !matches!(c, Component::Normal(_))) {
                    return None;
                }
                out.push(p);
                depth += 1;
            }
        }
    }
    (depth > 0).then_some(out)
}
