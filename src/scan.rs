//! Page discovery.
//!
//! Walks the pages directory and returns every file whose extension is one
//! of the configured page extensions, as a path relative to the pages root.
//! The relative path doubles as the output path, so `pages/blog/post.html`
//! is written to `build/blog/post.html`.
//!
//! The result is sorted to keep build output stable; nothing downstream
//! depends on the order.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Collect page sources under `pages_root`, relative to it.
///
/// A missing pages directory yields no pages rather than an error.
pub fn collect_pages(pages_root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    if !pages_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut pages = Vec::new();
    for entry in WalkDir::new(pages_root).follow_links(true) {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: pages_root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !is_page(entry.path(), extensions) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(pages_root) {
            pages.push(rel.to_path_buf());
        }
    }
    pages.sort();
    Ok(pages)
}

/// Whether `path` has one of `extensions` (compared case-insensitively).
pub fn is_page(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}
