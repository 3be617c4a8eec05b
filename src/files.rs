//! Output directory and static asset management.
//!
//! The [`FileManager`] owns everything the build does to the output tree
//! apart from rendering: creating and cleaning it, writing pages, and
//! merging static asset directories into `<output>/static`.
//!
//! ## Merge semantics
//!
//! Asset trees are merged, never mirrored. Subdirectories are created as
//! needed and a file that already exists at the destination is left alone,
//! so whichever source is merged first wins. The build merges
//! `templates/static/` before `static/`.

use crate::vars::DEFAULT_TEMPLATE;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Name of the asset directory inside the output tree.
pub const STATIC_DIR: &str = "static";

#[derive(Error, Debug)]
pub enum FilesError {
    #[error("Base template ({}) not found", .0.display())]
    MissingBaseTemplate(PathBuf),
    #[error(
        "output directory {} would overwrite {}; choose an output_dir outside the project sources",
        .output.display(),
        .protected.display()
    )]
    UnsafeOutputDir { output: PathBuf, protected: PathBuf },
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> FilesError + '_ {
    move |source| FilesError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Files copied and skipped while merging one asset tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub copied: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.copied += rhs.copied;
        self.skipped += rhs.skipped;
    }
}

#[derive(Debug, Clone)]
pub struct FileManager {
    out_dir: PathBuf,
}

impl FileManager {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Fail unless `templates_dir/base.html` exists.
    pub fn check_required_paths(templates_dir: &Path) -> Result<(), FilesError> {
        let base = templates_dir.join(DEFAULT_TEMPLATE);
        if base.is_file() {
            Ok(())
        } else {
            Err(FilesError::MissingBaseTemplate(base))
        }
    }

    /// Fail if the output directory is, or contains, one of `protected`.
    ///
    /// Paths are compared lexically after making them absolute, so the
    /// directories do not need to exist yet.
    pub fn check_output_dir(&self, protected: &[&Path]) -> Result<(), FilesError> {
        let output = normalize(&self.out_dir);
        for dir in protected {
            let dir_norm = normalize(dir);
            if dir_norm.starts_with(&output) {
                return Err(FilesError::UnsafeOutputDir {
                    output: self.out_dir.clone(),
                    protected: dir.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    pub fn create_out_dir(&self) -> Result<(), FilesError> {
        fs::create_dir_all(&self.out_dir).map_err(io_at(&self.out_dir))
    }

    /// Remove the output directory. Returns whether there was one to remove.
    pub fn clean_build_path(&self) -> Result<bool, FilesError> {
        if !self.out_dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.out_dir).map_err(io_at(&self.out_dir))?;
        Ok(true)
    }

    /// Write a rendered page to `<out_dir>/<rel>`, creating parent directories.
    pub fn write_page(&self, rel: &Path, content: &str) -> io::Result<PathBuf> {
        let dest = self.out_dir.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, content)?;
        Ok(dest)
    }

    /// Merge `templates/static/` into `<out_dir>/static`, if it exists.
    pub fn copy_template_assets(&self, template_static: &Path) -> Result<MergeStats, FilesError> {
        self.copy_assets(template_static)
    }

    /// Merge the site `static/` directory into `<out_dir>/static`, if it exists.
    pub fn copy_site_assets(&self, site_static: &Path) -> Result<MergeStats, FilesError> {
        self.copy_assets(site_static)
    }

    fn copy_assets(&self, source: &Path) -> Result<MergeStats, FilesError> {
        if !source.is_dir() {
            return Ok(MergeStats::default());
        }
        merge_dirs(source, &self.out_dir.join(STATIC_DIR))
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Copy every file under `source` to the same relative path under `dest`.
///
/// Existing destination files are never overwritten.
pub fn merge_dirs(source: &Path, dest: &Path) -> Result<MergeStats, FilesError> {
    let mut stats = MergeStats::default();
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(|e| FilesError::Walk {
            path: source.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(rel);
        if target.exists() {
            stats.skipped += 1;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        fs::copy(entry.path(), &target).map_err(io_at(&target))?;
        stats.copied += 1;
    }
    Ok(stats)
}
