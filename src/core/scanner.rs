use anyhow::Result;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::classifier::Classifier;
use super::record::{module_of, FileKind};

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Root-relative, `/`-separated.
    pub relative: String,
    pub module: String,
    /// Extension-based kind, if the extension alone decides it.
    pub kind_hint: Option<FileKind>,
}

pub struct FileScanner {
    ignore_dirs: Vec<String>,
    excluded: Vec<PathBuf>,
    follow_links: bool,
}

impl FileScanner {
    pub fn new() -> Self {
        Self {
            ignore_dirs: Vec::new(),
            excluded: Vec::new(),
            follow_links: false,
        }
    }

    pub fn with_ignore_dirs(mut self, names: Vec<String>) -> Self {
        self.ignore_dirs = names;
        self
    }

    /// Directories that are never descended into, e.g. the output directory.
    pub fn with_excluded(mut self, paths: Vec<PathBuf>) -> Self {
        self.excluded = paths
            .into_iter()
            .map(|p| p.canonicalize().unwrap_or(p))
            .collect();
        self
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn scan_directory(&self, root_path: &Path, classifier: &Classifier) -> Result<Vec<FileEntry>> {
        let root = root_path
            .canonicalize()
            .unwrap_or_else(|_| root_path.to_path_buf());

        // Collect all entries first for parallel processing
        let entries: Vec<DirEntry> = WalkDir::new(&root)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_entry(|entry| !self.is_skipped_dir(entry))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Skipping unreadable directory entry: {err}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .collect();

        let mut files: Vec<FileEntry> = entries
            .par_iter()
            .filter_map(|entry| {
                let path = entry.path();
                let relative = relative_path(&root, path)?;
                Some(FileEntry {
                    path: path.to_path_buf(),
                    module: module_of(&relative),
                    kind_hint: classifier.classify_path(path),
                    relative,
                })
            })
            .collect();

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    fn is_skipped_dir(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        if let Some(name) = entry.file_name().to_str() {
            if self.ignore_dirs.iter().any(|ignored| ignored == name) {
                return true;
            }
        }
        if self.excluded.is_empty() {
            return false;
        }
        let path = entry
            .path()
            .canonicalize()
            .unwrap_or_else(|_| entry.path().to_path_buf());
        self.excluded.iter().any(|excluded| excluded == &path)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
