// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus scanner using the ignore crate (same as ripgrep)
//!
//! A corpus directory holds one unpacked checkout per repository, named
//! `<repository>_<revision>`. Checkouts unpacked from an archive usually wrap
//! everything in a single top-level folder named after the repository or the
//! revision; that folder is treated as the repository root.

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::parser::SourceLanguage;
use crate::unit::SourceFile;

/// Default maximum file size in bytes (1MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// One repository checkout inside the corpus directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub repository_id: String,
    pub revision: String,
    pub path: PathBuf,
}

impl Checkout {
    /// Directory that file paths are made relative to.
    pub fn source_root(&self) -> PathBuf {
        let Ok(entries) = std::fs::read_dir(&self.path) else {
            return self.path.clone();
        };
        let entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
        match entries.as_slice() {
            [only] if only.path().is_dir() && self.is_archive_wrapper(&only.file_name()) => {
                only.path()
            }
            _ => self.path.clone(),
        }
    }

    /// `<repository>-<revision>` style folder, as produced by source archives.
    fn is_archive_wrapper(&self, name: &std::ffi::OsStr) -> bool {
        let name = name.to_string_lossy();
        name.starts_with(&self.repository_id) || name.contains(&self.revision)
    }

    /// File stem used for this checkout's unit file.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.repository_id, self.revision)
    }
}

/// Split `<repository>_<revision>` at the last underscore.
pub fn parse_checkout_name(name: &str) -> Option<(String, String)> {
    let (repo, rev) = name.rsplit_once('_')?;
    if repo.is_empty() || rev.is_empty() {
        return None;
    }
    Some((repo.to_string(), rev.to_string()))
}

/// List checkouts in `corpus_root`, sorted by directory name.
pub fn discover_checkouts(corpus_root: impl AsRef<Path>) -> Result<Vec<Checkout>> {
    let corpus_root = corpus_root.as_ref();
    let entries =
        std::fs::read_dir(corpus_root).map_err(|e| Error::io(corpus_root, e))?;

    let mut checkouts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(corpus_root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        match parse_checkout_name(&name) {
            Some((repository_id, revision)) => checkouts.push(Checkout {
                repository_id,
                revision,
                path,
            }),
            None => warn!("ignoring {}: expected <repository>_<revision>", name),
        }
    }

    checkouts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(checkouts)
}

/// Source file scanner that respects .gitignore
pub struct FileScanner {
    max_file_size: u64,
    exclude_patterns: Vec<String>,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileScanner {
    pub fn new() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            exclude_patterns: Vec::new(),
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Glob patterns (gitignore syntax) to leave out of the scan
    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Scan a checkout, returning its source files sorted by relative path.
    pub fn scan(&self, checkout: &Checkout) -> Result<Vec<SourceFile>> {
        let root = checkout.source_root();
        let mut files = self.scan_dir(&root)?;
        for file in &mut files {
            file.repository_id = checkout.repository_id.clone();
            file.revision = checkout.revision.clone();
        }
        Ok(files)
    }

    /// Scan a plain directory; repository and revision are left empty.
    pub fn scan_dir(&self, root: &Path) -> Result<Vec<SourceFile>> {
        let mut overrides = OverrideBuilder::new(root);
        for pattern in &self.exclude_patterns {
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| Error::Config(format!("invalid exclude '{}': {}", pattern, e)))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| Error::Config(format!("invalid exclude patterns: {}", e)))?;

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .overrides(overrides)
            .build_parallel();

        let (tx, rx) = mpsc::channel();
        walker.run(|| {
            let tx = tx.clone();
            Box::new(move |entry| {
                let Ok(entry) = entry else {
                    return ignore::WalkState::Continue;
                };
                let path = entry.path();
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    return ignore::WalkState::Continue;
                }
                if SourceLanguage::from_path(path).is_none() {
                    return ignore::WalkState::Continue;
                }
                if let Some(file) = self.read_file(root, path) {
                    let _ = tx.send(file);
                }
                ignore::WalkState::Continue
            })
        });

        drop(tx);
        let mut files: Vec<SourceFile> = rx.into_iter().collect();
        files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(files)
    }

    fn read_file(&self, root: &Path, path: &Path) -> Option<SourceFile> {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size > self.max_file_size {
            debug!("skipping {}: {} bytes exceeds limit", path.display(), size);
            return None;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                debug!("skipping {}: {}", path.display(), err);
                return None;
            }
        };
        if content.contains('\0') {
            debug!("skipping {}: binary content", path.display());
            return None;
        }

        Some(SourceFile {
            repository_id: String::new(),
            revision: String::new(),
            file_path: relative_path(root, path),
            content,
        })
    }
}

/// `/`-separated path of `path` relative to `root`
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
