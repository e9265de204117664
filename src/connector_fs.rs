//! Document source: the local document tree.
//!
//! A file is *tracked* when it has the configured extension (compared
//! case-insensitively), matches one of the include globs, and matches none
//! of the exclude globs. Globs are evaluated against the path relative to
//! the document root with `/` separators.
//!
//! Unreadable files and files that are not valid UTF-8 are skipped with a
//! warning; they never abort a scan.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::DocsConfig;
use crate::models::SourceDocument;

/// Compiled tracking rules for one document root.
pub struct DocumentFilter {
    root: PathBuf,
    extension: String,
    include: GlobSet,
    exclude: GlobSet,
}

impl DocumentFilter {
    pub fn new(docs: &DocsConfig) -> Result<Self> {
        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(docs.exclude_globs.clone());

        Ok(Self {
            root: docs.root.clone(),
            extension: docs.extension.trim_start_matches('.').to_lowercase(),
            include: build_globset(&docs.include_globs)?,
            exclude: build_globset(&default_excludes)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether a root-relative path is a tracked document.
    pub fn is_tracked(&self, relative: &Path) -> bool {
        let has_extension = relative
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase() == self.extension)
            .unwrap_or(false);
        if !has_extension {
            return false;
        }

        let rel_str = to_slash(relative);
        !self.exclude.is_match(&rel_str) && self.include.is_match(&rel_str)
    }

    /// Root-relative form of `path`. Absolute paths and paths relative to
    /// the working directory must lie under the root; any other relative
    /// path is taken as already root-relative.
    pub fn relative_to_root(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        // Watchers report canonical paths; the configured root may not be.
        if let (Ok(root), Ok(full)) = (self.root.canonicalize(), path.canonicalize()) {
            if let Ok(rel) = full.strip_prefix(&root) {
                return Some(rel.to_path_buf());
            }
        }
        if path.is_relative() {
            return Some(path.to_path_buf());
        }
        None
    }
}

/// Scan the whole document root. Documents come back sorted by relative
/// path.
pub fn scan_documents(docs: &DocsConfig) -> Result<Vec<SourceDocument>> {
    let filter = DocumentFilter::new(docs)?;
    let root = filter.root();
    if !root.exists() {
        bail!("Document root does not exist: {}", root.display());
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !filter.is_tracked(relative) {
            continue;
        }

        if let Some(doc) = load(path, relative) {
            documents.push(doc);
        }
    }

    documents.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(documents)
}

/// Read selected documents. Each path may be absolute or relative to the
/// root; untracked, missing, and undecodable paths are skipped.
pub fn read_documents(filter: &DocumentFilter, paths: &[PathBuf]) -> Vec<SourceDocument> {
    paths
        .iter()
        .filter_map(|path| read_document(filter, path))
        .collect()
}

pub fn read_document(filter: &DocumentFilter, path: &Path) -> Option<SourceDocument> {
    let Some(relative) = filter.relative_to_root(path) else {
        warn!(path = %path.display(), "outside the document root, skipping");
        return None;
    };
    if !filter.is_tracked(&relative) {
        warn!(path = %relative.display(), "not a tracked document, skipping");
        return None;
    }
    load(&filter.root().join(&relative), &relative)
}

fn load(path: &Path, relative: &Path) -> Option<SourceDocument> {
    match read_source(path, relative) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{:#}", e), "skipping document");
            None
        }
    }
}

fn read_source(path: &Path, relative: &Path) -> Result<SourceDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(SourceDocument {
        path: path.to_path_buf(),
        relative_path: relative.to_path_buf(),
        text,
        modified,
    })
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
