//! Core data models used throughout the relay.
//!
//! These types represent the documents, parsed structure, and chunks that
//! flow through the publication pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// A candidate document produced by a connector before parsing.
///
/// Every source (directory scan, file-change notification, post-pull diff)
/// normalizes into this shape so the pipeline treats them uniformly.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Absolute (or root-joined) path on disk.
    pub path: PathBuf,
    /// Path relative to the document root, used for channel resolution.
    pub relative_path: PathBuf,
    pub text: String,
    pub modified: DateTime<Utc>,
}

impl SourceDocument {
    /// Bare file name (`"API.md"`), used as the chunk source name.
    pub fn file_name(&self) -> String {
        self.relative_path
            .file_name()
            .or_else(|| self.path.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Relative path with `/` separators regardless of platform.
    pub fn relative_str(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// A fenced code region inside a document body.
///
/// Offsets are byte offsets into [`ParsedDocument::body`], covering the
/// opening fence through the closing fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    pub language: String,
    pub start: usize,
    pub end: usize,
}

/// A second-level section: heading text and the raw lines below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub body: String,
}

/// Typed structural view of one document. Built fresh by every parse call.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub title: String,
    pub body: String,
    pub code_regions: Vec<CodeRegion>,
    /// Keys from the leading quote block; a repeated key keeps its first
    /// position and takes the last value.
    pub metadata: IndexMap<String, String>,
    pub sections: Vec<Section>,
}

impl ParsedDocument {
    /// Source text of a code region, fences included.
    pub fn region_text(&self, region: &CodeRegion) -> &str {
        &self.body[region.start..region.end]
    }
}

/// One size-bounded piece of a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    /// 1-based position.
    pub index: usize,
    pub total: usize,
    pub source_name: String,
}
