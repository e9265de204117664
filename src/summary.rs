//! Compact per-document summaries for the summary delivery mode.

use chrono::{DateTime, Utc};

use crate::models::{ParsedDocument, SourceDocument};

const MAX_DESCRIPTION: usize = 200;
const NO_DESCRIPTION: &str = "No description available.";

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    pub title: String,
    pub description: String,
    /// Second-level section titles, in document order.
    pub sections: Vec<String>,
    pub size_bytes: usize,
    pub line_count: usize,
    pub code_block_count: usize,
    pub source_url: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub file_name: String,
}

impl DocumentSummary {
    /// `📊 86 KB • 1,234 lines • 3 code blocks`
    pub fn stats_line(&self) -> String {
        let blocks = if self.code_block_count == 1 {
            "code block"
        } else {
            "code blocks"
        };
        format!(
            "📊 {} • {} lines • {} {}",
            format_size(self.size_bytes),
            thousands(self.line_count),
            self.code_block_count,
            blocks
        )
    }
}

/// Build the summary of a parsed document.
///
/// `url_base`, when set, is joined with the document's relative path to
/// link the summary to the browsable source.
pub fn build_summary(
    parsed: &ParsedDocument,
    source: &SourceDocument,
    url_base: Option<&str>,
) -> DocumentSummary {
    let source_url = url_base
        .filter(|base| !base.is_empty())
        .map(|base| format!("{}/{}", base.trim_end_matches('/'), source.relative_str()));

    DocumentSummary {
        title: parsed.title.clone(),
        description: extract_description(&parsed.body),
        sections: parsed.sections.iter().map(|s| s.title.clone()).collect(),
        size_bytes: parsed.body.len(),
        line_count: parsed.body.split('\n').count(),
        code_block_count: parsed.code_regions.len(),
        source_url,
        last_modified: source.modified,
        file_name: source.file_name(),
    }
}

/// First paragraph after the `# ` title, skipping blank and quote lines and
/// stopping at the first `## ` heading.
pub fn extract_description(text: &str) -> String {
    let mut lines = Vec::new();
    let mut found_title = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if !found_title {
            found_title = trimmed.starts_with("# ");
            continue;
        }

        if trimmed.is_empty() {
            if lines.is_empty() {
                continue;
            }
            break;
        }
        if trimmed.starts_with('>') {
            continue;
        }
        if trimmed.starts_with("## ") {
            break;
        }

        lines.push(trimmed);
        if lines.join(" ").chars().count() > MAX_DESCRIPTION {
            break;
        }
    }

    let description = lines.join(" ");
    if description.is_empty() {
        return NO_DESCRIPTION.to_string();
    }
    if description.chars().count() > MAX_DESCRIPTION {
        let kept: String = description.chars().take(MAX_DESCRIPTION - 3).collect();
        return format!("{}...", kept);
    }
    description
}

/// `512 B`, `86 KB`, `1.2 MB`
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.0} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
