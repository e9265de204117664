//! Structural parser for markdown documents.
//!
//! Turns raw text into a [`ParsedDocument`]: title, fenced code regions,
//! leading metadata quote block, and second-level sections. Parsing never
//! fails; malformed input degrades to a best-effort result.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::models::{CodeRegion, ParsedDocument, Section};

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+)$").expect("valid title pattern"));

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(\w*)[ \t]*\r?\n(.*?)```").expect("valid code fence pattern")
});

static METADATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^>\s*\*\*(.+?)\*\*\s*[:\-]\s*(.+)$").expect("valid metadata pattern")
});

/// Parse `text` into its structural units.
///
/// `identifier` is usually the file path; its stem becomes the title when the
/// document has no top-level heading.
pub fn parse(identifier: &str, text: &str) -> ParsedDocument {
    let (title, title_line) = match extract_title(text) {
        Some((title, line)) => (title, Some(line)),
        None => (fallback_title(identifier), None),
    };

    let code_regions = extract_code_regions(text);
    let metadata = extract_metadata(text, title_line);
    let sections = extract_sections(text);

    debug!(
        identifier,
        title = %title,
        code_regions = code_regions.len(),
        metadata = metadata.len(),
        sections = sections.len(),
        "parsed document"
    );

    ParsedDocument {
        title,
        body: text.to_string(),
        code_regions,
        metadata,
        sections,
    }
}

/// First `# heading` anywhere in the text, with its 0-based line number.
fn extract_title(text: &str) -> Option<(String, usize)> {
    let caps = TITLE.captures(text)?;
    let whole = caps.get(0)?;
    let title = caps.get(1)?.as_str().trim().to_string();
    if title.is_empty() {
        return None;
    }
    let line = text[..whole.start()].matches('\n').count();
    Some((title, line))
}

fn fallback_title(identifier: &str) -> String {
    Path::new(identifier)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| identifier.to_string())
}

/// Terminated fenced blocks in source order. An opening fence with no
/// closing fence before end-of-document records nothing.
fn extract_code_regions(text: &str) -> Vec<CodeRegion> {
    CODE_FENCE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let language = caps
                .get(1)
                .map(|m| m.as_str())
                .filter(|l| !l.is_empty())
                .unwrap_or("text")
                .to_string();
            Some(CodeRegion {
                language,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Contiguous `> **key** : value` block directly below the title.
///
/// Blank lines are skipped; the first other non-quote line ends the scan,
/// whether or not a quote line was seen before it.
fn extract_metadata(text: &str, title_line: Option<usize>) -> IndexMap<String, String> {
    let mut metadata = IndexMap::new();
    let start = title_line.map(|l| l + 1).unwrap_or(0);

    for line in text.lines().skip(start) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('>') {
            break;
        }
        if let Some(caps) = METADATA_LINE.captures(trimmed) {
            let key = caps[1].trim().to_string();
            let value = caps[2].trim().to_string();
            metadata.insert(key, value);
        }
    }

    metadata
}

/// Split on lines beginning with `## `. Text before the first such heading
/// belongs to no section; section bodies are kept verbatim.
fn extract_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.split('\n') {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some((title, lines)) = current.take() {
                push_section(&mut sections, title, &lines);
            }
            current = Some((heading.trim().to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }

    if let Some((title, lines)) = current {
        push_section(&mut sections, title, &lines);
    }

    sections
}

fn push_section(sections: &mut Vec<Section>, title: String, lines: &[&str]) {
    if title.is_empty() {
        return;
    }
    sections.push(Section {
        title,
        body: lines.join("\n"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_first_heading() {
        let doc = parse("docs/api.md", "intro line\n\n# API Guide\n\ntext\n# Second");
        assert_eq!(doc.title, "API Guide");
    }

    #[test]
    fn test_title_falls_back_to_file_stem() {
        let doc = parse("docs/specs/BACKEND_SPECS.md", "no heading here\n## Only h2");
        assert_eq!(doc.title, "BACKEND_SPECS");
    }

    #[test]
    fn test_h2_is_not_a_title() {
        let doc = parse("notes.md", "## Section\nbody");
        assert_eq!(doc.title, "notes");
    }

    #[test]
    fn test_code_regions_in_order() {
        let text = "# T\n\n```rust\nfn main() {}\n```\n\ntext\n\n```\nplain\n```\n";
        let doc = parse("t.md", text);
        assert_eq!(doc.code_regions.len(), 2);
        assert_eq!(doc.code_regions[0].language, "rust");
        assert_eq!(doc.code_regions[1].language, "text");
        assert!(doc.code_regions[0].end <= doc.code_regions[1].start);
        assert_eq!(
            doc.region_text(&doc.code_regions[0]),
            "```rust\nfn main() {}\n```"
        );
    }

    #[test]
    fn test_unterminated_fence_records_nothing() {
        let text = "# T\n\n```python\nprint('open')\n";
        let doc = parse("t.md", text);
        assert!(doc.code_regions.is_empty());
        assert_eq!(doc.body, text);
    }

    #[test]
    fn test_metadata_after_title() {
        let text = "# Design\n\n> **Status** : Done\n> **Date** : 2026-01-02\n\nBody text.\n";
        let doc = parse("design.md", text);
        let entries: Vec<_> = doc.metadata.iter().collect();
        assert_eq!(
            entries,
            vec![
                (&"Status".to_string(), &"Done".to_string()),
                (&"Date".to_string(), &"2026-01-02".to_string())
            ]
        );
    }

    #[test]
    fn test_metadata_duplicate_key_last_wins() {
        let text = "# Design\n> **Owner** : alice\n> **Tag** - x\n> **Owner** : bob\n";
        let doc = parse("design.md", text);
        assert_eq!(doc.metadata.len(), 2);
        assert_eq!(doc.metadata["Owner"], "bob");
        assert_eq!(doc.metadata.get_index(0).unwrap().0, "Owner");
    }

    #[test]
    fn test_metadata_later_quote_block_ignored() {
        let text = "# Design\n\nIntro paragraph.\n\n## Details\n\n> **Status** : Draft\n";
        let doc = parse("design.md", text);
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn test_metadata_block_ends_at_first_content_line() {
        let text = "# Design\n> **A** : 1\nprose\n> **B** : 2\n";
        let doc = parse("design.md", text);
        assert_eq!(doc.metadata.len(), 1);
        assert!(doc.metadata.contains_key("A"));
    }

    #[test]
    fn test_sections_keep_code_verbatim() {
        let text = "# T\npreamble\n## One\nalpha\n```sh\n## not a heading? yes it is\n```\n## Two\nbeta";
        let doc = parse("t.md", text);
        let titles: Vec<_> = doc.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "not a heading? yes it is", "Two"]);
        assert_eq!(doc.sections[0].body, "alpha\n```sh");
        assert_eq!(doc.sections[2].body, "beta");
    }

    #[test]
    fn test_three_hashes_do_not_split() {
        let doc = parse("t.md", "## A\n### sub\ntext");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].body, "### sub\ntext");
    }

    #[test]
    fn test_empty_input() {
        let doc = parse("empty.md", "");
        assert_eq!(doc.title, "empty");
        assert!(doc.code_regions.is_empty());
        assert!(doc.metadata.is_empty());
        assert!(doc.sections.is_empty());
    }
}
