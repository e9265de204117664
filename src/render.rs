//! Rendering of chunks and summaries into platform message units.
//!
//! A [`RenderedMessage`] serializes to the platform's message body
//! (`content` + `embeds`), so the HTTP client can post it as-is.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Chunk, ParsedDocument};
use crate::summary::DocumentSummary;

/// Platform limits on embed parts.
const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;

/// Metadata entries shown on each chunk message.
const MAX_METADATA_FIELDS: usize = 3;

/// Section titles listed in a summary before eliding the rest.
const MAX_SUMMARY_SECTIONS: usize = 15;

const SEPARATOR: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// One message per chunk: document title, chunk text, leading metadata,
/// and a `Part i/n` footer for multi-part documents.
pub fn render_chunk(
    doc: &ParsedDocument,
    chunk: &Chunk,
    color: u32,
    at: DateTime<Utc>,
) -> RenderedMessage {
    let fields = doc
        .metadata
        .iter()
        .take(MAX_METADATA_FIELDS)
        .map(|(key, value)| EmbedField {
            name: truncate(key, MAX_FIELD_NAME),
            value: truncate(value, MAX_FIELD_VALUE),
            inline: true,
        })
        .collect();

    let mut footer = format!("📄 {}", chunk.source_name);
    if chunk.total > 1 {
        footer.push_str(&format!(" • Part {}/{}", chunk.index, chunk.total));
    }

    RenderedMessage {
        content: None,
        embeds: vec![Embed {
            title: Some(truncate(&doc.title, MAX_TITLE)),
            description: Some(truncate(&chunk.content, MAX_DESCRIPTION)),
            url: None,
            color,
            fields,
            footer: Some(EmbedFooter { text: footer }),
            timestamp: Some(at.to_rfc3339()),
        }],
    }
}

/// One compact message describing the whole document.
pub fn render_summary(summary: &DocumentSummary, color: u32) -> RenderedMessage {
    let mut fields = vec![separator()];

    if !summary.sections.is_empty() {
        let mut listing = summary
            .sections
            .iter()
            .take(MAX_SUMMARY_SECTIONS)
            .map(|s| format!("• {}", s))
            .collect::<Vec<_>>()
            .join("\n");
        if summary.sections.len() > MAX_SUMMARY_SECTIONS {
            listing.push_str(&format!(
                "\n• ... and {} more",
                summary.sections.len() - MAX_SUMMARY_SECTIONS
            ));
        }
        fields.push(EmbedField {
            name: format!("📑 Sections ({}):", summary.sections.len()),
            value: truncate(&listing, MAX_FIELD_VALUE),
            inline: false,
        });
    }

    fields.push(EmbedField {
        name: String::new(),
        value: summary.stats_line(),
        inline: false,
    });

    if let Some(url) = &summary.source_url {
        fields.push(EmbedField {
            name: String::new(),
            value: format!("🔗 [View source]({})", url),
            inline: false,
        });
    }

    fields.push(separator());

    RenderedMessage {
        content: None,
        embeds: vec![Embed {
            title: Some(truncate(&format!("📄 {}", summary.file_name), MAX_TITLE)),
            description: Some(truncate(&summary.description, MAX_DESCRIPTION)),
            url: summary.source_url.clone(),
            color,
            fields,
            footer: Some(EmbedFooter {
                text: "Last updated".to_string(),
            }),
            timestamp: Some(summary.last_modified.to_rfc3339()),
        }],
    }
}

fn separator() -> EmbedField {
    EmbedField {
        name: SEPARATOR.to_string(),
        value: String::new(),
        inline: false,
    }
}

/// Cut to `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn chunk(index: usize, total: usize) -> Chunk {
        Chunk {
            content: "body text".to_string(),
            index,
            total,
            source_name: "API.md".to_string(),
        }
    }

    #[test]
    fn test_chunk_footer_shows_part_only_when_split() {
        let doc = parse("API.md", "# API\n");
        let single = render_chunk(&doc, &chunk(1, 1), 0x5865F2, Utc::now());
        let footer = single.embeds[0].footer.as_ref().unwrap();
        assert_eq!(footer.text, "📄 API.md");

        let multi = render_chunk(&doc, &chunk(2, 3), 0x5865F2, Utc::now());
        let footer = multi.embeds[0].footer.as_ref().unwrap();
        assert_eq!(footer.text, "📄 API.md • Part 2/3");
    }

    #[test]
    fn test_chunk_shows_at_most_three_metadata_fields() {
        let doc = parse(
            "API.md",
            "# API\n> **A** : 1\n> **B** : 2\n> **C** : 3\n> **D** : 4\n",
        );
        let msg = render_chunk(&doc, &chunk(1, 1), 0, Utc::now());
        let names: Vec<_> = msg.embeds[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(msg.embeds[0].title.as_deref(), Some("API"));
    }

    #[test]
    fn test_serialized_shape_skips_empty_parts() {
        let doc = parse("a.md", "# A\n");
        let msg = render_chunk(&doc, &chunk(1, 1), 7, Utc::now());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["embeds"][0]["color"], 7);
        assert!(json["embeds"][0].get("fields").is_none());
    }

    #[test]
    fn test_truncate_by_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }
}
