//! Channel naming and path-to-channel mapping.
//!
//! Two pure strategies produce a destination channel *name* for a document:
//!
//! - **Name derivation** ([`derive_channel_name`]): the file name is
//!   transliterated into a valid channel name (`BACKEND_SPECS.md` →
//!   `backend-specs`).
//! - **Path mapping** ([`ChannelMapping::resolve`]): the document's path
//!   relative to the root is matched against configured folder/file rules,
//!   most specific rule first.
//!
//! Looking the name up (and optionally creating the channel) is the job of
//! [`crate::resolver`].

use std::path::{Component, Path};

use indexmap::IndexMap;
use serde::Deserialize;

/// Platform limit on channel name length.
pub const MAX_CHANNEL_NAME: usize = 100;

/// Mapping key used for documents directly under the root.
pub const ROOT_KEY: &str = "root";

/// Turn a file name into a channel name.
///
/// Strips the extension, then applies [`sanitize_channel_name`]. Returns an
/// empty string when nothing usable is left.
pub fn derive_channel_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    sanitize_channel_name(&stem)
}

/// Restrict a name to `[a-z0-9-]`, at most [`MAX_CHANNEL_NAME`] characters.
///
/// Spaces and underscores become `-`, other characters are dropped, runs of
/// `-` collapse, and no leading or trailing `-` is left.
pub fn sanitize_channel_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = match c {
            ' ' | '_' => '-',
            c => c,
        };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            continue;
        }
        if c == '-' && name.ends_with('-') {
            continue;
        }
        name.push(c);
    }

    let name = name.trim_matches('-');
    let name = if name.len() > MAX_CHANNEL_NAME {
        // ASCII only at this point, so byte slicing is char slicing.
        &name[..MAX_CHANNEL_NAME]
    } else {
        name
    };
    name.trim_end_matches('-').to_string()
}

/// Comparison key for channel names: lowercase with `-` and `_` removed.
pub fn normalize_channel_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect()
}

/// Ordered table of path keys (folder path, file path, or `"root"`) to
/// channel names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "IndexMap<String, String>")]
pub struct ChannelMapping {
    rules: IndexMap<String, String>,
}

impl From<IndexMap<String, String>> for ChannelMapping {
    fn from(raw: IndexMap<String, String>) -> Self {
        let rules = raw
            .into_iter()
            .map(|(key, channel)| (normalize_key(&key), channel))
            .collect();
        Self { rules }
    }
}

impl ChannelMapping {
    pub fn new<I, K, V>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let raw: IndexMap<String, String> = rules
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Configured `(key, channel)` pairs in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Channel name for a path relative to the document root.
    ///
    /// Tries the exact file path, then each ancestor folder from the most to
    /// the least specific, then `"root"` for documents at the root. `None`
    /// means no rule covers the document.
    pub fn resolve(&self, relative_path: &Path) -> Option<&str> {
        let parts: Vec<String> = relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            return None;
        }

        for depth in (1..=parts.len()).rev() {
            let key = parts[..depth].join("/");
            if let Some(channel) = self.rules.get(&key) {
                return Some(channel.as_str());
            }
        }

        if parts.len() == 1 {
            return self.rules.get(ROOT_KEY).map(|c| c.as_str());
        }

        None
    }
}

fn normalize_key(key: &str) -> String {
    key.replace('\\', "/")
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_from_upper_snake_case() {
        assert_eq!(derive_channel_name("BACKEND_SPECS.md"), "backend-specs");
    }

    #[test]
    fn test_derive_with_spaces_and_upper_extension() {
        assert_eq!(derive_channel_name("My Notes v2.MD"), "my-notes-v2");
    }

    #[test]
    fn test_derive_collapses_and_trims_separators() {
        assert_eq!(derive_channel_name("__Draft -- (old)__.md"), "draft-old");
    }

    #[test]
    fn test_derive_pathological_is_empty() {
        assert_eq!(derive_channel_name("???.md"), "");
        assert_eq!(derive_channel_name("日本語.md"), "");
    }

    #[test]
    fn test_derive_truncates_without_trailing_separator() {
        let long = format!("{}_{}.md", "a".repeat(99), "b".repeat(20));
        let name = derive_channel_name(&long);
        assert_eq!(name, "a".repeat(99));
        assert!(name.len() <= MAX_CHANNEL_NAME);
    }

    #[test]
    fn test_normalize_ignores_separators_and_case() {
        assert_eq!(normalize_channel_name("Backend_Specs"), "backendspecs");
        assert_eq!(
            normalize_channel_name("backend-specs"),
            normalize_channel_name("BACKEND_SPECS")
        );
    }

    fn mapping() -> ChannelMapping {
        ChannelMapping::new([("specs", "specifications"), ("root", "documentation")])
    }

    #[test]
    fn test_mapping_folder_rule() {
        assert_eq!(
            mapping().resolve(Path::new("specs/api.md")),
            Some("specifications")
        );
    }

    #[test]
    fn test_mapping_root_document() {
        assert_eq!(mapping().resolve(Path::new("api.md")), Some("documentation"));
    }

    #[test]
    fn test_mapping_unmapped_folder() {
        assert_eq!(mapping().resolve(Path::new("unmapped/x.md")), None);
    }

    #[test]
    fn test_mapping_most_specific_rule_wins() {
        let m = ChannelMapping::new([
            ("specs", "specifications"),
            ("specs/api", "api-specs"),
            ("specs/api/auth.md", "auth"),
        ]);
        assert_eq!(m.resolve(Path::new("specs/api/auth.md")), Some("auth"));
        assert_eq!(m.resolve(Path::new("specs/api/users.md")), Some("api-specs"));
        assert_eq!(m.resolve(Path::new("specs/db/schema.md")), Some("specifications"));
    }

    #[test]
    fn test_mapping_root_only_for_root_documents() {
        let m = ChannelMapping::new([("root", "documentation")]);
        assert_eq!(m.resolve(Path::new("nested/readme.md")), None);
    }

    #[test]
    fn test_mapping_keys_are_normalized() {
        let m = ChannelMapping::new([("./plans/", "planning")]);
        assert_eq!(m.resolve(Path::new("./plans/q3.md")), Some("planning"));
    }
}
