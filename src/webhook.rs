//! Inbound push notifications.
//!
//! The HTTP transport lives in [`crate::server`]; this module holds the
//! parts that do not depend on it: signature verification, the push payload
//! model, and the filter that decides which pushed files are tracked
//! documents.

use std::collections::BTreeSet;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::Config;
use crate::connector_git::has_extension;

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Check a `sha256=<hex>` signature header against the raw body.
/// The comparison is constant-time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushCommit {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl PushPayload {
    /// Branch name from `refs/heads/<branch>`.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}

#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Push(PushPayload),
    Ping,
    Other(String),
}

/// Decode a webhook body according to its event header.
pub fn parse_event(kind: &str, body: &[u8]) -> Result<WebhookEvent, serde_json::Error> {
    match kind {
        "push" => Ok(WebhookEvent::Push(serde_json::from_slice(body)?)),
        "ping" => {
            serde_json::from_slice::<serde_json::Value>(body)?;
            Ok(WebhookEvent::Ping)
        }
        other => {
            serde_json::from_slice::<serde_json::Value>(body)?;
            Ok(WebhookEvent::Other(other.to_string()))
        }
    }
}

/// Which pushes and files the relay acts on.
#[derive(Debug, Clone)]
pub struct PushFilter {
    pub branch: String,
    pub docs_prefix: String,
    pub extension: String,
}

/// Tracked files of an accepted push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushChanges {
    /// Added or modified documents, repository-relative, sorted.
    pub changed: Vec<String>,
    /// Removed documents; reported, never acted on.
    pub removed: Vec<String>,
}

impl PushFilter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            branch: config.webhook.branch.clone(),
            docs_prefix: config.webhook.docs_prefix.clone(),
            extension: config.docs.extension.clone(),
        }
    }

    fn is_tracked(&self, path: &str) -> bool {
        let prefix = self.docs_prefix.trim_matches('/');
        let under_prefix = prefix.is_empty()
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
        under_prefix && has_extension(path, &self.extension)
    }

    /// `None` when the push is for another branch.
    pub fn tracked_changes(&self, payload: &PushPayload) -> Option<PushChanges> {
        if payload.branch() != self.branch {
            return None;
        }

        let mut changed = BTreeSet::new();
        let mut removed = BTreeSet::new();
        for commit in &payload.commits {
            changed.extend(
                commit
                    .added
                    .iter()
                    .chain(&commit.modified)
                    .filter(|p| self.is_tracked(p))
                    .cloned(),
            );
            removed.extend(commit.removed.iter().filter(|p| self.is_tracked(p)).cloned());
        }
        // A file removed and re-added in the same push still exists.
        let removed = removed.difference(&changed).cloned().collect();

        Some(PushChanges {
            changed: changed.into_iter().collect(),
            removed,
        })
    }
}

#[cfg(test)]
pub(crate) fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).unwrap();
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
