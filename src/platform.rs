//! The chat platform as seen by the relay.
//!
//! The relay depends only on a narrow capability set, expressed by
//! [`ChannelPlatform`]: enumerate channels in a scope, create a channel,
//! send a message, fetch the most recent message, and edit a message.
//! [`crate::discord`] implements it over HTTP; [`crate::platform_memory`]
//! implements it in memory for tests.

use async_trait::async_trait;

use crate::render::RenderedMessage;

/// Where channels are enumerated and created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelScope {
    /// Every text channel of a guild; new channels are created top-level.
    Guild { guild_id: String },
    /// Text channels under one category; new channels are created in it.
    Category {
        guild_id: String,
        category_id: String,
    },
}

impl ChannelScope {
    pub fn from_ids(guild_id: &str, category_id: Option<&str>) -> Self {
        match category_id {
            Some(category_id) if !category_id.is_empty() => Self::Category {
                guild_id: guild_id.to_string(),
                category_id: category_id.to_string(),
            },
            _ => Self::Guild {
                guild_id: guild_id.to_string(),
            },
        }
    }

    pub fn guild_id(&self) -> &str {
        match self {
            Self::Guild { guild_id } | Self::Category { guild_id, .. } => guild_id,
        }
    }

    /// Parent for newly created channels.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Guild { .. } => None,
            Self::Category { category_id, .. } => Some(category_id),
        }
    }
}

impl std::fmt::Display for ChannelScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guild { guild_id } => write!(f, "guild {}", guild_id),
            Self::Category {
                guild_id,
                category_id,
            } => write!(f, "category {} (guild {})", category_id, guild_id),
        }
    }
}

/// A text channel the relay can post into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: String,
    pub name: String,
}

/// A message as returned by send or fetch-last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    /// Whether the relay's own identity authored the message.
    pub authored_by_self: bool,
}

/// Failures at the platform boundary.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("platform API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform configuration error: {0}")]
    Config(String),
}

impl PlatformError {
    /// Errors worth retrying later (by the caller; the relay does not retry).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Errors that make further sends into the same channel pointless: the
    /// channel is gone. Permission errors stay per message.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Channel capabilities consumed by the relay.
#[async_trait]
pub trait ChannelPlatform: Send + Sync {
    /// All text channels in `scope`.
    async fn list_channels(&self, scope: &ChannelScope) -> PlatformResult<Vec<ChannelHandle>>;

    /// Create a text channel named `name` under the scope's parent.
    async fn create_channel(&self, scope: &ChannelScope, name: &str)
        -> PlatformResult<ChannelHandle>;

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        message: &RenderedMessage,
    ) -> PlatformResult<MessageRecord>;

    /// Most recent message in the channel, if any.
    async fn fetch_last_message(&self, channel: &ChannelHandle)
        -> PlatformResult<Option<MessageRecord>>;

    async fn edit_message(
        &self,
        channel: &ChannelHandle,
        message_id: &str,
        message: &RenderedMessage,
    ) -> PlatformResult<()>;
}
