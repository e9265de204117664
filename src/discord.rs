//! Discord REST implementation of [`ChannelPlatform`].
//!
//! Talks to the v10 HTTP API with a bot token. Only the five capabilities
//! the relay needs are implemented; there is no gateway connection, so
//! channel changes made by others are picked up by index refreshes.
//!
//! Status mapping:
//! - `429` → [`PlatformError::RateLimited`] (with `retry_after` from the body)
//! - `403` → [`PlatformError::PermissionDenied`]
//! - `404` → [`PlatformError::NotFound`]
//! - other non-2xx → [`PlatformError::Api`]
//!
//! Rate limits are reported, not retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::PlatformConfig;
use crate::platform::{
    ChannelHandle, ChannelPlatform, ChannelScope, MessageRecord, PlatformError, PlatformResult,
};
use crate::render::RenderedMessage;

/// Discord channel type for guild text channels.
const GUILD_TEXT: u8 = 0;

const USER_AGENT: &str = concat!("DiscordBot (docs-relay, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    author: ApiUser,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

pub struct DiscordPlatform {
    client: reqwest::Client,
    api_base: String,
    token: String,
    /// The bot's own user id, fetched on first use.
    self_id: OnceCell<String>,
}

impl DiscordPlatform {
    pub fn new(api_base: &str, token: &str) -> PlatformResult<Self> {
        if token.trim().is_empty() {
            return Err(PlatformError::Config("bot token is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            self_id: OnceCell::new(),
        })
    }

    /// Build from `[platform]`, reading the token from its env var.
    pub fn from_config(config: &PlatformConfig) -> anyhow::Result<Self> {
        let token = config.token()?;
        Ok(Self::new(&config.api_base, &token)?)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn self_id(&self) -> PlatformResult<&str> {
        let id = self
            .self_id
            .get_or_try_init(|| async {
                let resp = check(self.request(Method::GET, "/users/@me").send().await?).await?;
                let user: ApiUser = resp.json().await?;
                debug!(user_id = %user.id, "resolved bot identity");
                Ok::<_, PlatformError>(user.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

/// Map a non-success response onto [`PlatformError`].
async fn check(resp: Response) -> PlatformResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            retry_after_secs: serde_json::from_str::<RateLimitBody>(&body)
                .map(|b| b.retry_after)
                .unwrap_or(1.0),
        },
        StatusCode::FORBIDDEN => PlatformError::PermissionDenied(body),
        StatusCode::NOT_FOUND => PlatformError::NotFound(body),
        _ => PlatformError::Api {
            status: status.as_u16(),
            message: body,
        },
    })
}

#[async_trait]
impl ChannelPlatform for DiscordPlatform {
    async fn list_channels(&self, scope: &ChannelScope) -> PlatformResult<Vec<ChannelHandle>> {
        let path = format!("/guilds/{}/channels", scope.guild_id());
        let resp = check(self.request(Method::GET, &path).send().await?).await?;
        let channels: Vec<ApiChannel> = resp.json().await?;

        Ok(channels
            .into_iter()
            .filter(|c| c.kind == GUILD_TEXT)
            .filter(|c| match scope.parent_id() {
                Some(parent) => c.parent_id.as_deref() == Some(parent),
                None => true,
            })
            .map(|c| ChannelHandle {
                id: c.id,
                name: c.name,
            })
            .collect())
    }

    async fn create_channel(
        &self,
        scope: &ChannelScope,
        name: &str,
    ) -> PlatformResult<ChannelHandle> {
        let path = format!("/guilds/{}/channels", scope.guild_id());
        let mut body = serde_json::json!({ "name": name, "type": GUILD_TEXT });
        if let Some(parent) = scope.parent_id() {
            body["parent_id"] = serde_json::Value::String(parent.to_string());
        }

        let resp = check(self.request(Method::POST, &path).json(&body).send().await?).await?;
        let channel: ApiChannel = resp.json().await?;
        Ok(ChannelHandle {
            id: channel.id,
            name: channel.name,
        })
    }

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        message: &RenderedMessage,
    ) -> PlatformResult<MessageRecord> {
        let path = format!("/channels/{}/messages", channel.id);
        let resp = check(self.request(Method::POST, &path).json(message).send().await?).await?;
        let sent: ApiMessage = resp.json().await?;
        Ok(MessageRecord {
            id: sent.id,
            authored_by_self: true,
        })
    }

    async fn fetch_last_message(
        &self,
        channel: &ChannelHandle,
    ) -> PlatformResult<Option<MessageRecord>> {
        let self_id = self.self_id().await?.to_string();
        let path = format!("/channels/{}/messages?limit=1", channel.id);
        let resp = check(self.request(Method::GET, &path).send().await?).await?;
        let messages: Vec<ApiMessage> = resp.json().await?;

        Ok(messages.into_iter().next().map(|m| MessageRecord {
            authored_by_self: m.author.id == self_id,
            id: m.id,
        }))
    }

    async fn edit_message(
        &self,
        channel: &ChannelHandle,
        message_id: &str,
        message: &RenderedMessage,
    ) -> PlatformResult<()> {
        let path = format!("/channels/{}/messages/{}", channel.id, message_id);
        check(self.request(Method::PATCH, &path).json(message).send().await?).await?;
        Ok(())
    }
}
