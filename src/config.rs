use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::channel::ChannelMapping;
use crate::deliver::DeliveryMode;
use crate::platform::ChannelScope;

/// Smallest segment length the segmenter is run with.
pub const MIN_CHUNK_LENGTH: usize = 100;

/// Platform ceiling for one message.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub docs: DocsConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    pub root: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_extension() -> String {
    "md".to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_render_headroom")]
    pub render_headroom: usize,
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embed_color")]
    pub embed_color: u32,
    #[serde(default)]
    pub source_url_base: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            max_message_length: default_max_message_length(),
            render_headroom: default_render_headroom(),
            message_delay_ms: default_message_delay_ms(),
            concurrency: default_concurrency(),
            embed_color: default_embed_color(),
            source_url_base: None,
        }
    }
}

impl DeliveryConfig {
    /// Length the segmenter splits to, leaving room for rendering overhead.
    pub fn chunk_length(&self) -> usize {
        self.max_message_length.saturating_sub(self.render_headroom)
    }
}

fn default_max_message_length() -> usize {
    MAX_MESSAGE_LENGTH
}
fn default_render_headroom() -> usize {
    100
}
fn default_message_delay_ms() -> u64 {
    500
}
fn default_concurrency() -> usize {
    4
}
fn default_embed_color() -> u32 {
    0x5865F2
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStrategy {
    /// Longest-prefix match of the relative path against `[channels.mapping]`.
    #[default]
    Mapping,
    /// Channel name derived from the file name.
    Derive,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub strategy: ChannelStrategy,
    #[serde(default)]
    pub auto_create: bool,
    pub guild_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub mapping: ChannelMapping,
}

impl ChannelsConfig {
    pub fn scope(&self) -> ChannelScope {
        ChannelScope::from_ids(&self.guild_id, self.category_id.as_deref())
    }
}

fn default_refresh_interval() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
        }
    }
}

impl PlatformConfig {
    /// Bot token from the configured environment variable.
    pub fn token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env)
            .with_context(|| format!("{} environment variable not set", self.token_env))?;
        if token.trim().is_empty() {
            anyhow::bail!("{} is empty", self.token_env);
        }
        Ok(token)
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}
fn default_token_env() -> String {
    "DISCORD_BOT_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_docs_prefix")]
    pub docs_prefix: String,
    #[serde(default)]
    pub repo_dir: Option<PathBuf>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            secret_env: default_secret_env(),
            branch: default_branch(),
            docs_prefix: default_docs_prefix(),
            repo_dir: None,
        }
    }
}

impl WebhookConfig {
    /// Shared secret for signature checks; `None` disables verification.
    pub fn secret(&self) -> Option<String> {
        std::env::var(&self.secret_env)
            .ok()
            .filter(|s| !s.is_empty())
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_secret_env() -> String {
    "WEBHOOK_SECRET".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_docs_prefix() -> String {
    "docs".to_string()
}

impl Config {
    /// Git working tree holding the documents.
    pub fn repo_dir(&self) -> PathBuf {
        match &self.webhook.repo_dir {
            Some(dir) => dir.clone(),
            None => self
                .docs
                .root
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate docs
    if config.docs.extension.trim().is_empty() {
        anyhow::bail!("docs.extension must not be empty");
    }

    // Validate delivery
    let delivery = &config.delivery;
    if !(MIN_CHUNK_LENGTH..=MAX_MESSAGE_LENGTH).contains(&delivery.max_message_length) {
        anyhow::bail!(
            "delivery.max_message_length must be in [{}, {}]",
            MIN_CHUNK_LENGTH,
            MAX_MESSAGE_LENGTH
        );
    }
    if delivery.chunk_length() < MIN_CHUNK_LENGTH {
        anyhow::bail!(
            "delivery.max_message_length - delivery.render_headroom must be >= {}",
            MIN_CHUNK_LENGTH
        );
    }
    if delivery.concurrency == 0 {
        anyhow::bail!("delivery.concurrency must be >= 1");
    }

    // Validate channels
    if config.channels.guild_id.trim().is_empty() {
        anyhow::bail!("channels.guild_id must not be empty");
    }
    if config.channels.strategy == ChannelStrategy::Mapping && config.channels.mapping.is_empty() {
        anyhow::bail!("channels.mapping must not be empty when strategy is 'mapping'");
    }

    if delivery.mode == DeliveryMode::Summary && config.channels.strategy == ChannelStrategy::Mapping
    {
        tracing::warn!(
            "summary mode with path mapping: documents mapped to the same channel share one summary message"
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[docs]
root = "./docs"

[channels]
guild_id = "123"

[channels.mapping]
root = "documentation"
specs = "specifications"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.docs.extension, "md");
        assert_eq!(config.delivery.mode, DeliveryMode::Full);
        assert_eq!(config.delivery.chunk_length(), 1900);
        assert_eq!(config.delivery.message_delay_ms, 500);
        assert_eq!(config.channels.strategy, ChannelStrategy::Mapping);
        assert!(!config.channels.auto_create);
        assert_eq!(config.channels.mapping.len(), 2);
        assert_eq!(config.platform.token_env, "DISCORD_BOT_TOKEN");
        assert_eq!(config.webhook.branch, "main");
        assert_eq!(config.repo_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_category_scope() {
        let config = parse_config(&MINIMAL.replace(
            "guild_id = \"123\"",
            "guild_id = \"123\"\ncategory_id = \"456\"",
        ))
        .unwrap();
        assert_eq!(config.channels.scope().parent_id(), Some("456"));
    }

    #[test]
    fn test_message_length_out_of_range() {
        let toml = format!("{}\n[delivery]\nmax_message_length = 5000\n", MINIMAL);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("max_message_length"));
    }

    #[test]
    fn test_headroom_leaves_too_little() {
        let toml = format!(
            "{}\n[delivery]\nmax_message_length = 150\nrender_headroom = 100\n",
            MINIMAL
        );
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_mapping_strategy_requires_mapping() {
        let toml = "[docs]\nroot = \"d\"\n[channels]\nguild_id = \"1\"\n";
        assert!(parse_config(toml).is_err());

        let derive = "[docs]\nroot = \"d\"\n[channels]\nguild_id = \"1\"\nstrategy = \"derive\"\n";
        let config = parse_config(derive).unwrap();
        assert_eq!(config.channels.strategy, ChannelStrategy::Derive);
    }

    #[test]
    fn test_summary_mode_parses() {
        let toml = format!("{}\n[delivery]\nmode = \"summary\"\n", MINIMAL);
        assert_eq!(parse_config(&toml).unwrap().delivery.mode, DeliveryMode::Summary);
    }

    #[test]
    fn test_repo_dir_defaults_to_docs_parent() {
        let toml = MINIMAL.replace("./docs", "/srv/repo/docs");
        assert_eq!(
            parse_config(&toml).unwrap().repo_dir(),
            PathBuf::from("/srv/repo")
        );
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../config/relay.example.toml")).unwrap();
        assert_eq!(config.channels.mapping.len(), 3);
        assert_eq!(config.delivery.embed_color, 0x5865F2);
        assert_eq!(config.docs.exclude_globs, vec!["drafts/**".to_string()]);
    }
}
