//! Single ingestion point for everything that can trigger publication.
//!
//! Watchers, the webhook server, and timers never call the publisher
//! directly; they send a [`RelayEvent`] and [`Relay::handle`] dispatches on
//! its kind. Events are handled one at a time, in arrival order; the
//! documents of one event are published concurrently by the publisher.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ChannelStrategy, Config, DocsConfig};
use crate::connector_fs::{read_documents, scan_documents, DocumentFilter};
use crate::connector_git::git_pull;
use crate::deliver::{BatchSummary, DeliveryOptions, DeliveryReport, Publisher};
use crate::platform::ChannelPlatform;
use crate::resolver::{ChannelCache, ChannelResolver, ResolveStrategy};

/// A structural change to the channel scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelChange {
    Created,
    Deleted,
    Renamed,
    /// Periodic rebuild; nothing specific was observed.
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Local documents were created or modified (absolute or root-relative).
    FilesChanged(Vec<PathBuf>),
    /// Local documents were removed. Logged only.
    FilesRemoved(Vec<PathBuf>),
    /// A push touched these root-relative documents; pull, then publish.
    RemotePush(Vec<PathBuf>),
    /// Publish every document under the root.
    RepublishAll,
    ChannelsChanged(ChannelChange),
    /// Webhook ping; no work.
    Ping,
}

/// Resolver for the configured `[channels]` strategy.
pub fn build_resolver(config: &Config) -> ChannelResolver {
    let strategy = match config.channels.strategy {
        ChannelStrategy::Derive => ResolveStrategy::Derive,
        ChannelStrategy::Mapping => ResolveStrategy::Mapping(config.channels.mapping.clone()),
    };
    ChannelResolver::new(strategy, config.channels.auto_create)
}

pub struct Relay {
    publisher: Publisher,
    docs: DocsConfig,
    filter: DocumentFilter,
    /// Working tree to pull on remote pushes; `None` skips the pull.
    repo_dir: Option<PathBuf>,
}

impl Relay {
    pub fn new(publisher: Publisher, docs: DocsConfig) -> Result<Self> {
        let filter = DocumentFilter::new(&docs)?;
        Ok(Self {
            publisher,
            docs,
            filter,
            repo_dir: None,
        })
    }

    pub fn with_repo_dir(mut self, repo_dir: PathBuf) -> Self {
        self.repo_dir = Some(repo_dir);
        self
    }

    pub fn from_config(config: &Config, platform: Arc<dyn ChannelPlatform>) -> Result<Self> {
        let publisher = Publisher::new(
            platform,
            build_resolver(config),
            ChannelCache::new(config.channels.scope()),
            DeliveryOptions::from_config(&config.delivery),
        );
        Ok(Self::new(publisher, config.docs.clone())?.with_repo_dir(config.repo_dir()))
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn filter(&self) -> &DocumentFilter {
        &self.filter
    }

    /// Publish every tracked document under the root.
    pub async fn publish_all(&self) -> Result<(Vec<DeliveryReport>, BatchSummary)> {
        let docs = scan_documents(&self.docs)?;
        info!(documents = docs.len(), root = %self.docs.root.display(), "republishing all documents");
        Ok(self.publisher.publish_batch(&docs).await)
    }

    /// Publish the given documents; untracked or unreadable paths are
    /// skipped.
    pub async fn publish_paths(&self, paths: &[PathBuf]) -> (Vec<DeliveryReport>, BatchSummary) {
        let docs = read_documents(&self.filter, paths);
        self.publisher.publish_batch(&docs).await
    }

    /// Dispatch one event. Returns the batch summary when documents were
    /// published.
    pub async fn handle(&self, event: RelayEvent) -> Option<BatchSummary> {
        debug!(?event, "relay event");
        match event {
            RelayEvent::FilesChanged(paths) => Some(self.publish_paths(&paths).await.1),
            RelayEvent::FilesRemoved(paths) => {
                for path in paths {
                    info!(path = %path.display(), "document removed; channel content left as-is");
                }
                None
            }
            RelayEvent::RemotePush(paths) => self.handle_push(&paths).await,
            RelayEvent::RepublishAll => match self.publish_all().await {
                Ok((_, summary)) => Some(summary),
                Err(e) => {
                    error!(error = %format!("{:#}", e), "full republish failed");
                    None
                }
            },
            RelayEvent::ChannelsChanged(change) => {
                debug!(?change, "rebuilding channel index");
                if let Err(e) = self.publisher.refresh_channels().await {
                    warn!(error = %e, "channel index rebuild failed; will rebuild on next lookup");
                    self.publisher.invalidate_channels().await;
                }
                None
            }
            RelayEvent::Ping => {
                info!("webhook ping received");
                None
            }
        }
    }

    async fn handle_push(&self, paths: &[PathBuf]) -> Option<BatchSummary> {
        if paths.is_empty() {
            return None;
        }
        if let Some(repo_dir) = &self.repo_dir {
            if let Err(e) = git_pull(repo_dir).await {
                error!(error = %format!("{:#}", e), "git pull failed, skipping update cycle");
                return None;
            }
        }
        Some(self.publish_paths(paths).await.1)
    }

    /// Handle events until every sender is dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<RelayEvent>) {
        while let Some(event) = events.recv().await {
            if let Some(summary) = self.handle(event).await {
                info!("{}", summary);
            }
        }
        debug!("relay event channel closed");
    }
}

/// Send [`ChannelChange::Refresh`] every `interval` until the receiver
/// is gone. A zero interval disables the timer.
pub fn spawn_refresh_timer(
    events: mpsc::Sender<RelayEvent>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; the index is built lazily anyway.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if events
                .send(RelayEvent::ChannelsChanged(ChannelChange::Refresh))
                .await
                .is_err()
            {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliver::DeliveryMode;
    use crate::platform::ChannelScope;
    use crate::platform_memory::MemoryPlatform;
    use std::fs;
    use tempfile::TempDir;

    fn relay(platform: Arc<MemoryPlatform>, root: &std::path::Path) -> Relay {
        let publisher = Publisher::new(
            platform,
            ChannelResolver::new(ResolveStrategy::Derive, true),
            ChannelCache::new(ChannelScope::from_ids("g", None)),
            DeliveryOptions {
                mode: DeliveryMode::Full,
                chunk_length: 1900,
                message_delay: Duration::ZERO,
                concurrency: 2,
                embed_color: 0,
                source_url_base: None,
            },
        );
        Relay::new(
            publisher,
            DocsConfig {
                root: root.to_path_buf(),
                extension: "md".to_string(),
                include_globs: vec!["**/*.md".to_string()],
                exclude_globs: vec![],
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_files_changed_publishes_tracked_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("guide.md"), "# Guide\nHello").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        let platform = Arc::new(MemoryPlatform::new());
        let relay = relay(platform.clone(), tmp.path());

        let summary = relay
            .handle(RelayEvent::FilesChanged(vec![
                tmp.path().join("guide.md"),
                tmp.path().join("notes.txt"),
            ]))
            .await
            .unwrap();
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.total(), 1);
        assert_eq!(platform.channels_named("guide").len(), 1);
    }

    #[tokio::test]
    async fn test_republish_all_and_removal() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("specs")).unwrap();
        fs::write(tmp.path().join("a.md"), "# A\nalpha").unwrap();
        fs::write(tmp.path().join("specs/b.md"), "# B\nbeta").unwrap();
        let platform = Arc::new(MemoryPlatform::new());
        let relay = relay(platform.clone(), tmp.path());

        let summary = relay.handle(RelayEvent::RepublishAll).await.unwrap();
        assert_eq!(summary.delivered, 2);

        let sends = platform.calls().send;
        assert!(relay
            .handle(RelayEvent::FilesRemoved(vec![tmp.path().join("a.md")]))
            .await
            .is_none());
        assert_eq!(platform.calls().send, sends);
    }

    #[tokio::test]
    async fn test_channels_changed_rebuilds_index() {
        let tmp = TempDir::new().unwrap();
        let platform = Arc::new(MemoryPlatform::new());
        let relay = relay(platform.clone(), tmp.path());

        relay
            .handle(RelayEvent::ChannelsChanged(ChannelChange::Created))
            .await;
        relay
            .handle(RelayEvent::ChannelsChanged(ChannelChange::Deleted))
            .await;
        assert_eq!(platform.calls().list, 2);
        assert!(relay.publisher().cache().is_built().await);
    }

    #[tokio::test]
    async fn test_run_drains_events_until_closed() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "# A\nalpha").unwrap();
        let platform = Arc::new(MemoryPlatform::new());
        let relay = relay(platform.clone(), tmp.path());

        let (tx, rx) = mpsc::channel(8);
        tx.send(RelayEvent::Ping).await.unwrap();
        tx.send(RelayEvent::FilesChanged(vec![PathBuf::from("a.md")]))
            .await
            .unwrap();
        drop(tx);
        relay.run(rx).await;

        assert_eq!(platform.calls().send, 1);
    }

    #[tokio::test]
    async fn test_run_on_spawned_task() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "# A\nalpha").unwrap();
        fs::write(tmp.path().join("b.md"), "# B\nbeta").unwrap();
        let platform = Arc::new(MemoryPlatform::new());
        let relay = Arc::new(relay(platform.clone(), tmp.path()));

        let (tx, rx) = mpsc::channel(8);
        let task = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.run(rx).await })
        };
        tx.send(RelayEvent::RepublishAll).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(platform.calls().send, 2);
        assert_eq!(platform.channels_named("a").len(), 1);
        assert_eq!(platform.channels_named("b").len(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_timer() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(spawn_refresh_timer(tx, Duration::ZERO).is_none());
    }
}
