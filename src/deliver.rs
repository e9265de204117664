//! Delivery orchestrator: parse, segment, resolve, post.
//!
//! Two disciplines, selected by [`DeliveryMode`]:
//!
//! - **Full**: every chunk becomes its own message, posted strictly in order
//!   with a pause between messages. A failed message is counted and the
//!   remaining chunks are still attempted, unless the failure means the
//!   channel itself is gone. Nothing already posted is rolled back.
//! - **Summary**: one compact message per document. If the channel's most
//!   recent message was posted by the relay it is edited in place,
//!   otherwise a new message is posted, so repeated runs converge to one
//!   message.
//!
//! Deliveries into the same channel are serialized with a per-channel lock
//! held across the whole read-last → edit-or-send sequence (summary) or the
//! whole chunk sequence (full). Different channels proceed concurrently.
//!
//! Nothing here fails a batch: every document yields a [`DeliveryReport`],
//! and [`BatchSummary`] aggregates them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chunk::split_document;
use crate::config::DeliveryConfig;
use crate::models::{Chunk, ParsedDocument, SourceDocument};
use crate::parser::parse;
use crate::platform::{ChannelHandle, ChannelPlatform, PlatformError, PlatformResult};
use crate::render::{render_chunk, render_summary};
use crate::resolver::{ChannelCache, ChannelResolver, Resolution};
use crate::summary::build_summary;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// One message per chunk.
    #[default]
    Full,
    /// One continuously updated summary message per document.
    Summary,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    pub mode: DeliveryMode,
    /// Segmenter length limit.
    pub chunk_length: usize,
    /// Pause between consecutive messages in full mode.
    pub message_delay: Duration,
    /// Documents published concurrently by [`Publisher::publish_batch`].
    pub concurrency: usize,
    pub embed_color: u32,
    pub source_url_base: Option<String>,
}

impl DeliveryOptions {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            mode: config.mode,
            chunk_length: config.chunk_length(),
            message_delay: Duration::from_millis(config.message_delay_ms),
            concurrency: config.concurrency.max(1),
            embed_color: config.embed_color,
            source_url_base: config.source_url_base.clone(),
        }
    }
}

/// Per-document progress in full mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Parsed,
    Segmented { total: usize },
    Posting { index: usize, total: usize },
    Delivered,
    PartiallyDelivered,
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::PartiallyDelivered | Self::Failed
        )
    }

    fn finish(sent: usize, failed: usize) -> Self {
        match (sent, failed) {
            (_, 0) => Self::Delivered,
            (0, _) => Self::Failed,
            _ => Self::PartiallyDelivered,
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Segmented { total } => write!(f, "segmented ({} chunks)", total),
            Self::Posting { index, total } => write!(f, "posting {}/{}", index, total),
            Self::Delivered => write!(f, "delivered"),
            Self::PartiallyDelivered => write!(f, "partially delivered"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryAction {
    Edited,
    Posted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Blank document.
    Empty,
    /// No mapping rule covers the document.
    NoMapping,
    /// Target channel is absent and auto-create is off.
    ChannelNotFound(String),
    /// Target channel name sanitizes to nothing.
    InvalidChannelName(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty document"),
            Self::NoMapping => write!(f, "no channel mapping"),
            Self::ChannelNotFound(name) => write!(f, "channel '{}' not found", name),
            Self::InvalidChannelName(name) => write!(f, "invalid channel name '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// Full mode: terminal state plus per-message counts.
    Posted {
        state: DeliveryState,
        sent: usize,
        failed: usize,
    },
    Summary(SummaryAction),
    /// Resolution or summary delivery failed before anything was posted.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Document path relative to the root.
    pub document: String,
    pub channel: Option<String>,
    pub outcome: Outcome,
}

impl DeliveryReport {
    fn new(document: String, channel: Option<String>, outcome: Outcome) -> Self {
        Self {
            document,
            channel,
            outcome,
        }
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self
            .channel
            .as_deref()
            .map(|c| format!(" → #{}", c))
            .unwrap_or_default();
        match &self.outcome {
            Outcome::Skipped(reason) => write!(f, "{}: skipped ({})", self.document, reason),
            Outcome::Posted {
                state,
                sent,
                failed,
            } => {
                write!(f, "{}{}: {} ({} sent", self.document, target, state, sent)?;
                if *failed > 0 {
                    write!(f, ", {} failed", failed)?;
                }
                write!(f, ")")
            }
            Outcome::Summary(SummaryAction::Edited) => {
                write!(f, "{}{}: summary updated", self.document, target)
            }
            Outcome::Summary(SummaryAction::Posted) => {
                write!(f, "{}{}: summary posted", self.document, target)
            }
            Outcome::Failed(error) => write!(f, "{}{}: failed ({})", self.document, target, error),
        }
    }
}

/// Aggregate counts over a batch of [`DeliveryReport`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub delivered: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn record(&mut self, report: &DeliveryReport) {
        match &report.outcome {
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Summary(_) => self.delivered += 1,
            Outcome::Failed(_) => self.failed += 1,
            Outcome::Posted { state, .. } => match state {
                DeliveryState::Delivered => self.delivered += 1,
                DeliveryState::PartiallyDelivered => self.partial += 1,
                _ => self.failed += 1,
            },
        }
    }

    pub fn total(&self) -> usize {
        self.delivered + self.partial + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.partial + self.failed > 0
    }
}

impl<'a> FromIterator<&'a DeliveryReport> for BatchSummary {
    fn from_iter<I: IntoIterator<Item = &'a DeliveryReport>>(iter: I) -> Self {
        let mut summary = Self::default();
        for report in iter {
            summary.record(report);
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} delivered, {} partial, {} failed, {} skipped",
            self.delivered, self.partial, self.failed, self.skipped
        )
    }
}

/// What a publication would do, computed without touching the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPlan {
    pub document: String,
    pub channel: Option<String>,
    /// Messages that would be sent (always 1 in summary mode, 0 if empty).
    pub messages: usize,
}

/// Dry-run counterpart of [`Publisher::publish`].
pub fn plan(
    resolver: &ChannelResolver,
    options: &DeliveryOptions,
    doc: &SourceDocument,
) -> DocumentPlan {
    let messages = if doc.text.trim().is_empty() {
        0
    } else {
        match options.mode {
            DeliveryMode::Summary => 1,
            DeliveryMode::Full => {
                let parsed = parse(&doc.relative_str(), &doc.text);
                split_document(&doc.file_name(), &parsed.body, options.chunk_length).len()
            }
        }
    };
    DocumentPlan {
        document: doc.relative_str(),
        channel: resolver.target_name(&doc.relative_path),
        messages,
    }
}

/// Publishes documents into their resolved channels.
pub struct Publisher {
    platform: Arc<dyn ChannelPlatform>,
    resolver: ChannelResolver,
    cache: ChannelCache,
    options: DeliveryOptions,
    channel_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Publisher {
    pub fn new(
        platform: Arc<dyn ChannelPlatform>,
        resolver: ChannelResolver,
        cache: ChannelCache,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            platform,
            resolver,
            cache,
            options,
            channel_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn platform(&self) -> &dyn ChannelPlatform {
        self.platform.as_ref()
    }

    pub fn resolver(&self) -> &ChannelResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &ChannelCache {
        &self.cache
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    /// Full rebuild of the channel index. Returns the number of channels.
    pub async fn refresh_channels(&self) -> PlatformResult<usize> {
        Ok(self.cache.refresh(self.platform()).await?.len())
    }

    /// Drop the channel index so the next resolution rebuilds it.
    pub async fn invalidate_channels(&self) {
        self.cache.invalidate().await;
    }

    async fn channel_lock(&self, channel_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.channel_locks.lock().await;
        Arc::clone(locks.entry(channel_id.to_string()).or_default())
    }

    /// Publish one document. Never fails; the report carries the outcome.
    pub async fn publish(&self, doc: &SourceDocument) -> DeliveryReport {
        let document = doc.relative_str();

        if doc.text.trim().is_empty() {
            debug!(document = %document, "skipping empty document");
            return DeliveryReport::new(document, None, Outcome::Skipped(SkipReason::Empty));
        }

        let parsed = parse(&document, &doc.text);
        debug!(document = %document, state = %DeliveryState::Parsed, title = %parsed.title);

        let resolution = self
            .resolver
            .resolve(&self.cache, self.platform(), &doc.relative_path)
            .await;
        let channel = match resolution {
            Ok(Resolution::Found(channel)) | Ok(Resolution::Created(channel)) => channel,
            Ok(Resolution::NoMapping) => {
                warn!(document = %document, "no channel mapping, skipping");
                return DeliveryReport::new(
                    document,
                    None,
                    Outcome::Skipped(SkipReason::NoMapping),
                );
            }
            Ok(Resolution::NotFound(name)) => {
                warn!(document = %document, channel = %name, "channel not found, skipping");
                return DeliveryReport::new(
                    document,
                    Some(name.clone()),
                    Outcome::Skipped(SkipReason::ChannelNotFound(name)),
                );
            }
            Ok(Resolution::InvalidName(name)) => {
                warn!(document = %document, channel = %name, "invalid channel name, skipping");
                return DeliveryReport::new(
                    document,
                    None,
                    Outcome::Skipped(SkipReason::InvalidChannelName(name)),
                );
            }
            Err(e) => {
                error!(document = %document, error = %e, "channel resolution failed");
                return DeliveryReport::new(document, None, Outcome::Failed(e.to_string()));
            }
        };

        let lock = self.channel_lock(&channel.id).await;
        let _guard = lock.lock().await;

        let outcome = match self.options.mode {
            DeliveryMode::Full => self.post_full(doc, &parsed, &channel).await,
            DeliveryMode::Summary => self.post_summary(doc, &parsed, &channel).await,
        };
        let report = DeliveryReport::new(document, Some(channel.name), outcome);
        info!("{}", report);
        report
    }

    async fn post_full(
        &self,
        doc: &SourceDocument,
        parsed: &ParsedDocument,
        channel: &ChannelHandle,
    ) -> Outcome {
        let chunks: Vec<Chunk> =
            split_document(&doc.file_name(), &parsed.body, self.options.chunk_length);
        let total = chunks.len();
        debug!(document = %doc.relative_str(), state = %DeliveryState::Segmented { total });

        let mut sent = 0;
        let mut failed = 0;

        for chunk in &chunks {
            let state = DeliveryState::Posting {
                index: chunk.index,
                total,
            };
            debug!(document = %doc.relative_str(), channel = %channel.name, state = %state);

            let message = render_chunk(parsed, chunk, self.options.embed_color, doc.modified);
            match self.platform.send_message(channel, &message).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    failed += 1;
                    error!(
                        document = %doc.relative_str(),
                        channel = %channel.name,
                        part = chunk.index,
                        total,
                        error = %e,
                        "failed to send chunk"
                    );
                    if e.is_channel_fatal() {
                        failed += total - chunk.index;
                        break;
                    }
                }
            }

            if chunk.index < total && !self.options.message_delay.is_zero() {
                tokio::time::sleep(self.options.message_delay).await;
            }
        }

        Outcome::Posted {
            state: DeliveryState::finish(sent, failed),
            sent,
            failed,
        }
    }

    async fn post_summary(
        &self,
        doc: &SourceDocument,
        parsed: &ParsedDocument,
        channel: &ChannelHandle,
    ) -> Outcome {
        let summary = build_summary(parsed, doc, self.options.source_url_base.as_deref());
        let message = render_summary(&summary, self.options.embed_color);

        let result = async {
            let last = self.platform.fetch_last_message(channel).await?;
            if let Some(last) = last.filter(|m| m.authored_by_self) {
                match self.platform.edit_message(channel, &last.id, &message).await {
                    Ok(()) => return Ok(SummaryAction::Edited),
                    Err(PlatformError::NotFound(_)) => {
                        debug!(
                            channel = %channel.name,
                            message = %last.id,
                            "summary vanished, posting anew"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            self.platform.send_message(channel, &message).await?;
            Ok::<_, PlatformError>(SummaryAction::Posted)
        }
        .await;

        match result {
            Ok(action) => Outcome::Summary(action),
            Err(e) => {
                error!(
                    document = %doc.relative_str(),
                    channel = %channel.name,
                    error = %e,
                    "failed to deliver summary"
                );
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Publish documents concurrently (up to `concurrency` at a time).
    ///
    /// Reports come back sorted by document path.
    pub async fn publish_batch(
        &self,
        docs: &[SourceDocument],
    ) -> (Vec<DeliveryReport>, BatchSummary) {
        // Documents are cloned into the stream; the batch future must stay
        // `Send` for relays running on a spawned task.
        let mut reports: Vec<DeliveryReport> = stream::iter(docs.iter().cloned())
            .map(|doc| async move { self.publish(&doc).await })
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;
        reports.sort_by(|a, b| a.document.cmp(&b.document));

        let summary: BatchSummary = reports.iter().collect();
        info!(documents = docs.len(), "{}", summary);
        (reports, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelMapping;
    use crate::platform::ChannelScope;
    use crate::platform_memory::MemoryPlatform;
    use crate::resolver::ResolveStrategy;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::time::Instant;

    fn doc(rel: &str, text: &str) -> SourceDocument {
        SourceDocument {
            path: PathBuf::from("/docs").join(rel),
            relative_path: PathBuf::from(rel),
            text: text.to_string(),
            modified: Utc::now(),
        }
    }

    fn options(mode: DeliveryMode) -> DeliveryOptions {
        DeliveryOptions {
            mode,
            chunk_length: 100,
            message_delay: Duration::ZERO,
            concurrency: 4,
            embed_color: 0x5865F2,
            source_url_base: None,
        }
    }

    fn publisher(
        platform: Arc<MemoryPlatform>,
        strategy: ResolveStrategy,
        auto_create: bool,
        options: DeliveryOptions,
    ) -> Publisher {
        Publisher::new(
            platform,
            ChannelResolver::new(strategy, auto_create),
            ChannelCache::new(ChannelScope::from_ids("g", None)),
            options,
        )
    }

    fn long_text() -> String {
        let mut text = "# Long\n\n".to_string();
        for i in 0..6 {
            text.push_str(&format!(
                "Paragraph {} has enough words to fill most of a small chunk on its own.\n\n",
                i
            ));
        }
        text
    }

    #[tokio::test]
    async fn test_full_mode_posts_chunks_in_order() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel("long", None);
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Derive,
            false,
            options(DeliveryMode::Full),
        );

        let report = publisher.publish(&doc("long.md", &long_text())).await;
        let Outcome::Posted { state, sent, failed } = report.outcome else {
            panic!("unexpected outcome {:?}", report.outcome);
        };
        assert_eq!(state, DeliveryState::Delivered);
        assert!(sent > 1);
        assert_eq!(failed, 0);

        let messages = platform.messages(&channel.id);
        assert_eq!(messages.len(), sent);
        for (i, message) in messages.iter().enumerate() {
            let footer = &message.body.embeds[0].footer.as_ref().unwrap().text;
            assert!(footer.ends_with(&format!("Part {}/{}", i + 1, sent)));
        }
    }

    #[tokio::test]
    async fn test_full_mode_partial_failure_is_reported() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel("long", None);
        platform.fail_send(
            2,
            PlatformError::RateLimited {
                retry_after_secs: 2.0,
            },
        );
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Derive,
            false,
            options(DeliveryMode::Full),
        );

        let report = publisher.publish(&doc("long.md", &long_text())).await;
        let Outcome::Posted { state, sent, failed } = report.outcome else {
            panic!("unexpected outcome {:?}", report.outcome);
        };
        assert_eq!(state, DeliveryState::PartiallyDelivered);
        assert_eq!(failed, 1);
        assert_eq!(platform.messages(&channel.id).len(), sent);
    }

    #[tokio::test]
    async fn test_full_mode_stops_on_channel_fatal_error() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_channel("long", None);
        platform.fail_send(1, PlatformError::NotFound("unknown channel".to_string()));
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Derive,
            false,
            options(DeliveryMode::Full),
        );

        let report = publisher.publish(&doc("long.md", &long_text())).await;
        let Outcome::Posted { state, sent, failed } = report.outcome else {
            panic!("unexpected outcome {:?}", report.outcome);
        };
        assert_eq!(state, DeliveryState::Failed);
        assert_eq!(sent, 0);
        assert!(failed > 1);
        assert_eq!(platform.calls().send, 1);
    }

    #[tokio::test]
    async fn test_full_mode_continues_after_permission_error() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel("long", None);
        platform.fail_send(1, PlatformError::PermissionDenied("missing access".to_string()));
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Derive,
            false,
            options(DeliveryMode::Full),
        );

        let report = publisher.publish(&doc("long.md", &long_text())).await;
        let Outcome::Posted { state, sent, failed } = report.outcome else {
            panic!("unexpected outcome {:?}", report.outcome);
        };
        assert_eq!(state, DeliveryState::PartiallyDelivered);
        assert_eq!(failed, 1);
        assert!(sent > 0);
        assert_eq!(platform.calls().send, sent + 1);
        assert_eq!(platform.messages(&channel.id).len(), sent);
    }

    #[tokio::test]
    async fn test_republish_reuses_channel_for_spaced_mapping_value() {
        let platform = Arc::new(MemoryPlatform::new());
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Mapping(ChannelMapping::new([("root", "Project Docs")])),
            true,
            options(DeliveryMode::Full),
        );
        let a = doc("a.md", "# A\nalpha");

        for _ in 0..2 {
            let report = publisher.publish(&a).await;
            assert_eq!(report.channel.as_deref(), Some("project-docs"));
            assert!(
                matches!(report.outcome, Outcome::Posted { state: DeliveryState::Delivered, .. }),
                "unexpected outcome {:?}",
                report.outcome
            );
        }
        assert_eq!(platform.calls().create, 1);
        assert_eq!(platform.channels_named("project-docs").len(), 1);
    }

    #[tokio::test]
    async fn test_full_mode_paces_messages() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_channel("long", None);
        let mut opts = options(DeliveryMode::Full);
        opts.message_delay = Duration::from_millis(20);
        let publisher = publisher(platform.clone(), ResolveStrategy::Derive, false, opts);

        let started = Instant::now();
        let report = publisher.publish(&doc("long.md", &long_text())).await;
        let Outcome::Posted { sent, .. } = report.outcome else {
            panic!("unexpected outcome {:?}", report.outcome);
        };
        assert!(started.elapsed() >= Duration::from_millis(20) * (sent as u32 - 1));
    }

    #[tokio::test]
    async fn test_summary_mode_is_idempotent() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel("guide", None);
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Derive,
            false,
            options(DeliveryMode::Summary),
        );
        let guide = doc("guide.md", "# Guide\nIntro.\n## Setup\nsteps");

        let first = publisher.publish(&guide).await;
        assert_eq!(first.outcome, Outcome::Summary(SummaryAction::Posted));
        let before = platform.calls();

        let second = publisher.publish(&guide).await;
        assert_eq!(second.outcome, Outcome::Summary(SummaryAction::Edited));
        let after = platform.calls();
        assert_eq!(after.edit - before.edit, 1);
        assert_eq!(after.send - before.send, 0);
        assert_eq!(after.create - before.create, 0);
        assert_eq!(platform.messages(&channel.id).len(), 1);
    }

    #[tokio::test]
    async fn test_summary_mode_posts_after_foreign_message() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel("guide", None);
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Derive,
            false,
            options(DeliveryMode::Summary),
        );
        let guide = doc("guide.md", "# Guide\nIntro.");

        publisher.publish(&guide).await;
        platform.post_foreign(&channel.id, Default::default());
        let report = publisher.publish(&guide).await;

        assert_eq!(report.outcome, Outcome::Summary(SummaryAction::Posted));
        assert_eq!(platform.calls().edit, 0);
        assert_eq!(platform.messages(&channel.id).len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_summaries_into_one_channel_do_not_duplicate() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel("documentation", None);
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Mapping(ChannelMapping::new([("root", "documentation")])),
            false,
            options(DeliveryMode::Summary),
        );
        let docs: Vec<_> = (0..6)
            .map(|i| doc(&format!("doc{}.md", i), "# Doc\nBody."))
            .collect();

        let (_, summary) = publisher.publish_batch(&docs).await;
        assert_eq!(summary.delivered, 6);
        assert_eq!(platform.messages(&channel.id).len(), 1);
        assert_eq!(platform.calls().send, 1);
        assert_eq!(platform.calls().edit, 5);
    }

    #[tokio::test]
    async fn test_batch_continues_past_skips_and_creates_once() {
        let platform = Arc::new(MemoryPlatform::new());
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Mapping(ChannelMapping::new([("specs", "specifications")])),
            true,
            options(DeliveryMode::Full),
        );
        let docs = vec![
            doc("specs/a.md", "# A\nalpha"),
            doc("specs/b.md", "# B\nbeta"),
            doc("notes/c.md", "# C\ngamma"),
            doc("specs/empty.md", "  \n"),
        ];

        let (reports, summary) = publisher.publish_batch(&docs).await;
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.has_failures());
        assert_eq!(platform.calls().create, 1);
        assert_eq!(reports[0].document, "notes/c.md");
        assert_eq!(reports[0].outcome, Outcome::Skipped(SkipReason::NoMapping));
    }

    #[tokio::test]
    async fn test_missing_channel_is_skipped() {
        let platform = Arc::new(MemoryPlatform::new());
        let publisher = publisher(
            platform.clone(),
            ResolveStrategy::Derive,
            false,
            options(DeliveryMode::Full),
        );
        let report = publisher.publish(&doc("API.md", "# API\n")).await;
        assert_eq!(
            report.outcome,
            Outcome::Skipped(SkipReason::ChannelNotFound("api".to_string()))
        );
        assert_eq!(platform.calls().send, 0);
    }

    #[test]
    fn test_plan_counts_messages() {
        let resolver = ChannelResolver::new(ResolveStrategy::Derive, false);
        let full = plan(&resolver, &options(DeliveryMode::Full), &doc("Long_Doc.md", &long_text()));
        assert_eq!(full.channel.as_deref(), Some("long-doc"));
        assert!(full.messages > 1);

        let summary = plan(
            &resolver,
            &options(DeliveryMode::Summary),
            &doc("Long_Doc.md", &long_text()),
        );
        assert_eq!(summary.messages, 1);
    }

    #[test]
    fn test_state_from_counts() {
        assert_eq!(DeliveryState::finish(3, 0), DeliveryState::Delivered);
        assert_eq!(DeliveryState::finish(0, 3), DeliveryState::Failed);
        assert_eq!(DeliveryState::finish(2, 1), DeliveryState::PartiallyDelivered);
        assert!(DeliveryState::Failed.is_terminal());
        assert!(!DeliveryState::Posting { index: 1, total: 2 }.is_terminal());
    }
}
