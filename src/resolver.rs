//! Channel lookup: cached name index plus optional auto-create.
//!
//! # Index lifecycle
//!
//! A [`ChannelIndex`] maps normalized channel names (lowercase, `-`/`_`
//! stripped) to handles. It is built by enumerating the scope's channels and
//! is never patched in place: [`ChannelCache::refresh`] builds a fresh index
//! and swaps the `Arc` under a write lock, so readers see either the old or
//! the new index, never a half-built one.
//!
//! The cache is built lazily on first lookup and rebuilt whenever the caller
//! reports a structural change to the scope ([`ChannelCache::invalidate`])
//! or the resolver creates a channel itself.
//!
//! # Resolution
//!
//! [`ChannelResolver::resolve`] turns a document path into a target name
//! (derived from the file name or mapped from the path), probes the index,
//! and on a miss either reports [`Resolution::NotFound`] or creates the
//! channel. A create that fails because another actor got there first is
//! answered by refreshing and probing again.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::channel::{
    derive_channel_name, normalize_channel_name, sanitize_channel_name, ChannelMapping,
};
use crate::platform::{ChannelHandle, ChannelPlatform, ChannelScope, PlatformResult};

/// Normalized channel name → handle, for one scope.
#[derive(Debug, Default)]
pub struct ChannelIndex {
    by_name: HashMap<String, ChannelHandle>,
}

impl ChannelIndex {
    /// Enumerate `scope` and index every channel by normalized name.
    pub async fn build(
        platform: &dyn ChannelPlatform,
        scope: &ChannelScope,
    ) -> PlatformResult<Self> {
        let channels = platform.list_channels(scope).await?;
        Ok(Self::from_channels(channels))
    }

    /// When two channels normalize to the same key the first one listed wins.
    pub fn from_channels(channels: impl IntoIterator<Item = ChannelHandle>) -> Self {
        let mut by_name = HashMap::new();
        for channel in channels {
            by_name
                .entry(normalize_channel_name(&channel.name))
                .or_insert(channel);
        }
        Self { by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<&ChannelHandle> {
        self.by_name.get(&normalize_channel_name(name))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Indexed channels sorted by name.
    pub fn channels(&self) -> Vec<&ChannelHandle> {
        let mut channels: Vec<_> = self.by_name.values().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }
}

/// Owned, shared cache of the [`ChannelIndex`] for one scope.
pub struct ChannelCache {
    scope: ChannelScope,
    current: RwLock<Option<Arc<ChannelIndex>>>,
}

impl ChannelCache {
    pub fn new(scope: ChannelScope) -> Self {
        Self {
            scope,
            current: RwLock::new(None),
        }
    }

    pub fn scope(&self) -> &ChannelScope {
        &self.scope
    }

    /// Full rebuild, then atomic replacement of the current index.
    pub async fn refresh(
        &self,
        platform: &dyn ChannelPlatform,
    ) -> PlatformResult<Arc<ChannelIndex>> {
        let index = Arc::new(ChannelIndex::build(platform, &self.scope).await?);
        debug!(scope = %self.scope, channels = index.len(), "channel index rebuilt");
        *self.current.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Current index, building it on first use.
    pub async fn snapshot(
        &self,
        platform: &dyn ChannelPlatform,
    ) -> PlatformResult<Arc<ChannelIndex>> {
        if let Some(index) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }
        self.refresh(platform).await
    }

    pub async fn lookup(
        &self,
        platform: &dyn ChannelPlatform,
        name: &str,
    ) -> PlatformResult<Option<ChannelHandle>> {
        let index = self.snapshot(platform).await?;
        Ok(index.lookup(name).cloned())
    }

    /// Drop the current index; the next lookup rebuilds it.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    pub async fn is_built(&self) -> bool {
        self.current.read().await.is_some()
    }
}

/// How a document path becomes a channel name.
#[derive(Debug, Clone)]
pub enum ResolveStrategy {
    /// Channel name derived from the file name.
    Derive,
    /// Longest-prefix match against a path → channel table.
    Mapping(ChannelMapping),
}

/// Outcome of resolving a document to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ChannelHandle),
    Created(ChannelHandle),
    /// No mapping rule covers the document.
    NoMapping,
    /// Target channel is absent and auto-create is off.
    NotFound(String),
    /// Target name is empty after sanitizing.
    InvalidName(String),
}

impl Resolution {
    pub fn channel(&self) -> Option<&ChannelHandle> {
        match self {
            Self::Found(channel) | Self::Created(channel) => Some(channel),
            _ => None,
        }
    }
}

pub struct ChannelResolver {
    strategy: ResolveStrategy,
    auto_create: bool,
    /// Serializes the probe → create → refresh sequence.
    create_lock: Mutex<()>,
}

impl ChannelResolver {
    pub fn new(strategy: ResolveStrategy, auto_create: bool) -> Self {
        Self {
            strategy,
            auto_create,
            create_lock: Mutex::new(()),
        }
    }

    pub fn strategy(&self) -> &ResolveStrategy {
        &self.strategy
    }

    /// Target channel name for a path relative to the document root.
    pub fn target_name(&self, relative_path: &Path) -> Option<String> {
        match &self.strategy {
            ResolveStrategy::Derive => {
                let file_name = relative_path.file_name()?.to_string_lossy();
                Some(derive_channel_name(&file_name))
            }
            ResolveStrategy::Mapping(mapping) => mapping.resolve(relative_path).map(str::to_string),
        }
    }

    pub async fn resolve(
        &self,
        cache: &ChannelCache,
        platform: &dyn ChannelPlatform,
        relative_path: &Path,
    ) -> PlatformResult<Resolution> {
        match self.target_name(relative_path) {
            Some(name) => self.lookup_or_create(cache, platform, &name).await,
            None => Ok(Resolution::NoMapping),
        }
    }

    /// Probe the index for `name`; create the channel on a miss when
    /// auto-create is enabled.
    ///
    /// `name` is sanitized first, so probes and creates agree on the same
    /// channel name whatever the mapping value looks like.
    pub async fn lookup_or_create(
        &self,
        cache: &ChannelCache,
        platform: &dyn ChannelPlatform,
        name: &str,
    ) -> PlatformResult<Resolution> {
        let target = sanitize_channel_name(name);
        if target.is_empty() {
            return Ok(Resolution::InvalidName(name.to_string()));
        }

        if let Some(channel) = cache.lookup(platform, &target).await? {
            return Ok(Resolution::Found(channel));
        }
        if !self.auto_create {
            return Ok(Resolution::NotFound(target));
        }

        let _guard = self.create_lock.lock().await;

        // Another task may have created it while we waited.
        if let Some(channel) = cache.lookup(platform, &target).await? {
            return Ok(Resolution::Found(channel));
        }

        match platform.create_channel(cache.scope(), &target).await {
            Ok(channel) => {
                info!(channel = %channel.name, id = %channel.id, "created channel");
                if let Err(e) = cache.refresh(platform).await {
                    warn!(error = %e, "channel index refresh after create failed");
                    cache.invalidate().await;
                }
                Ok(Resolution::Created(channel))
            }
            Err(e) => {
                warn!(channel = %target, error = %e, "channel create failed, re-probing");
                let index = cache.refresh(platform).await?;
                match index.lookup(&target) {
                    Some(channel) => Ok(Resolution::Found(channel.clone())),
                    None => Err(e),
                }
            }
        }
    }
}
