//! In-memory [`ChannelPlatform`] implementation for tests and embedders.
//!
//! Channels and messages live behind a `std::sync::Mutex`. Every capability
//! call is counted so callers can assert on traffic (e.g. "one edit, zero
//! creates"). Failures and create races can be scripted ahead of time.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::platform::{
    ChannelHandle, ChannelPlatform, ChannelScope, MessageRecord, PlatformError, PlatformResult,
};
use crate::render::RenderedMessage;

/// Number of calls made to each capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub create: usize,
    pub send: usize,
    pub fetch_last: usize,
    pub edit: usize,
}

/// A message held by the in-memory platform.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub authored_by_self: bool,
    pub body: RenderedMessage,
    /// Times the message was edited after posting.
    pub edits: usize,
}

struct StoredChannel {
    handle: ChannelHandle,
    parent_id: Option<String>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    channels: Vec<StoredChannel>,
    messages: HashMap<String, Vec<StoredMessage>>,
    calls: CallCounts,
    /// Send attempt number (1-based, across all channels) → error to return.
    send_failures: HashMap<usize, PlatformError>,
    /// Names whose next create loses a race against another actor.
    create_races: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{}", 1000 + self.next_id)
    }

    fn insert_channel(&mut self, name: &str, parent_id: Option<&str>) -> ChannelHandle {
        let handle = ChannelHandle {
            id: self.next_id(),
            name: name.to_string(),
        };
        self.channels.push(StoredChannel {
            handle: handle.clone(),
            parent_id: parent_id.map(str::to_string),
        });
        handle
    }

    fn has_channel(&self, id: &str) -> bool {
        self.channels.iter().any(|c| c.handle.id == id)
    }
}

/// Channel platform kept entirely in memory.
#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an existing channel, as if created by someone else.
    pub fn add_channel(&self, name: &str, parent_id: Option<&str>) -> ChannelHandle {
        self.state().insert_channel(name, parent_id)
    }

    pub fn remove_channel(&self, id: &str) {
        let mut state = self.state();
        state.channels.retain(|c| c.handle.id != id);
        state.messages.remove(id);
    }

    /// Post a message authored by another actor.
    pub fn post_foreign(&self, channel_id: &str, body: RenderedMessage) -> String {
        let mut state = self.state();
        let id = state.next_id();
        state
            .messages
            .entry(channel_id.to_string())
            .or_default()
            .push(StoredMessage {
                id: id.clone(),
                authored_by_self: false,
                body,
                edits: 0,
            });
        id
    }

    /// Make the `attempt`-th send call (1-based) fail with `error`.
    pub fn fail_send(&self, attempt: usize, error: PlatformError) {
        self.state().send_failures.insert(attempt, error);
    }

    /// The next create of `name` finds the channel already created by
    /// another actor and fails with [`PlatformError::AlreadyExists`].
    pub fn race_create(&self, name: &str) {
        self.state().create_races.push(name.to_string());
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn messages(&self, channel_id: &str) -> Vec<StoredMessage> {
        self.state()
            .messages
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Channel handles named `name`, in creation order.
    pub fn channels_named(&self, name: &str) -> Vec<ChannelHandle> {
        self.state()
            .channels
            .iter()
            .filter(|c| c.handle.name == name)
            .map(|c| c.handle.clone())
            .collect()
    }
}

fn in_scope(channel: &StoredChannel, scope: &ChannelScope) -> bool {
    match scope.parent_id() {
        Some(parent) => channel.parent_id.as_deref() == Some(parent),
        None => true,
    }
}

#[async_trait]
impl ChannelPlatform for MemoryPlatform {
    async fn list_channels(&self, scope: &ChannelScope) -> PlatformResult<Vec<ChannelHandle>> {
        let mut state = self.state();
        state.calls.list += 1;
        Ok(state
            .channels
            .iter()
            .filter(|c| in_scope(c, scope))
            .map(|c| c.handle.clone())
            .collect())
    }

    async fn create_channel(
        &self,
        scope: &ChannelScope,
        name: &str,
    ) -> PlatformResult<ChannelHandle> {
        let mut state = self.state();
        state.calls.create += 1;

        if let Some(pos) = state.create_races.iter().position(|n| n == name) {
            state.create_races.remove(pos);
            state.insert_channel(name, scope.parent_id());
            return Err(PlatformError::AlreadyExists(name.to_string()));
        }

        let exists = state
            .channels
            .iter()
            .any(|c| in_scope(c, scope) && c.handle.name == name);
        if exists {
            return Err(PlatformError::AlreadyExists(name.to_string()));
        }

        Ok(state.insert_channel(name, scope.parent_id()))
    }

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        message: &RenderedMessage,
    ) -> PlatformResult<MessageRecord> {
        let mut state = self.state();
        state.calls.send += 1;

        let attempt = state.calls.send;
        if let Some(err) = state.send_failures.remove(&attempt) {
            return Err(err);
        }
        if !state.has_channel(&channel.id) {
            return Err(PlatformError::NotFound(format!("channel {}", channel.id)));
        }

        let id = state.next_id();
        state
            .messages
            .entry(channel.id.clone())
            .or_default()
            .push(StoredMessage {
                id: id.clone(),
                authored_by_self: true,
                body: message.clone(),
                edits: 0,
            });
        Ok(MessageRecord {
            id,
            authored_by_self: true,
        })
    }

    async fn fetch_last_message(
        &self,
        channel: &ChannelHandle,
    ) -> PlatformResult<Option<MessageRecord>> {
        let mut state = self.state();
        state.calls.fetch_last += 1;

        if !state.has_channel(&channel.id) {
            return Err(PlatformError::NotFound(format!("channel {}", channel.id)));
        }
        Ok(state
            .messages
            .get(&channel.id)
            .and_then(|msgs| msgs.last())
            .map(|m| MessageRecord {
                id: m.id.clone(),
                authored_by_self: m.authored_by_self,
            }))
    }

    async fn edit_message(
        &self,
        channel: &ChannelHandle,
        message_id: &str,
        message: &RenderedMessage,
    ) -> PlatformResult<()> {
        let mut state = self.state();
        state.calls.edit += 1;

        let stored = state
            .messages
            .get_mut(&channel.id)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| PlatformError::NotFound(format!("message {}", message_id)))?;
        if !stored.authored_by_self {
            return Err(PlatformError::PermissionDenied(format!(
                "message {} was not authored by this bot",
                message_id
            )));
        }
        stored.body = message.clone();
        stored.edits += 1;
        Ok(())
    }
}
