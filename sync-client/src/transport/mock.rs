//! Mock transports for testing.
//!
//! [`MockChangeStream`] captures subscriptions and lets tests emit change
//! events. [`MockPresenceHub`] is an in-memory presence table shared by any
//! number of participants; every join, track and leave broadcasts a full sync
//! to every member of the affected channel.
//!
//! Handlers are always invoked after the internal lock is released, so a
//! handler may call back into the mock.

use super::{
    ChangeHandler, ChangeStream, ChannelHandle, PresenceTransport, SubscriptionHandle, SyncHandler,
    TransportError,
};
use crate::lock::mutex_lock;
use async_trait::async_trait;
use chatsync_types::{ChangeEvent, EventMask, PresenceRecord, PresenceState, Table, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const SOURCE: &str = "transport::mock";

// ===========================================
// Change Stream
// ===========================================

/// Mock change-stream transport.
///
/// Cloning shares state, so a test can keep one clone and hand another to
/// the code under test.
#[derive(Clone, Default)]
pub struct MockChangeStream {
    inner: Arc<Mutex<MockChangeStreamInner>>,
}

#[derive(Default)]
struct MockChangeStreamInner {
    subscriptions: Vec<MockSubscription>,
    subscribe_calls: usize,
    fail_next_subscribe: Option<String>,
    fail_next_unsubscribe: Option<String>,
}

struct MockSubscription {
    handle: SubscriptionHandle,
    tables: Vec<Table>,
    mask: EventMask,
    handler: ChangeHandler,
}

impl MockSubscription {
    fn accepts(&self, event: &ChangeEvent) -> bool {
        self.tables.contains(&event.table()) && self.mask.contains(event.operation())
    }
}

impl std::fmt::Debug for MockChangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = mutex_lock(&self.inner, SOURCE, "debug");
        f.debug_struct("MockChangeStream")
            .field("active", &inner.subscriptions.len())
            .field("subscribe_calls", &inner.subscribe_calls)
            .finish()
    }
}

impl MockChangeStream {
    /// Create a new mock change stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every matching subscription.
    ///
    /// Returns how many handlers received it.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        let handlers: Vec<ChangeHandler> = {
            let inner = mutex_lock(&self.inner, SOURCE, "emit");
            inner
                .subscriptions
                .iter()
                .filter(|s| s.accepts(&event))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };
        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }

    /// Names of live subscriptions, in creation order.
    pub fn active_subscriptions(&self) -> Vec<String> {
        let inner = mutex_lock(&self.inner, SOURCE, "active_subscriptions");
        inner
            .subscriptions
            .iter()
            .map(|s| s.handle.name().to_string())
            .collect()
    }

    /// Total number of `subscribe()` calls, successful or not.
    pub fn subscribe_calls(&self) -> usize {
        mutex_lock(&self.inner, SOURCE, "subscribe_calls").subscribe_calls
    }

    /// Cause the next subscribe() to fail with the given error.
    pub fn fail_next_subscribe(&self, error: &str) {
        mutex_lock(&self.inner, SOURCE, "fail_next_subscribe").fail_next_subscribe =
            Some(error.to_string());
    }

    /// Cause the next unsubscribe() to fail with the given error.
    pub fn fail_next_unsubscribe(&self, error: &str) {
        mutex_lock(&self.inner, SOURCE, "fail_next_unsubscribe").fail_next_unsubscribe =
            Some(error.to_string());
    }

    /// Clear all state (subscriptions, counters, forced failures).
    pub fn reset(&self) {
        *mutex_lock(&self.inner, SOURCE, "reset") = MockChangeStreamInner::default();
    }
}

#[async_trait]
impl ChangeStream for MockChangeStream {
    async fn subscribe(
        &self,
        name: &str,
        tables: &[Table],
        mask: EventMask,
        handler: ChangeHandler,
    ) -> Result<SubscriptionHandle, TransportError> {
        let mut inner = mutex_lock(&self.inner, SOURCE, "subscribe");
        inner.subscribe_calls += 1;

        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(TransportError::SubscribeFailed(error));
        }

        // Names are unique on the transport: re-subscribing replaces.
        inner.subscriptions.retain(|s| s.handle.name() != name);

        let handle = SubscriptionHandle::new(name);
        inner.subscriptions.push(MockSubscription {
            handle: handle.clone(),
            tables: tables.to_vec(),
            mask,
            handler,
        });
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        let mut inner = mutex_lock(&self.inner, SOURCE, "unsubscribe");

        if let Some(error) = inner.fail_next_unsubscribe.take() {
            return Err(TransportError::UnsubscribeFailed(error));
        }

        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.handle.id() != handle.id());
        if inner.subscriptions.len() == before {
            return Err(TransportError::UnknownSubscription(
                handle.name().to_string(),
            ));
        }
        Ok(())
    }
}

// ===========================================
// Presence Hub
// ===========================================

/// In-memory presence transport shared by many participants.
#[derive(Clone, Default)]
pub struct MockPresenceHub {
    inner: Arc<Mutex<MockPresenceHubInner>>,
}

#[derive(Default)]
struct MockPresenceHubInner {
    channels: HashMap<String, Vec<Member>>,
    published: Vec<PresenceRecord>,
    join_calls: usize,
    fail_next_join: Option<String>,
    fail_next_track: Option<String>,
    fail_next_leave: Option<String>,
}

struct Member {
    handle: ChannelHandle,
    on_sync: SyncHandler,
    record: Option<PresenceRecord>,
}

impl std::fmt::Debug for MockPresenceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = mutex_lock(&self.inner, SOURCE, "debug");
        f.debug_struct("MockPresenceHub")
            .field("channels", &inner.channels.len())
            .field("published", &inner.published.len())
            .finish()
    }
}

impl MockPresenceHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members currently joined to `channel`.
    pub fn member_count(&self, channel: &str) -> usize {
        let inner = mutex_lock(&self.inner, SOURCE, "member_count");
        inner.channels.get(channel).map_or(0, Vec::len)
    }

    /// Names of channels with at least one member, sorted.
    pub fn active_channels(&self) -> Vec<String> {
        let inner = mutex_lock(&self.inner, SOURCE, "active_channels");
        let mut names: Vec<String> = inner
            .channels
            .iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every record successfully tracked, in publish order.
    pub fn published(&self) -> Vec<PresenceRecord> {
        mutex_lock(&self.inner, SOURCE, "published")
            .published
            .clone()
    }

    /// Total number of `join_channel()` calls, successful or not.
    pub fn join_calls(&self) -> usize {
        mutex_lock(&self.inner, SOURCE, "join_calls").join_calls
    }

    /// Current presence table of `channel`.
    pub fn state(&self, channel: &str) -> PresenceState {
        let inner = mutex_lock(&self.inner, SOURCE, "state");
        state_of(members_of(&inner, channel))
    }

    /// Cause the next join_channel() to fail with the given error.
    pub fn fail_next_join(&self, error: &str) {
        mutex_lock(&self.inner, SOURCE, "fail_next_join").fail_next_join = Some(error.to_string());
    }

    /// Cause the next track() to fail with the given error.
    pub fn fail_next_track(&self, error: &str) {
        mutex_lock(&self.inner, SOURCE, "fail_next_track").fail_next_track =
            Some(error.to_string());
    }

    /// Cause the next leave_channel() to fail with the given error.
    pub fn fail_next_leave(&self, error: &str) {
        mutex_lock(&self.inner, SOURCE, "fail_next_leave").fail_next_leave =
            Some(error.to_string());
    }

    /// Snapshot a channel and collect its members' handlers.
    fn sync_targets(
        inner: &MockPresenceHubInner,
        channel: &str,
    ) -> (PresenceState, Vec<SyncHandler>) {
        let members = members_of(inner, channel);
        let handlers = members.iter().map(|m| Arc::clone(&m.on_sync)).collect();
        (state_of(members), handlers)
    }

    fn broadcast(state: PresenceState, handlers: Vec<SyncHandler>) {
        for handler in handlers {
            handler(state.clone());
        }
    }
}

fn members_of<'a>(inner: &'a MockPresenceHubInner, channel: &str) -> &'a [Member] {
    inner
        .channels
        .get(channel)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn state_of(members: &[Member]) -> PresenceState {
    members.iter().filter_map(|m| m.record.clone()).collect()
}

#[async_trait]
impl PresenceTransport for MockPresenceHub {
    async fn join_channel(
        &self,
        name: &str,
        local_key: &UserId,
        on_sync: SyncHandler,
    ) -> Result<ChannelHandle, TransportError> {
        let (handle, state, handlers) = {
            let mut inner = mutex_lock(&self.inner, SOURCE, "join_channel");
            inner.join_calls += 1;

            if let Some(error) = inner.fail_next_join.take() {
                return Err(TransportError::JoinFailed(error));
            }

            let handle = ChannelHandle::new(name, local_key);
            inner
                .channels
                .entry(name.to_string())
                .or_default()
                .push(Member {
                    handle: handle.clone(),
                    on_sync,
                    record: None,
                });
            let (state, handlers) = Self::sync_targets(&inner, name);
            (handle, state, handlers)
        };

        Self::broadcast(state, handlers);
        Ok(handle)
    }

    async fn track(
        &self,
        channel: &ChannelHandle,
        record: PresenceRecord,
    ) -> Result<(), TransportError> {
        let (state, handlers) = {
            let mut inner = mutex_lock(&self.inner, SOURCE, "track");

            if let Some(error) = inner.fail_next_track.take() {
                return Err(TransportError::TrackFailed(error));
            }

            let member = inner
                .channels
                .get_mut(channel.name())
                .and_then(|members| members.iter_mut().find(|m| m.handle.id() == channel.id()))
                .ok_or_else(|| TransportError::UnknownChannel(channel.name().to_string()))?;
            member.record = Some(record.clone());
            inner.published.push(record);

            Self::sync_targets(&inner, channel.name())
        };

        Self::broadcast(state, handlers);
        Ok(())
    }

    async fn leave_channel(&self, channel: &ChannelHandle) -> Result<(), TransportError> {
        let (state, handlers) = {
            let mut inner = mutex_lock(&self.inner, SOURCE, "leave_channel");

            if let Some(error) = inner.fail_next_leave.take() {
                return Err(TransportError::LeaveFailed(error));
            }

            let members = inner
                .channels
                .get_mut(channel.name())
                .ok_or_else(|| TransportError::UnknownChannel(channel.name().to_string()))?;
            let before = members.len();
            members.retain(|m| m.handle.id() != channel.id());
            if members.len() == before {
                return Err(TransportError::UnknownChannel(channel.name().to_string()));
            }
            if members.is_empty() {
                inner.channels.remove(channel.name());
            }

            Self::sync_targets(&inner, channel.name())
        };

        Self::broadcast(state, handlers);
        Ok(())
    }
}
