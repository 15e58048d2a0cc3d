//! Transport abstraction for chatsync.
//!
//! This module defines the two realtime primitives the sync layer consumes
//! from the external pub/sub transport, plus mock implementations for tests.
//!
//! # Design
//!
//! Both traits are async and handle-oriented:
//! - [`ChangeStream`]: `subscribe()` registers a handler for row changes on a
//!   set of tables, `unsubscribe()` removes it
//! - [`PresenceTransport`]: `join_channel()` registers a sync handler on a
//!   presence channel, `track()` publishes the local record,
//!   `leave_channel()` departs
//!
//! Handlers are plain synchronous callbacks. The transport invokes them in
//! delivery order and they must not block.
//!
//! # Example
//!
//! ```ignore
//! let stream = MockChangeStream::new();
//! let handle = stream
//!     .subscribe("db-changes:u1", &Table::ALL, EventMask::ALL, handler)
//!     .await?;
//! stream.emit(event);
//! stream.unsubscribe(&handle).await?;
//! ```

mod mock;

pub use mock::{MockChangeStream, MockPresenceHub};

use async_trait::async_trait;
use chatsync_types::{ChangeEvent, EventMask, PresenceRecord, PresenceState, Table, UserId};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Callback receiving row change notifications.
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Callback receiving full presence reconciliations.
pub type SyncHandler = Arc<dyn Fn(PresenceState) + Send + Sync>;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Subscription could not be established.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Subscription could not be removed.
    #[error("unsubscribe failed: {0}")]
    UnsubscribeFailed(String),

    /// Handle does not refer to a live subscription.
    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),

    /// Presence channel could not be joined.
    #[error("join failed: {0}")]
    JoinFailed(String),

    /// Presence record could not be published.
    #[error("track failed: {0}")]
    TrackFailed(String),

    /// Presence channel could not be left.
    #[error("leave failed: {0}")]
    LeaveFailed(String),

    /// Handle does not refer to a joined channel.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

/// Handle to an established change-stream subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: Uuid,
    name: String,
}

impl SubscriptionHandle {
    /// Create a handle with a fresh id.
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    /// Unique id of this subscription instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Deterministic subscription name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handle to a joined presence channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    id: Uuid,
    name: String,
    local_key: UserId,
}

impl ChannelHandle {
    /// Create a handle with a fresh id.
    pub fn new(name: &str, local_key: &UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            local_key: local_key.clone(),
        }
    }

    /// Unique id of this membership.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel name, scoped by conversation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Presence key of the local participant.
    pub fn local_key(&self) -> &UserId {
        &self.local_key
    }
}

/// Row-level change subscription primitive.
///
/// Implementations deliver [`ChangeEvent`]s for the requested tables to the
/// handler, in transport order, until unsubscribed.
#[async_trait]
pub trait ChangeStream: Send + Sync {
    /// Subscribe `handler` to changes on `tables` admitted by `mask`.
    async fn subscribe(
        &self,
        name: &str,
        tables: &[Table],
        mask: EventMask,
        handler: ChangeHandler,
    ) -> Result<SubscriptionHandle, TransportError>;

    /// Remove a subscription. No events reach its handler afterwards.
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError>;
}

/// Presence channel primitive with track/sync semantics.
#[async_trait]
pub trait PresenceTransport: Send + Sync {
    /// Join channel `name` keyed by `local_key`; `on_sync` receives every
    /// full reconciliation of the channel's presence table.
    async fn join_channel(
        &self,
        name: &str,
        local_key: &UserId,
        on_sync: SyncHandler,
    ) -> Result<ChannelHandle, TransportError>;

    /// Publish the local participant's record, replacing the previous one.
    async fn track(
        &self,
        channel: &ChannelHandle,
        record: PresenceRecord,
    ) -> Result<(), TransportError>;

    /// Leave a channel. No syncs reach its handler afterwards.
    async fn leave_channel(&self, channel: &ChannelHandle) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_handles_are_unique_per_instance() {
        let a = SubscriptionHandle::new("db-changes:u1");
        let b = SubscriptionHandle::new("db-changes:u1");
        assert_eq!(a.name(), b.name());
        assert_ne!(a, b);
    }

    #[test]
    fn channel_handle_keeps_local_key() {
        let handle = ChannelHandle::new("typing:c1", &UserId::from("u1"));
        assert_eq!(handle.name(), "typing:c1");
        assert_eq!(handle.local_key(), &UserId::from("u1"));
    }

    #[test]
    fn error_display() {
        let err = TransportError::LeaveFailed("socket closed".into());
        assert_eq!(err.to_string(), "leave failed: socket closed");
    }
}
