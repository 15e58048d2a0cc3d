//! Change-stream subscription driving cache invalidation.
//!
//! [`ChangeStreamSubscriber`] holds one subscription per session, named
//! `{prefix}:{user_id}`, covering the `messages` and `conversations` tables.
//! Each delivered event is turned into targets by
//! [`chatsync_core::invalidation::plan`] and pushed to the sink in order.

use crate::config::RealtimeConfig;
use crate::invalidation::InvalidationSink;
use crate::transport::{ChangeHandler, ChangeStream, SubscriptionHandle, TransportError};
use chatsync_core::plan;
use chatsync_types::{ChangeEvent, EventMask, Table, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default subscription name prefix.
pub const DEFAULT_SUBSCRIPTION_PREFIX: &str = "db-changes";

/// Per-session change subscription feeding an [`InvalidationSink`].
pub struct ChangeStreamSubscriber<S> {
    stream: S,
    sink: Arc<dyn InvalidationSink>,
    user: UserId,
    prefix: String,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl<S> std::fmt::Debug for ChangeStreamSubscriber<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStreamSubscriber")
            .field("user", &self.user)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl<S: ChangeStream> ChangeStreamSubscriber<S> {
    /// Create an inactive subscriber for `user`.
    pub fn new(stream: S, user: UserId, sink: Arc<dyn InvalidationSink>) -> Self {
        Self {
            stream,
            sink,
            user,
            prefix: DEFAULT_SUBSCRIPTION_PREFIX.to_string(),
            handle: Mutex::new(None),
        }
    }

    /// Create an inactive subscriber named per the `[realtime]` configuration.
    pub fn from_config(
        stream: S,
        user: UserId,
        sink: Arc<dyn InvalidationSink>,
        config: &RealtimeConfig,
    ) -> Self {
        Self::new(stream, user, sink).with_prefix(&config.subscription_prefix)
    }

    /// Use `prefix` instead of [`DEFAULT_SUBSCRIPTION_PREFIX`].
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// The underlying transport.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// The session's user.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Deterministic name of this session's subscription.
    pub fn subscription_name(&self) -> String {
        format!("{}:{}", self.prefix, self.user)
    }

    /// Subscribe, replacing any subscription this instance already holds.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the new subscription cannot be
    /// established. The previous subscription is gone either way.
    pub async fn start(&self) -> Result<(), TransportError> {
        let mut held = self.handle.lock().await;
        if let Some(previous) = held.take() {
            self.release(&previous).await;
        }

        let name = self.subscription_name();
        let sink = Arc::clone(&self.sink);
        let user = self.user.clone();
        let handler: ChangeHandler =
            Arc::new(move |event: ChangeEvent| dispatch(sink.as_ref(), &event, &user));

        let handle = self
            .stream
            .subscribe(&name, &Table::ALL, EventMask::ALL, handler)
            .await?;
        info!(subscription = %name, "change stream subscribed");
        *held = Some(handle);
        Ok(())
    }

    /// Apply one event as if the transport had delivered it.
    pub fn handle_event(&self, event: &ChangeEvent) {
        dispatch(self.sink.as_ref(), event, &self.user);
    }

    /// Drop the subscription, if any. Never fails; safe to call repeatedly.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            self.release(&handle).await;
        }
    }

    /// Whether a subscription is held.
    pub async fn is_active(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    async fn release(&self, handle: &SubscriptionHandle) {
        match self.stream.unsubscribe(handle).await {
            Ok(()) => info!(subscription = %handle.name(), "change stream unsubscribed"),
            Err(e) => warn!(subscription = %handle.name(), error = %e, "failed to unsubscribe"),
        }
    }
}

fn dispatch(sink: &dyn InvalidationSink, event: &ChangeEvent, user: &UserId) {
    for target in plan(event, user) {
        debug!(table = %event.table(), %target, "invalidating");
        sink.invalidate(target);
    }
}
