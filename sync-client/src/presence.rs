//! Per-conversation typing presence.
//!
//! [`PresenceChannel`] keeps at most one presence channel joined, named
//! `{prefix}:{conversation_id}` and keyed by the local participant id. Every
//! sync from the transport recomputes the list of remote participants who
//! are typing; consumers read it with [`PresenceChannel::typing_users`] or
//! follow it with [`PresenceChannel::watch_typing_users`].
//!
//! None of the operations return errors. Transport failures are logged and
//! the channel is left in a consistent state.

use crate::config::RealtimeConfig;
use crate::transport::{ChannelHandle, PresenceTransport, SyncHandler};
use chatsync_core::typing_users;
use chatsync_types::{ConversationId, PresenceRecord, PresenceState, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Default channel name prefix.
pub const DEFAULT_TYPING_PREFIX: &str = "typing";

/// The authenticated local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceIdentity {
    /// Presence key.
    pub participant_id: UserId,
    /// Display name published to peers, if the profile has loaded.
    pub username: Option<String>,
}

impl PresenceIdentity {
    /// Identity with a known username.
    pub fn new(participant_id: UserId, username: impl Into<String>) -> Self {
        Self {
            participant_id,
            username: Some(username.into()),
        }
    }
}

struct ActiveChannel {
    handle: ChannelHandle,
    conversation: ConversationId,
}

#[derive(Default)]
struct ChannelState {
    identity: Option<PresenceIdentity>,
    active: Option<ActiveChannel>,
}

/// Typing-indicator channel for the currently open conversation.
pub struct PresenceChannel<P> {
    transport: P,
    channel_prefix: String,
    state: Mutex<ChannelState>,
    typing_tx: Arc<watch::Sender<Vec<String>>>,
    // Bumped on every join and teardown; syncs tagged with an older value are dropped.
    generation: Arc<AtomicU64>,
}

impl<P> std::fmt::Debug for PresenceChannel<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceChannel")
            .field("channel_prefix", &self.channel_prefix)
            .field("typing_users", &*self.typing_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl<P: PresenceTransport> PresenceChannel<P> {
    /// Create an idle channel over `transport`.
    pub fn new(transport: P) -> Self {
        let (typing_tx, _) = watch::channel(Vec::new());
        Self {
            transport,
            channel_prefix: DEFAULT_TYPING_PREFIX.to_string(),
            state: Mutex::new(ChannelState::default()),
            typing_tx: Arc::new(typing_tx),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create an idle channel named per the `[realtime]` configuration.
    pub fn from_config(transport: P, config: &RealtimeConfig) -> Self {
        Self::new(transport).with_prefix(&config.typing_channel_prefix)
    }

    /// Use `prefix` instead of [`DEFAULT_TYPING_PREFIX`].
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.channel_prefix = prefix.to_string();
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &P {
        &self.transport
    }

    /// Channel name for `conversation`.
    pub fn channel_name(&self, conversation: &ConversationId) -> String {
        format!("{}:{}", self.channel_prefix, conversation)
    }

    /// Set the authenticated participant.
    ///
    /// A different participant id leaves the current channel, since its
    /// presence key no longer matches.
    pub async fn set_identity(&self, identity: PresenceIdentity) {
        let mut state = self.state.lock().await;
        let changed = state
            .identity
            .as_ref()
            .is_some_and(|current| current.participant_id != identity.participant_id);
        if changed {
            self.teardown(&mut state).await;
        }
        state.identity = Some(identity);
    }

    /// Leave any channel and forget the participant.
    pub async fn logout(&self) {
        let mut state = self.state.lock().await;
        self.teardown(&mut state).await;
        state.identity = None;
    }

    /// Switch to the typing channel of `conversation`.
    ///
    /// Any joined channel is left first. `None` only leaves. Without an
    /// identity nothing is joined.
    pub async fn join(&self, conversation: Option<ConversationId>) {
        let mut state = self.state.lock().await;
        self.teardown(&mut state).await;

        let Some(conversation) = conversation else {
            return;
        };
        let Some(identity) = state.identity.clone() else {
            debug!(%conversation, "no participant; typing channel not joined");
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let name = self.channel_name(&conversation);
        let on_sync = self.sync_handler(identity.participant_id.clone(), generation);

        match self
            .transport
            .join_channel(&name, &identity.participant_id, on_sync)
            .await
        {
            Ok(handle) => {
                info!(channel = %name, "typing channel joined");
                state.active = Some(ActiveChannel {
                    handle,
                    conversation,
                });
            }
            Err(e) => warn!(channel = %name, error = %e, "failed to join typing channel"),
        }
    }

    /// Publish whether the local participant is typing.
    ///
    /// Does nothing without a joined channel, an identity or a username.
    pub async fn track_typing(&self, is_typing: bool) {
        let state = self.state.lock().await;
        let (Some(active), Some(identity)) = (&state.active, &state.identity) else {
            return;
        };
        let Some(username) = &identity.username else {
            return;
        };

        let record = PresenceRecord::new(identity.participant_id.clone(), is_typing, username);
        if let Err(e) = self.transport.track(&active.handle, record).await {
            warn!(channel = %active.handle.name(), error = %e, "failed to publish typing state");
        }
    }

    /// Leave the joined channel, if any. Safe to call repeatedly.
    pub async fn leave(&self) {
        let mut state = self.state.lock().await;
        self.teardown(&mut state).await;
    }

    /// Conversation whose channel is joined.
    pub async fn current_conversation(&self) -> Option<ConversationId> {
        let state = self.state.lock().await;
        state
            .active
            .as_ref()
            .map(|active| active.conversation.clone())
    }

    /// Usernames of remote participants currently typing.
    pub fn typing_users(&self) -> Vec<String> {
        self.typing_tx.borrow().clone()
    }

    /// Follow the typing list as it changes.
    pub fn watch_typing_users(&self) -> watch::Receiver<Vec<String>> {
        self.typing_tx.subscribe()
    }

    fn sync_handler(&self, local: UserId, generation: u64) -> SyncHandler {
        let typing_tx = Arc::clone(&self.typing_tx);
        let current = Arc::clone(&self.generation);
        Arc::new(move |presence: PresenceState| {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            publish(&typing_tx, typing_users(&presence, Some(&local)));
        })
    }

    async fn teardown(&self, state: &mut ChannelState) {
        let Some(active) = state.active.take() else {
            return;
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        publish(&self.typing_tx, Vec::new());

        match self.transport.leave_channel(&active.handle).await {
            Ok(()) => info!(channel = %active.handle.name(), "typing channel left"),
            Err(e) => warn!(
                channel = %active.handle.name(),
                error = %e,
                "failed to leave typing channel"
            ),
        }
    }
}

fn publish(tx: &watch::Sender<Vec<String>>, users: Vec<String>) {
    tx.send_if_modified(|current| {
        if *current == users {
            false
        } else {
            *current = users;
            true
        }
    });
}
