//! Cache invalidation targets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ConversationId, UserId};

/// Opaque query key identifying cached results that should be treated as stale.
///
/// An ordered tuple of strings, e.g. `["messages", "<conversation id>"]`.
/// A target also covers every longer key it is a prefix of.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationTarget(Vec<String>);

impl InvalidationTarget {
    /// Root segment of the conversation list query.
    pub const CONVERSATIONS: &'static str = "conversations";
    /// Root segment of the per-user unread count query.
    pub const UNREAD_NOTIFICATIONS: &'static str = "unreadNotifications";
    /// Root segment of the per-conversation message list query.
    pub const MESSAGES: &'static str = "messages";

    /// Build a target from its segments.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// `["conversations"]`
    pub fn conversations() -> Self {
        Self::new([Self::CONVERSATIONS])
    }

    /// `["unreadNotifications", user]`
    pub fn unread_notifications(user: &UserId) -> Self {
        Self::new([Self::UNREAD_NOTIFICATIONS, user.as_str()])
    }

    /// `["messages", conversation]`
    pub fn messages(conversation: &ConversationId) -> Self {
        Self::new([Self::MESSAGES, conversation.as_str()])
    }

    /// The key segments, in order.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Whether this target covers `key` (equal to it or a prefix of it).
    pub fn matches(&self, key: &InvalidationTarget) -> bool {
        key.0.starts_with(&self.0)
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:?}", part)?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidationTarget({})", self)
    }
}
