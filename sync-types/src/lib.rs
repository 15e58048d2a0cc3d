//! # sync-types
//!
//! Data model for the chatsync realtime synchronization layer.
//!
//! This crate provides the foundational types used across all chatsync crates:
//! - [`ConversationId`], [`UserId`] - Identity types
//! - [`ChangeEvent`] - Row-level change notifications, one variant per tracked table
//! - [`InvalidationTarget`] - Opaque query keys handed to the query consumer
//! - [`PresenceRecord`], [`PresenceState`] - Ephemeral per-participant presence
//! - [`DecodeError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod change;
mod error;
mod ids;
mod presence;
mod target;

pub use change::{ChangeEvent, ConversationRecord, EventMask, MessageRecord, Operation, Table};
pub use error::DecodeError;
pub use ids::{ConversationId, UserId};
pub use presence::{PresenceRecord, PresenceState};
pub use target::InvalidationTarget;
