//! Change event → invalidation target planning.
//!
//! Decides which cached query results a row change makes stale. Dispatching
//! the targets is sync-client's job.

use chatsync_types::{ChangeEvent, InvalidationTarget, UserId};

/// Compute the targets invalidated by `event` for the session of `user`.
///
/// - Any message change: the conversation list and the user's unread count,
///   plus that conversation's messages when the row names its conversation.
/// - Any conversation change: the conversation list only.
///
/// A message row without a conversation id only loses the scoped target.
pub fn plan(event: &ChangeEvent, user: &UserId) -> Vec<InvalidationTarget> {
    match event {
        ChangeEvent::Messages { record, .. } => {
            let mut targets = vec![
                InvalidationTarget::conversations(),
                InvalidationTarget::unread_notifications(user),
            ];
            if let Some(conversation) = &record.conversation_id {
                targets.push(InvalidationTarget::messages(conversation));
            }
            targets
        }
        ChangeEvent::Conversations { .. } => vec![InvalidationTarget::conversations()],
    }
}
