//! Typing indicator derivation from presence snapshots.

use chatsync_types::{PresenceState, UserId};

/// Usernames of every remote participant currently typing.
///
/// Excludes the local participant, yields one entry per participant even if
/// it is present from several connections, and is ordered by participant id
/// so the list is stable across syncs.
pub fn typing_users(state: &PresenceState, local: Option<&UserId>) -> Vec<String> {
    state
        .iter()
        .filter(|(key, _)| Some(*key) != local)
        .filter_map(|(_, records)| {
            records
                .iter()
                .find(|record| record.typing)
                .map(|record| record.username.clone())
        })
        .collect()
}
