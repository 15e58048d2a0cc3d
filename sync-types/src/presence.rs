//! Ephemeral presence state.
//!
//! Presence lives only in the transport's synchronized presence table. Each
//! participant owns its own record and overwrites it on every local change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::UserId;

/// One participant's published presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// Presence key of the publishing participant.
    pub participant_id: UserId,
    /// Whether the participant is currently typing.
    pub typing: bool,
    /// Display name shown to peers.
    pub username: String,
}

impl PresenceRecord {
    /// Create a presence record.
    pub fn new(participant_id: UserId, typing: bool, username: impl Into<String>) -> Self {
        Self {
            participant_id,
            typing,
            username: username.into(),
        }
    }
}

/// Full reconciliation snapshot of a presence channel.
///
/// Maps each participant key to the records published under it; a
/// participant connected more than once has more than one record. Iteration
/// is ordered by participant key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceState(BTreeMap<UserId, Vec<PresenceRecord>>);

impl PresenceState {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every record held under `key` with `records`.
    pub fn set(&mut self, key: UserId, records: Vec<PresenceRecord>) {
        if records.is_empty() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, records);
        }
    }

    /// Drop a participant from the snapshot.
    pub fn remove(&mut self, key: &UserId) -> Option<Vec<PresenceRecord>> {
        self.0.remove(key)
    }

    /// Records published under `key`.
    pub fn records(&self, key: &UserId) -> &[PresenceRecord] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate participants in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &[PresenceRecord])> {
        self.0.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of present participants.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if nobody is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PresenceRecord> for PresenceState {
    fn from_iter<T: IntoIterator<Item = PresenceRecord>>(iter: T) -> Self {
        let mut map: BTreeMap<UserId, Vec<PresenceRecord>> = BTreeMap::new();
        for record in iter {
            map.entry(record.participant_id.clone())
                .or_default()
                .push(record);
        }
        Self(map)
    }
}
