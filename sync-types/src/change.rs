//! Row-level change notifications.
//!
//! The transport delivers one notification per inserted, updated or deleted
//! row in a tracked table. [`ChangeEvent`] is the typed form of that
//! notification: a tagged union discriminated by table, so invalidation logic
//! matches exhaustively instead of probing fields.
//!
//! Transports that hand over raw JSON decode it with
//! [`ChangeEvent::from_payload`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{ConversationId, DecodeError};

/// Tables whose changes this layer tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// Chat messages.
    Messages,
    /// Conversation summaries.
    Conversations,
}

impl Table {
    /// Every tracked table, in subscription order.
    pub const ALL: [Table; 2] = [Table::Messages, Table::Conversations];

    /// Table name as used by the remote datastore.
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Messages => "messages",
            Table::Conversations => "conversations",
        }
    }

    /// Parse a table name from the remote datastore.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "messages" => Some(Table::Messages),
            "conversations" => Some(Table::Conversations),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Row was inserted.
    Insert,
    /// Row was updated.
    Update,
    /// Row was deleted.
    Delete,
}

impl Operation {
    /// Parse an operation discriminator (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Operation::Insert),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// Set of operations a subscription wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    insert: bool,
    update: bool,
    delete: bool,
}

impl EventMask {
    /// Deliver every operation.
    pub const ALL: EventMask = EventMask {
        insert: true,
        update: true,
        delete: true,
    };

    /// Deliver a single operation.
    pub const fn only(operation: Operation) -> Self {
        Self {
            insert: matches!(operation, Operation::Insert),
            update: matches!(operation, Operation::Update),
            delete: matches!(operation, Operation::Delete),
        }
    }

    /// Check whether the mask admits an operation.
    pub fn contains(&self, operation: Operation) -> bool {
        match operation {
            Operation::Insert => self.insert,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// A changed row of the `messages` table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageRecord {
    /// Row identifier, if the payload carried one.
    pub id: Option<String>,
    /// Owning conversation. Absent on partial payloads.
    pub conversation_id: Option<ConversationId>,
    /// Remaining columns, untouched.
    pub fields: Map<String, Value>,
}

/// A changed row of the `conversations` table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversationRecord {
    /// Row identifier, if the payload carried one.
    pub id: Option<String>,
    /// Remaining columns, untouched.
    pub fields: Map<String, Value>,
}

/// A row-level change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Change to the `messages` table.
    Messages {
        /// What happened to the row.
        operation: Operation,
        /// The row (new image for insert/update, old image for delete).
        record: MessageRecord,
    },
    /// Change to the `conversations` table.
    Conversations {
        /// What happened to the row.
        operation: Operation,
        /// The row (new image for insert/update, old image for delete).
        record: ConversationRecord,
    },
}

impl ChangeEvent {
    /// Shorthand for a message change in the given conversation.
    pub fn message(operation: Operation, conversation_id: Option<ConversationId>) -> Self {
        ChangeEvent::Messages {
            operation,
            record: MessageRecord {
                conversation_id,
                ..MessageRecord::default()
            },
        }
    }

    /// Shorthand for a conversation change.
    pub fn conversation(operation: Operation, id: Option<String>) -> Self {
        ChangeEvent::Conversations {
            operation,
            record: ConversationRecord {
                id,
                fields: Map::new(),
            },
        }
    }

    /// The table this change came from.
    pub fn table(&self) -> Table {
        match self {
            ChangeEvent::Messages { .. } => Table::Messages,
            ChangeEvent::Conversations { .. } => Table::Conversations,
        }
    }

    /// The kind of change.
    pub fn operation(&self) -> Operation {
        match self {
            ChangeEvent::Messages { operation, .. }
            | ChangeEvent::Conversations { operation, .. } => *operation,
        }
    }

    /// Decode a raw JSON change payload.
    ///
    /// Expects `{ "table", "eventType" | "type", "new", "old" }`. Deletes read
    /// the row from `old`, everything else from `new`; an empty or missing
    /// image falls back to the other one. A missing `conversation_id` is not
    /// an error: it decodes as `None`.
    pub fn from_payload(payload: &Value) -> Result<Self, DecodeError> {
        let obj = payload
            .as_object()
            .ok_or(DecodeError::NotAnObject("payload"))?;

        let table_name = obj
            .get("table")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("table"))?;
        let table = Table::parse(table_name)
            .ok_or_else(|| DecodeError::UnknownTable(table_name.to_string()))?;

        let op_name = obj
            .get("eventType")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("eventType"))?;
        let operation = Operation::parse(op_name)
            .ok_or_else(|| DecodeError::UnknownOperation(op_name.to_string()))?;

        let mut fields = pick_record(obj, operation)?;
        let id = take_string(&mut fields, "id");

        Ok(match table {
            Table::Messages => {
                let conversation_id =
                    take_string(&mut fields, "conversation_id").map(ConversationId::from);
                ChangeEvent::Messages {
                    operation,
                    record: MessageRecord {
                        id,
                        conversation_id,
                        fields,
                    },
                }
            }
            Table::Conversations => ChangeEvent::Conversations {
                operation,
                record: ConversationRecord { id, fields },
            },
        })
    }
}

fn pick_record(
    obj: &Map<String, Value>,
    operation: Operation,
) -> Result<Map<String, Value>, DecodeError> {
    let order = match operation {
        Operation::Delete => ["old", "new"],
        Operation::Insert | Operation::Update => ["new", "old"],
    };
    for key in order {
        match obj.get(key) {
            Some(Value::Object(map)) if !map.is_empty() => return Ok(map.clone()),
            Some(Value::Object(_)) | Some(Value::Null) | None => continue,
            Some(_) => return Err(DecodeError::NotAnObject("record")),
        }
    }
    Ok(Map::new())
}

/// Remove a column and coerce it to a string id (numbers allowed).
fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ===========================================
    // Decoding Tests
    // ===========================================

    #[test]
    fn decodes_message_insert() {
        let payload = json!({
            "table": "messages",
            "eventType": "INSERT",
            "new": { "id": "m1", "conversation_id": "c1", "body": "hi" },
            "old": {}
        });

        let event = ChangeEvent::from_payload(&payload).unwrap();
        match event {
            ChangeEvent::Messages { operation, record } => {
                assert_eq!(operation, Operation::Insert);
                assert_eq!(record.id.as_deref(), Some("m1"));
                assert_eq!(record.conversation_id, Some(ConversationId::from("c1")));
                assert_eq!(record.fields.get("body"), Some(&json!("hi")));
                assert!(!record.fields.contains_key("conversation_id"));
            }
            other => panic!("Expected message change, got {:?}", other),
        }
    }

    #[test]
    fn delete_reads_old_image() {
        let payload = json!({
            "table": "messages",
            "eventType": "DELETE",
            "new": {},
            "old": { "id": 7, "conversation_id": "c9" }
        });

        let event = ChangeEvent::from_payload(&payload).unwrap();
        assert_eq!(event.operation(), Operation::Delete);
        if let ChangeEvent::Messages { record, .. } = event {
            assert_eq!(record.id.as_deref(), Some("7"));
            assert_eq!(record.conversation_id, Some(ConversationId::from("c9")));
        } else {
            panic!("Expected message change");
        }
    }

    #[test]
    fn missing_conversation_id_decodes_as_none() {
        let payload = json!({
            "table": "messages",
            "type": "update",
            "new": { "id": "m1" }
        });

        let event = ChangeEvent::from_payload(&payload).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Messages {
                operation: Operation::Update,
                record: MessageRecord {
                    id: Some("m1".into()),
                    conversation_id: None,
                    fields: Map::new(),
                },
            }
        );
    }

    #[test]
    fn decodes_conversation_change() {
        let payload = json!({
            "table": "conversations",
            "eventType": "UPDATE",
            "new": { "id": "c1", "title": "Trip" }
        });

        let event = ChangeEvent::from_payload(&payload).unwrap();
        assert_eq!(event.table(), Table::Conversations);
    }

    #[test]
    fn unknown_table_is_rejected() {
        let payload = json!({ "table": "profiles", "eventType": "INSERT", "new": {} });
        assert_eq!(
            ChangeEvent::from_payload(&payload),
            Err(DecodeError::UnknownTable("profiles".into()))
        );
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let payload = json!({ "table": "messages", "eventType": "TRUNCATE" });
        assert_eq!(
            ChangeEvent::from_payload(&payload),
            Err(DecodeError::UnknownOperation("TRUNCATE".into()))
        );
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert_eq!(
            ChangeEvent::from_payload(&json!([1, 2])),
            Err(DecodeError::NotAnObject("payload"))
        );
        let bad_record = json!({ "table": "messages", "eventType": "INSERT", "new": "x" });
        assert_eq!(
            ChangeEvent::from_payload(&bad_record),
            Err(DecodeError::NotAnObject("record"))
        );
    }

    // ===========================================
    // Mask Tests
    // ===========================================

    #[test]
    fn event_mask_all_contains_everything() {
        let mask = EventMask::default();
        assert!(mask.contains(Operation::Insert));
        assert!(mask.contains(Operation::Update));
        assert!(mask.contains(Operation::Delete));
    }

    #[test]
    fn event_mask_only_filters() {
        let mask = EventMask::only(Operation::Delete);
        assert!(!mask.contains(Operation::Insert));
        assert!(mask.contains(Operation::Delete));
    }

    #[test]
    fn table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(Table::parse(table.as_str()), Some(table));
        }
    }
}
