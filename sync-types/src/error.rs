//! Error types for chatsync payload decoding.

use thiserror::Error;

/// Errors that can occur while decoding a raw change payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload (or one of its records) is not a JSON object
    #[error("payload is not an object: {0}")]
    NotAnObject(&'static str),

    /// A required field is missing or has the wrong type
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Change came from a table this layer does not track
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Operation discriminator was not INSERT, UPDATE or DELETE
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DecodeError::UnknownTable("profiles".into());
        assert_eq!(err.to_string(), "unknown table: profiles");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DecodeError>();
    }
}
