//! Error types for events, key text encoding and wire messages

use thiserror::Error;
use veilfeed_crypto::KeyError;

/// Errors from parsing or verifying an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Text is not a JSON event, or a required field is missing
    #[error("malformed event: {reason}")]
    Malformed {
        /// Parser error
        reason: String,
    },

    /// Stored id does not match the recomputed hash
    #[error("event id mismatch: claimed {claimed}, computed {computed}")]
    IdMismatch {
        /// Id carried by the event
        claimed: String,
        /// Id recomputed from the event fields
        computed: String,
    },

    /// Schnorr signature does not verify against the author key
    #[error("invalid event signature: {0}")]
    InvalidSignature(#[from] KeyError),

    /// Event could not be serialized
    #[error("event encoding failed: {reason}")]
    Encode {
        /// Serializer error
        reason: String,
    },
}

/// Errors from NIP-19 bech32 key encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Nip19Error {
    /// Not valid bech32
    #[error("invalid bech32: {reason}")]
    Bech32 {
        /// Decoder error
        reason: String,
    },

    /// Human-readable prefix is not the one expected
    #[error("wrong prefix: expected {expected}, found {found}")]
    WrongPrefix {
        /// Expected prefix (`npub` or `nsec`)
        expected: &'static str,
        /// Prefix found in the input
        found: String,
    },

    /// Decoded bytes are not a valid key
    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
}

/// Errors from decoding NIP-01 relay messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Not valid JSON
    #[error("invalid JSON: {reason}")]
    Json {
        /// Parser error
        reason: String,
    },

    /// JSON, but not a message array of the expected shape
    #[error("malformed message: {reason}")]
    Malformed {
        /// What was wrong
        reason: String,
    },

    /// Message label this implementation does not know
    #[error("unknown message type: {0}")]
    UnknownMessage(String),
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json { reason: err.to_string() }
    }
}
