//! Client error types.

use thiserror::Error;
use veilfeed_core::{ProtocolError, RelayError};
use veilfeed_crypto::PublicKey;

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Envelope, oracle, cipher or publish failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A subscription could not be opened
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// The operation needs a view key and none is held or restored yet
    #[error("no view key: generate one first")]
    MissingViewKey,

    /// A view key is already held; keys are never rotated
    #[error("a view key already exists")]
    ViewKeyExists,

    /// The identity is already a friend (or is the local identity)
    #[error("{0} is already a friend")]
    AlreadyFriend(PublicKey),

    /// The identity is not in the friend list
    #[error("{0} is not a friend")]
    UnknownFriend(PublicKey),
}

impl ClientError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Protocol(err) => err.is_transient(),
            Self::Relay(err) => err.is_transient(),
            Self::MissingViewKey
            | Self::ViewKeyExists
            | Self::AlreadyFriend(_)
            | Self::UnknownFriend(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_keep_their_message() {
        let err = ClientError::from(ProtocolError::OracleUnavailable);
        assert_eq!(err.to_string(), "signing oracle unavailable");
        assert!(err.is_transient());
    }

    #[test]
    fn session_errors_are_permanent() {
        assert!(!ClientError::MissingViewKey.is_transient());
        assert!(ClientError::from(RelayError::Closed).is_transient());
    }
}
