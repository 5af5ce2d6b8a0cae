//! Error taxonomy for the view-key protocol.
//!
//! Lower layers keep their own error enums (`CipherError`, `EventError`,
//! `OracleError`, `RelayError`). They are translated here at the protocol
//! boundary, where the same lower-level failure can mean different things:
//! an oracle rejection is `EncryptionFailed` while sealing but
//! `DecryptionFailed` while unwrapping.

use thiserror::Error;
use veilfeed_proto::{Kind, Nip19Error};

/// Errors surfaced by envelope, distribution, inbox and feed operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// No signing capability is present
    #[error("signing oracle unavailable")]
    OracleUnavailable,

    /// The oracle refused or failed to encrypt
    #[error("encryption failed: {reason}")]
    EncryptionFailed {
        /// Oracle or cipher error
        reason: String,
    },

    /// The oracle refused to sign, or returned an event that does not verify
    #[error("signing failed: {reason}")]
    SigningFailed {
        /// Oracle error or verification failure
        reason: String,
    },

    /// Entropy source failed while generating key material
    #[error("key generation failed: {reason}")]
    KeyGenerationFailed {
        /// Entropy error
        reason: String,
    },

    /// An envelope layer could not be parsed or checked
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// Which check failed
        reason: String,
    },

    /// A well-formed rumor of a kind other than view-key
    #[error("rumor is not a view key (kind {kind})")]
    NotAViewKeyRumor {
        /// Rumor kind found
        kind: Kind,
    },

    /// Ciphertext could not be decrypted (wrong key, tampering, refusal)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Cipher or oracle error
        reason: String,
    },

    /// Recipient text does not decode to a public key
    #[error("invalid recipient identity: {reason}")]
    InvalidRecipientIdentity {
        /// Decoder error
        reason: String,
    },

    /// The relay did not accept a published event
    #[error("publish failed: {reason}")]
    PublishFailed {
        /// Relay error
        reason: String,
    },
}

impl ProtocolError {
    /// Returns true if the same operation may succeed when retried.
    ///
    /// Relay failures and a missing oracle (the user may connect a signer)
    /// are transient. Malformed input and cipher failures are not: retrying
    /// yields the same result.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PublishFailed { .. } | Self::OracleUnavailable)
    }

    /// Returns true if the error concerns a single received event.
    ///
    /// Subscriptions drop that event and keep running.
    pub fn is_event_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedEnvelope { .. }
                | Self::NotAViewKeyRumor { .. }
                | Self::DecryptionFailed { .. }
        )
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope { reason: reason.into() }
    }
}

impl From<Nip19Error> for ProtocolError {
    fn from(err: Nip19Error) -> Self {
        Self::InvalidRecipientIdentity { reason: err.to_string() }
    }
}
