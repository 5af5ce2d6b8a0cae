//! Error types for key handling and NIP-44 operations

use thiserror::Error;

/// Errors from parsing or using secp256k1 key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Bytes are not a valid secp256k1 scalar (zero or >= curve order)
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Bytes are not the x-coordinate of a point on the curve
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Schnorr signature is malformed or does not verify
    #[error("invalid signature: {reason}")]
    InvalidSignature {
        /// Why the signature was rejected
        reason: String,
    },

    /// Hex text could not be decoded
    #[error("invalid hex: {reason}")]
    InvalidHex {
        /// Decoder error
        reason: String,
    },

    /// Decoded material has the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },
}

/// Errors from NIP-44 encryption and decryption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Plaintext is empty or longer than 65535 bytes
    #[error("invalid plaintext length: {len}")]
    InvalidPlaintextLength {
        /// Offending plaintext length
        len: usize,
    },

    /// Payload is not a well-formed NIP-44 payload
    #[error("invalid payload: {reason}")]
    InvalidPayload {
        /// Why the payload was rejected
        reason: String,
    },

    /// Payload version byte is not 2
    #[error("unsupported payload version: {0}")]
    UnsupportedVersion(u8),

    /// MAC mismatch, bad padding or non-UTF-8 plaintext
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Message key expansion or MAC keying failed
    #[error("key derivation failed: {reason}")]
    KeyDerivation {
        /// Underlying KDF or MAC error
        reason: String,
    },

    /// Key agreement failed
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

impl CipherError {
    /// Returns true if the payload itself was bad (wrong key, tampering,
    /// garbage input) rather than the caller's key material.
    pub fn is_payload_error(&self) -> bool {
        match self {
            Self::InvalidPayload { .. }
            | Self::UnsupportedVersion(_)
            | Self::DecryptionFailed { .. } => true,
            Self::InvalidPlaintextLength { .. } | Self::KeyDerivation { .. } | Self::Key(_) => {
                false
            },
        }
    }
}
