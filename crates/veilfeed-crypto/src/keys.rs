//! secp256k1 identities, key pairs and BIP-340 Schnorr signatures
//!
//! Public keys are x-only (32 bytes) as used on the relay wire. Key pairs are
//! only ever built from caller-provided secret bytes; this module never reads
//! an RNG itself.

use std::{fmt, str::FromStr, sync::OnceLock};

use secp256k1::{All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey, schnorr};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    error::KeyError,
    nip44::{self, ConversationKey},
};

/// Size of an x-only public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a Schnorr signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();

/// Shared secp256k1 context (signing + verification).
pub(crate) fn context() -> &'static Secp256k1<All> {
    CONTEXT.get_or_init(Secp256k1::new)
}

/// An identity: the x-only secp256k1 public key.
///
/// # Invariants
///
/// - Always the x-coordinate of a valid curve point (checked on construction)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Build from raw x-only bytes, rejecting points not on the curve.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Result<Self, KeyError> {
        XOnlyPublicKey::from_slice(&bytes)
            .map_err(|e| KeyError::InvalidPublicKey { reason: e.to_string() })?;
        Ok(Self(bytes))
    }

    /// Build from a byte slice of any length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            KeyError::InvalidLength { expected: PUBLIC_KEY_SIZE, actual: bytes.len() }
        })?;
        Self::from_bytes(array)
    }

    /// Parse 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text).map_err(|e| KeyError::InvalidHex { reason: e.to_string() })?;
        Self::from_slice(&bytes)
    }

    /// Lowercase hex encoding (the wire form).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw x-only bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub(crate) fn to_x_only(self) -> Result<XOnlyPublicKey, KeyError> {
        XOnlyPublicKey::from_slice(&self.0)
            .map_err(|e| KeyError::InvalidPublicKey { reason: e.to_string() })
    }

    /// Full point with even y, the lift BIP-340 and NIP-44 use for x-only
    /// keys.
    pub(crate) fn to_even_point(self) -> Result<secp256k1::PublicKey, KeyError> {
        let mut compressed = [0u8; PUBLIC_KEY_SIZE + 1];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(&self.0);
        secp256k1::PublicKey::from_slice(&compressed)
            .map_err(|e| KeyError::InvalidPublicKey { reason: e.to_string() })
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(de::Error::custom)
    }
}

/// A BIP-340 Schnorr signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Build from raw bytes. Validity is only checked on verification.
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse 128 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text).map_err(|e| KeyError::InvalidHex { reason: e.to_string() })?;
        let array: [u8; SIGNATURE_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            KeyError::InvalidLength { expected: SIGNATURE_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(array))
    }

    /// Lowercase hex encoding (the wire form).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(de::Error::custom)
    }
}

/// Verify a Schnorr signature over a 32-byte digest.
///
/// # Errors
///
/// - `InvalidSignature`: malformed signature bytes or verification failure
/// - `InvalidPublicKey`: `public_key` is not on the curve
pub fn verify_schnorr(
    public_key: &PublicKey,
    digest: &[u8; 32],
    signature: &Signature,
) -> Result<(), KeyError> {
    let signature = schnorr::Signature::from_slice(signature.as_bytes())
        .map_err(|e| KeyError::InvalidSignature { reason: e.to_string() })?;
    let message = Message::from_digest(*digest);

    context()
        .verify_schnorr(&signature, &message, &public_key.to_x_only()?)
        .map_err(|e| KeyError::InvalidSignature { reason: e.to_string() })
}

/// A secp256k1 key pair held in process.
///
/// Used for one-shot ephemeral gift-wrap keys and for hosts that keep the
/// identity secret locally. The secret is erased on drop.
pub struct Keys {
    keypair: Keypair,
    public_key: PublicKey,
}

impl Keys {
    /// Build a key pair from 32 secret bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidSecretKey`: bytes are zero or not below the curve order. For
    ///   uniformly random input this happens with negligible probability and
    ///   the caller should draw fresh bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_slice(secret).map_err(|_| KeyError::InvalidSecretKey)?;
        let keypair = Keypair::from_secret_key(context(), &secret_key);
        let (x_only, _parity) = keypair.x_only_public_key();

        Ok(Self { keypair, public_key: PublicKey(x_only.serialize()) })
    }

    /// Parse a 64-character hex secret key.
    pub fn from_secret_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text).map_err(|e| KeyError::InvalidHex { reason: e.to_string() })?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: 32, actual: bytes.len() })?;
        Self::from_secret_bytes(&array)
    }

    /// The x-only public key of this pair.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign a 32-byte digest with BIP-340 Schnorr.
    ///
    /// `aux_rand` is the auxiliary randomness from BIP-340; the caller
    /// provides it so signing stays deterministic under test.
    pub fn sign_schnorr(&self, digest: &[u8; 32], aux_rand: &[u8; 32]) -> Signature {
        let message = Message::from_digest(*digest);
        let signature = context().sign_schnorr_with_aux_rand(&message, &self.keypair, aux_rand);
        Signature(signature.serialize())
    }

    /// NIP-44 conversation key between this secret and `partner`.
    pub fn conversation_key(&self, partner: &PublicKey) -> Result<ConversationKey, KeyError> {
        nip44::conversation_key(&self.keypair.secret_key(), partner)
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys").field("public_key", &self.public_key).finish_non_exhaustive()
    }
}

impl Drop for Keys {
    fn drop(&mut self) {
        self.keypair.non_secure_erase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        bytes
    }

    #[test]
    fn zero_secret_is_rejected() {
        assert_eq!(Keys::from_secret_bytes(&[0u8; 32]).unwrap_err(), KeyError::InvalidSecretKey);
    }

    #[test]
    fn secret_above_curve_order_is_rejected() {
        assert_eq!(Keys::from_secret_bytes(&[0xFF; 32]).unwrap_err(), KeyError::InvalidSecretKey);
    }

    #[test]
    fn generator_point_public_key() {
        // 1 * G has the well-known x-coordinate
        let keys = Keys::from_secret_bytes(&secret(1)).unwrap();
        assert_eq!(
            keys.public_key().to_hex(),
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let keys = Keys::from_secret_bytes(&secret(7)).unwrap();
        let hex = keys.public_key().to_hex();
        assert_eq!(PublicKey::from_hex(&hex).unwrap(), keys.public_key());
        assert_eq!(hex.parse::<PublicKey>().unwrap(), keys.public_key());
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        let err = PublicKey::from_slice(&[0x02; 31]).unwrap_err();
        assert_eq!(err, KeyError::InvalidLength { expected: 32, actual: 31 });
    }

    #[test]
    fn public_key_rejects_off_curve_x() {
        // x = 5 is not the x-coordinate of any secp256k1 point
        let mut bytes = [0u8; 32];
        bytes[31] = 5;
        assert!(matches!(PublicKey::from_bytes(bytes), Err(KeyError::InvalidPublicKey { .. })));
    }

    #[test]
    fn sign_verify_roundtrip() {
        let keys = Keys::from_secret_bytes(&secret(3)).unwrap();
        let digest = [0x42u8; 32];

        let signature = keys.sign_schnorr(&digest, &[0u8; 32]);
        verify_schnorr(&keys.public_key(), &digest, &signature).unwrap();
    }

    #[test]
    fn verify_rejects_other_signer() {
        let signer = Keys::from_secret_bytes(&secret(3)).unwrap();
        let other = Keys::from_secret_bytes(&secret(4)).unwrap();
        let digest = [0x42u8; 32];

        let signature = signer.sign_schnorr(&digest, &[0u8; 32]);
        assert!(matches!(
            verify_schnorr(&other.public_key(), &digest, &signature),
            Err(KeyError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn verify_rejects_tampered_digest() {
        let keys = Keys::from_secret_bytes(&secret(3)).unwrap();
        let signature = keys.sign_schnorr(&[0x42u8; 32], &[0u8; 32]);

        assert!(verify_schnorr(&keys.public_key(), &[0x43u8; 32], &signature).is_err());
    }

    #[test]
    fn signature_hex_roundtrip() {
        let keys = Keys::from_secret_bytes(&secret(9)).unwrap();
        let signature = keys.sign_schnorr(&[1u8; 32], &[2u8; 32]);

        assert_eq!(Signature::from_hex(&signature.to_hex()).unwrap(), signature);
    }

    #[test]
    fn public_key_serde_is_hex_string() {
        let keys = Keys::from_secret_bytes(&secret(1)).unwrap();
        let json = serde_json::to_string(&keys.public_key()).unwrap();

        assert_eq!(json, format!("\"{}\"", keys.public_key().to_hex()));
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), keys.public_key());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let keys = Keys::from_secret_hex(&hex::encode(secret(1))).unwrap();
        let debug = format!("{keys:?}");
        assert!(debug.contains("public_key"));
        assert!(!debug.contains(&hex::encode(secret(1))));
    }
}
