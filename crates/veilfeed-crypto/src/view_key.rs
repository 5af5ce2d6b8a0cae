//! View keys: per-identity symmetric secrets for post encryption

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::{error::KeyError, keys::Keys};

/// Size of a view key in bytes
pub const VIEW_KEY_SIZE: usize = 32;

/// A 32-byte secret an identity uses to encrypt its own posts.
///
/// Friends receive a copy through the gift-wrap protocol; anyone holding it
/// can read every post of that identity.
///
/// # Invariants
///
/// - Always a valid secp256k1 scalar, because the post cipher uses it as a
///   private key for its self-agreement
/// - Zeroized on drop; never printed by `Debug`
#[derive(Clone)]
pub struct ViewKey([u8; VIEW_KEY_SIZE]);

impl ViewKey {
    /// Build a view key from freshly drawn random bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidSecretKey`: the bytes are zero or not below the curve order.
    ///   Callers draw new bytes and try again; for uniform input this is
    ///   practically unreachable.
    pub fn from_bytes(bytes: [u8; VIEW_KEY_SIZE]) -> Result<Self, KeyError> {
        Keys::from_secret_bytes(&bytes)?;
        Ok(Self(bytes))
    }

    /// Parse the 64-character hex form carried in view-key rumors.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let mut bytes =
            hex::decode(text).map_err(|e| KeyError::InvalidHex { reason: e.to_string() })?;

        let result = match <[u8; VIEW_KEY_SIZE]>::try_from(bytes.as_slice()) {
            Ok(array) => Self::from_bytes(array),
            Err(_) => Err(KeyError::InvalidLength { expected: VIEW_KEY_SIZE, actual: bytes.len() }),
        };

        bytes.zeroize();
        result
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; VIEW_KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for ViewKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for ViewKey {}

impl fmt::Debug for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewKey(..)")
    }
}

impl Drop for ViewKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
