//! NIP-44 v2 payload encryption
//!
//! All functions are pure - the 32-byte nonce must be provided by the caller.
//!
//! # Payload layout
//!
//! ```text
//! base64( 0x02 || nonce[32] || ChaCha20(padded plaintext) || HMAC-SHA256[32] )
//! ```
//!
//! The padded plaintext is `u16 BE length || plaintext || zeros`, rounded up
//! to the NIP-44 bucket size so ciphertext length leaks only the bucket.

use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20::{
    ChaCha20, Key, Nonce,
    cipher::{KeyIvInit, StreamCipher},
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use secp256k1::{SecretKey, ecdh};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{
    error::{CipherError, KeyError},
    keys::PublicKey,
};

type HmacSha256 = Hmac<Sha256>;

/// Salt for conversation key extraction
const CONVERSATION_SALT: &[u8] = b"nip44-v2";

/// Payload version byte
const VERSION: u8 = 2;

/// Size of the per-payload nonce (32 bytes)
pub const NONCE_SIZE: usize = 32;

/// HMAC-SHA256 tag size (32 bytes)
const MAC_SIZE: usize = 32;

/// Smallest plaintext NIP-44 accepts
pub const MIN_PLAINTEXT_SIZE: usize = 1;

/// Largest plaintext NIP-44 accepts
pub const MAX_PLAINTEXT_SIZE: usize = 65535;

/// Bounds on the base64 payload and its decoded form
const MIN_PAYLOAD_LEN: usize = 132;
const MAX_PAYLOAD_LEN: usize = 87472;
const MIN_DECODED_LEN: usize = 99;
const MAX_DECODED_LEN: usize = 65603;

/// Symmetric key shared by two parties (or by a view key with itself).
///
/// Derived once per key pair; every payload derives fresh message keys from
/// it and its nonce.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversationKey([u8; 32]);

impl ConversationKey {
    /// Wrap raw key bytes (e.g. from a test vector).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConversationKey(..)")
    }
}

impl Drop for ConversationKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Per-payload keys expanded from the conversation key and nonce.
struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

impl Drop for MessageKeys {
    fn drop(&mut self) {
        self.chacha_key.zeroize();
        self.chacha_nonce.zeroize();
        self.hmac_key.zeroize();
    }
}

/// Derive the conversation key between `secret` and `partner`.
///
/// Symmetric: `conversation_key(a, B) == conversation_key(b, A)`.
pub(crate) fn conversation_key(
    secret: &SecretKey,
    partner: &PublicKey,
) -> Result<ConversationKey, KeyError> {
    let mut shared_point = ecdh::shared_secret_point(&partner.to_even_point()?, secret);

    let (prk, _) = Hkdf::<Sha256>::extract(Some(CONVERSATION_SALT), &shared_point[..32]);
    shared_point.zeroize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&prk);
    Ok(ConversationKey(key))
}

/// Encrypt `plaintext` into a base64 NIP-44 v2 payload.
///
/// # Errors
///
/// - `InvalidPlaintextLength`: plaintext is empty or longer than 65535 bytes
///
/// # Security
///
/// Caller MUST provide a fresh, cryptographically random nonce per payload.
/// Reusing a nonce under the same conversation key reuses the keystream.
pub fn encrypt(
    plaintext: &[u8],
    key: &ConversationKey,
    nonce: [u8; NONCE_SIZE],
) -> Result<String, CipherError> {
    let mut buffer = pad(plaintext)?;
    let keys = message_keys(key, &nonce)?;

    let mut cipher =
        ChaCha20::new(Key::from_slice(&keys.chacha_key), Nonce::from_slice(&keys.chacha_nonce));
    cipher.apply_keystream(&mut buffer);

    let mac = compute_mac(&keys.hmac_key, &nonce, &buffer)?;

    let mut payload = Vec::with_capacity(1 + NONCE_SIZE + buffer.len() + MAC_SIZE);
    payload.push(VERSION);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&buffer);
    payload.extend_from_slice(&mac);

    Ok(STANDARD.encode(payload))
}

/// Decrypt a base64 NIP-44 v2 payload.
///
/// # Errors
///
/// - `InvalidPayload`: bad length or base64
/// - `UnsupportedVersion`: version byte other than 2 (including the `#`
///   non-base64 version marker)
/// - `DecryptionFailed`: MAC mismatch (wrong key or tampering) or invalid
///   padding
pub fn decrypt(payload: &str, key: &ConversationKey) -> Result<Vec<u8>, CipherError> {
    if payload.starts_with('#') {
        return Err(CipherError::UnsupportedVersion(b'#'));
    }

    if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&payload.len()) {
        return Err(CipherError::InvalidPayload {
            reason: format!("payload length {} out of range", payload.len()),
        });
    }

    let data = STANDARD
        .decode(payload)
        .map_err(|e| CipherError::InvalidPayload { reason: format!("invalid base64: {e}") })?;

    if !(MIN_DECODED_LEN..=MAX_DECODED_LEN).contains(&data.len()) {
        return Err(CipherError::InvalidPayload {
            reason: format!("decoded length {} out of range", data.len()),
        });
    }

    if data[0] != VERSION {
        return Err(CipherError::UnsupportedVersion(data[0]));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&data[1..=NONCE_SIZE]);
    let ciphertext = &data[1 + NONCE_SIZE..data.len() - MAC_SIZE];
    let mac = &data[data.len() - MAC_SIZE..];

    let keys = message_keys(key, &nonce)?;
    verify_mac(&keys.hmac_key, &nonce, ciphertext, mac)?;

    let mut buffer = ciphertext.to_vec();
    let mut cipher =
        ChaCha20::new(Key::from_slice(&keys.chacha_key), Nonce::from_slice(&keys.chacha_nonce));
    cipher.apply_keystream(&mut buffer);

    let plaintext = unpad(&buffer);
    buffer.zeroize();
    plaintext
}

/// Expand chacha key, chacha nonce and hmac key from the conversation key.
fn message_keys(
    key: &ConversationKey,
    nonce: &[u8; NONCE_SIZE],
) -> Result<MessageKeys, CipherError> {
    let hkdf = Hkdf::<Sha256>::from_prk(&key.0)
        .map_err(|e| CipherError::KeyDerivation { reason: e.to_string() })?;

    let mut okm = [0u8; 76];
    hkdf.expand(nonce, &mut okm)
        .map_err(|e| CipherError::KeyDerivation { reason: e.to_string() })?;

    let mut keys =
        MessageKeys { chacha_key: [0u8; 32], chacha_nonce: [0u8; 12], hmac_key: [0u8; 32] };
    keys.chacha_key.copy_from_slice(&okm[0..32]);
    keys.chacha_nonce.copy_from_slice(&okm[32..44]);
    keys.hmac_key.copy_from_slice(&okm[44..76]);
    okm.zeroize();

    Ok(keys)
}

fn compute_mac(
    hmac_key: &[u8; 32],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<[u8; MAC_SIZE], CipherError> {
    let mut mac = hmac_with_key(hmac_key)?;
    mac.update(nonce);
    mac.update(ciphertext);

    let mut tag = [0u8; MAC_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

fn verify_mac(
    hmac_key: &[u8; 32],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<(), CipherError> {
    let mut mac = hmac_with_key(hmac_key)?;
    mac.update(nonce);
    mac.update(ciphertext);

    mac.verify_slice(tag)
        .map_err(|_| CipherError::DecryptionFailed { reason: "invalid MAC".to_string() })
}

fn hmac_with_key(hmac_key: &[u8; 32]) -> Result<HmacSha256, CipherError> {
    <HmacSha256 as Mac>::new_from_slice(hmac_key)
        .map_err(|e| CipherError::KeyDerivation { reason: e.to_string() })
}

/// Padded length for a plaintext of `unpadded_len` bytes (excluding the
/// 2-byte length prefix).
fn padded_len(unpadded_len: usize) -> usize {
    if unpadded_len <= 32 {
        return 32;
    }

    let next_power = 1usize << (usize::BITS - (unpadded_len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };

    chunk * ((unpadded_len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT_SIZE..=MAX_PLAINTEXT_SIZE).contains(&len) {
        return Err(CipherError::InvalidPlaintextLength { len });
    }

    let total = 2 + padded_len(len);
    let mut padded = Vec::with_capacity(total);
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(total, 0);

    Ok(padded)
}

fn unpad(padded: &[u8]) -> Result<Vec<u8>, CipherError> {
    let invalid = || CipherError::DecryptionFailed { reason: "invalid padding".to_string() };

    if padded.len() < 2 {
        return Err(invalid());
    }

    let len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if len == 0 || padded.len() != 2 + padded_len(len) {
        return Err(invalid());
    }

    Ok(padded[2..2 + len].to_vec())
}
