//! Post encryption under a view key
//!
//! The conversation key is the view key agreeing with its own public point.
//! Any holder of the raw view key reconstructs it without the author's
//! identity secret, which is what lets friends read posts.

use crate::{
    error::{CipherError, KeyError},
    keys::Keys,
    nip44::{self, ConversationKey, NONCE_SIZE},
    view_key::ViewKey,
};

/// Conversation key for posts encrypted under `view_key`.
///
/// Deterministic: the same view key always yields the same key.
pub fn conversation_key_for(view_key: &ViewKey) -> Result<ConversationKey, KeyError> {
    let keys = Keys::from_secret_bytes(view_key.as_bytes())?;
    keys.conversation_key(&keys.public_key())
}

/// Encrypt a post body. Returns the base64 NIP-44 payload.
///
/// # Errors
///
/// - `InvalidPlaintextLength`: empty body or longer than 65535 bytes
pub fn encrypt_post(
    plaintext: &str,
    view_key: &ViewKey,
    nonce: [u8; NONCE_SIZE],
) -> Result<String, CipherError> {
    let key = conversation_key_for(view_key)?;
    nip44::encrypt(plaintext.as_bytes(), &key, nonce)
}

/// Decrypt a post body.
///
/// Wrong keys and corrupted payloads are reported as errors, never as
/// garbage plaintext.
pub fn decrypt_post(ciphertext: &str, view_key: &ViewKey) -> Result<String, CipherError> {
    let key = conversation_key_for(view_key)?;
    let plaintext = nip44::decrypt(ciphertext, &key)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::DecryptionFailed {
        reason: "plaintext is not valid UTF-8".to_string(),
    })
}
