//! Fuzz target for NIP-44 payload decoding
//!
//! Feeds arbitrary text to `nip44::decrypt` and `decrypt_post`, and
//! mutates valid payloads to exercise the MAC and padding checks.
//!
//! # Invariants
//!
//! - Decoding never panics
//! - A payload that was modified never decrypts

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use veilfeed_crypto::{ViewKey, conversation_key_for, decrypt_post, encrypt_post, nip44};

#[derive(Debug, Arbitrary)]
struct Input {
    text: String,
    plaintext: String,
    nonce: [u8; 32],
    flip_at: usize,
    flip_bits: u8,
}

fuzz_target!(|input: Input| {
    let Ok(view_key) = ViewKey::from_bytes([0x42; 32]) else {
        return;
    };
    let Ok(key) = conversation_key_for(&view_key) else {
        return;
    };

    let _ = nip44::decrypt(&input.text, &key);
    let _ = decrypt_post(&input.text, &view_key);

    let Ok(payload) = encrypt_post(&input.plaintext, &view_key, input.nonce) else {
        return;
    };
    assert_eq!(decrypt_post(&payload, &view_key).ok().as_deref(), Some(input.plaintext.as_str()));

    if input.flip_bits == 0 {
        return;
    }
    let mut bytes = payload.into_bytes();
    let index = input.flip_at % bytes.len();
    bytes[index] ^= input.flip_bits;
    if let Ok(tampered) = String::from_utf8(bytes) {
        // Base64 padding bits can change without changing the decoded bytes
        if let Ok(plaintext) = decrypt_post(&tampered, &view_key) {
            assert_eq!(plaintext, input.plaintext);
        }
    }
});
