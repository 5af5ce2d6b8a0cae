//! veilfeed Cryptographic Primitives
//!
//! Cryptographic building blocks for veilfeed. Pure functions with
//! deterministic outputs. Callers provide random bytes (nonces, candidate
//! secret keys) for deterministic testing.
//!
//! # Key Hierarchy
//!
//! Two independent uses of the same NIP-44 v2 cipher sit on top of secp256k1
//! key agreement:
//!
//! ```text
//! Identity secret ──┐                         View key (32 random bytes)
//!                   │ ECDH(partner)                 │ ECDH(own public point)
//!                   ▼                               ▼
//!        HKDF-extract("nip44-v2")        HKDF-extract("nip44-v2")
//!                   │                               │
//!                   ▼                               ▼
//!      Conversation Key (seal/wrap)       Conversation Key (posts)
//!                   │                               │
//!                   └──────── HKDF-expand(nonce) ───┘
//!                                   │
//!                                   ▼
//!                  ChaCha20 + HMAC-SHA256 → base64 payload
//! ```
//!
//! The post conversation key is a self-agreement: the view key agrees with
//! its own public point, so any holder of the raw view key derives the same
//! key without the author's identity secret.
//!
//! # Security
//!
//! Confidentiality:
//! - Every payload uses a fresh caller-provided 32-byte nonce
//! - Plaintext length is hidden up to the NIP-44 padding bucket
//!
//! Authenticity:
//! - HMAC-SHA256 over (nonce, ciphertext) is verified in constant time before
//!   any decryption
//! - Failed MAC -> reject payload
//!
//! Key hygiene:
//! - View keys, conversation keys and message keys are zeroized on drop
//! - View key equality is constant-time

#![forbid(unsafe_code)]

pub mod error;
pub mod keys;
pub mod nip44;
pub mod post_cipher;
pub mod view_key;

pub use error::{CipherError, KeyError};
pub use keys::{Keys, PublicKey, Signature, verify_schnorr};
pub use nip44::{ConversationKey, NONCE_SIZE};
pub use post_cipher::{conversation_key_for, decrypt_post, encrypt_post};
pub use view_key::{VIEW_KEY_SIZE, ViewKey};
