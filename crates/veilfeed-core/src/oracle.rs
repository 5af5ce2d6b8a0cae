//! Signing oracle boundary.
//!
//! The identity secret lives behind this trait. In a browser it is an
//! extension; in the CLI and tests it is [`LocalKeyOracle`]. Protocol code
//! only ever asks it to sign events and to run NIP-44 against a partner key.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use veilfeed_crypto::{Keys, PublicKey, nip44};
use veilfeed_proto::{Event, UnsignedEvent};

use crate::env::Environment;

/// Errors returned by a signing oracle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No signer is connected
    #[error("signing oracle unavailable")]
    Unavailable,

    /// The signer refused or failed the request
    #[error("oracle rejected request: {reason}")]
    Rejected {
        /// Signer-provided reason
        reason: String,
    },
}

/// External capability holding the identity secret.
///
/// # Invariants
///
/// - `sign_event` returns an event authored by `public_key()`
/// - `encrypt(p, m)` under identity A is decryptable by `decrypt(A, ..)`
///   under identity P (NIP-44 conversation keys are symmetric)
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// Public key of the identity.
    async fn public_key(&self) -> Result<PublicKey, OracleError>;

    /// Compute the id and signature of `event`.
    async fn sign_event(&self, event: UnsignedEvent) -> Result<Event, OracleError>;

    /// NIP-44 encrypt `plaintext` for `partner`.
    async fn encrypt(&self, partner: &PublicKey, plaintext: &str) -> Result<String, OracleError>;

    /// NIP-44 decrypt a payload received from `partner`.
    async fn decrypt(&self, partner: &PublicKey, ciphertext: &str) -> Result<String, OracleError>;
}

/// Oracle backed by an in-process secret key.
///
/// Nonces and Schnorr aux randomness come from the environment, so a seeded
/// environment yields byte-identical output.
pub struct LocalKeyOracle<E: Environment> {
    keys: Keys,
    env: E,
}

impl<E: Environment> LocalKeyOracle<E> {
    /// Wrap a key pair.
    pub fn new(keys: Keys, env: E) -> Self {
        Self { keys, env }
    }

    fn draw(&self) -> Result<[u8; 32], OracleError> {
        self.env.random_32().map_err(|e| OracleError::Rejected { reason: e.to_string() })
    }
}

impl<E: Environment> std::fmt::Debug for LocalKeyOracle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyOracle").field("keys", &self.keys).finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: Environment> SigningOracle for LocalKeyOracle<E> {
    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        Ok(self.keys.public_key())
    }

    async fn sign_event(&self, event: UnsignedEvent) -> Result<Event, OracleError> {
        if event.pubkey != self.keys.public_key() {
            return Err(OracleError::Rejected {
                reason: format!("refusing to sign for foreign author {}", event.pubkey),
            });
        }

        let aux = self.draw()?;
        let signed = event.sign_with(&self.keys, &aux);
        debug!(id = %signed.id, kind = %signed.kind, "signed event");
        Ok(signed)
    }

    async fn encrypt(&self, partner: &PublicKey, plaintext: &str) -> Result<String, OracleError> {
        let key = self
            .keys
            .conversation_key(partner)
            .map_err(|e| OracleError::Rejected { reason: e.to_string() })?;
        let nonce = self.draw()?;

        nip44::encrypt(plaintext.as_bytes(), &key, nonce)
            .map_err(|e| OracleError::Rejected { reason: e.to_string() })
    }

    async fn decrypt(&self, partner: &PublicKey, ciphertext: &str) -> Result<String, OracleError> {
        let key = self
            .keys
            .conversation_key(partner)
            .map_err(|e| OracleError::Rejected { reason: e.to_string() })?;
        let plaintext = nip44::decrypt(ciphertext, &key)
            .map_err(|e| OracleError::Rejected { reason: e.to_string() })?;

        String::from_utf8(plaintext)
            .map_err(|_| OracleError::Rejected { reason: "plaintext is not UTF-8".to_string() })
    }
}

/// Oracle for a session with no signer connected.
///
/// Every request fails with [`OracleError::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSigner;

#[async_trait]
impl SigningOracle for NoSigner {
    async fn public_key(&self) -> Result<PublicKey, OracleError> {
        Err(OracleError::Unavailable)
    }

    async fn sign_event(&self, _event: UnsignedEvent) -> Result<Event, OracleError> {
        Err(OracleError::Unavailable)
    }

    async fn encrypt(&self, _partner: &PublicKey, _plaintext: &str) -> Result<String, OracleError> {
        Err(OracleError::Unavailable)
    }

    async fn decrypt(
        &self,
        _partner: &PublicKey,
        _ciphertext: &str,
    ) -> Result<String, OracleError> {
        Err(OracleError::Unavailable)
    }
}
