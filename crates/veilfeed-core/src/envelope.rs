//! Rumor, seal and gift-wrap layers.
//!
//! # Wrapping
//!
//! 1. [`build_rumor`]: unsigned kind-21 event carrying the view key
//! 2. [`seal`]: oracle encrypts the rumor JSON for the recipient and signs
//! 3. [`wrap`]: a fresh ephemeral key encrypts the seal JSON for the
//!    recipient and signs; the ephemeral secret is dropped afterwards
//!
//! # Opening
//!
//! [`open`] runs [`unwrap`] then [`unseal`]. Every check that fails produces
//! an event-local error; the caller drops the event and carries on.
//!
//! # Security
//!
//! - The seal is verified before wrapping, so an oracle that returns a
//!   mis-signed event cannot push garbage to a friend
//! - The rumor owner must equal the seal signer. Without this any identity
//!   could distribute a key claiming to be someone else's.

use tracing::{debug, trace};
use veilfeed_crypto::{PublicKey, ViewKey, nip44};
use veilfeed_proto::{Event, Kind, Tag, Timestamp, UnsignedEvent};

use crate::{
    env::{EntropyError, Environment},
    error::ProtocolError,
    keygen::generate_keys,
    oracle::{OracleError, SigningOracle},
};

/// A view-key rumor recovered from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rumor {
    /// Identity whose view key this is
    pub owner: PublicKey,
    /// When the owner built the rumor
    pub created_at: Timestamp,
    /// The distributed key
    pub view_key: ViewKey,
}

impl Rumor {
    /// Parse a rumor from its unsigned event form.
    ///
    /// # Errors
    ///
    /// - `NotAViewKeyRumor`: kind is not 21
    /// - `MalformedEnvelope`: missing or invalid `["key","view",..]` tag
    pub fn from_event(event: &UnsignedEvent) -> Result<Self, ProtocolError> {
        if event.kind != Kind::VIEW_KEY_RUMOR {
            return Err(ProtocolError::NotAViewKeyRumor { kind: event.kind });
        }

        let hex = event
            .tags
            .iter()
            .find_map(Tag::as_view_key_hex)
            .ok_or_else(|| ProtocolError::malformed("rumor has no view key tag"))?;
        let view_key = ViewKey::from_hex(hex)
            .map_err(|e| ProtocolError::malformed(format!("rumor view key: {e}")))?;

        Ok(Self { owner: event.pubkey, created_at: event.created_at, view_key })
    }

    /// Unsigned event form.
    pub fn to_event(&self) -> UnsignedEvent {
        build_rumor(self.owner, &self.view_key, self.created_at)
    }
}

/// Build the unsigned kind-21 rumor carrying `view_key`.
pub fn build_rumor(owner: PublicKey, view_key: &ViewKey, now: Timestamp) -> UnsignedEvent {
    UnsignedEvent::new(owner, now, Kind::VIEW_KEY_RUMOR, vec![Tag::view_key(view_key)], "")
}

/// Encrypt and sign a rumor for `recipient` through the oracle.
///
/// # Errors
///
/// - `OracleUnavailable`: no signer connected
/// - `EncryptionFailed`: oracle refused to encrypt
/// - `SigningFailed`: oracle refused to sign, or its signature does not
///   verify as `sender`
pub async fn seal(
    rumor: &UnsignedEvent,
    sender: &PublicKey,
    recipient: &PublicKey,
    oracle: &dyn SigningOracle,
    now: Timestamp,
) -> Result<Event, ProtocolError> {
    let plaintext =
        rumor.to_json().map_err(|e| ProtocolError::EncryptionFailed { reason: e.to_string() })?;
    let ciphertext = oracle.encrypt(recipient, &plaintext).await.map_err(|e| match e {
        OracleError::Unavailable => ProtocolError::OracleUnavailable,
        OracleError::Rejected { reason } => ProtocolError::EncryptionFailed { reason },
    })?;

    let unsigned =
        UnsignedEvent::new(*sender, now, Kind::SEAL, vec![Tag::pubkey(recipient)], ciphertext);
    let sealed = oracle.sign_event(unsigned).await.map_err(signing_error)?;

    if sealed.pubkey != *sender || sealed.kind != Kind::SEAL {
        return Err(ProtocolError::SigningFailed {
            reason: format!("oracle returned kind {} event by {}", sealed.kind, sealed.pubkey),
        });
    }
    sealed.verify().map_err(|e| ProtocolError::SigningFailed { reason: e.to_string() })?;

    debug!(seal = %sealed.id, recipient = %recipient, "sealed rumor");
    Ok(sealed)
}

/// Wrap a seal for `recipient` under a one-shot ephemeral key.
///
/// The conversation key is ephemeral secret × recipient public key, derived
/// locally. The ephemeral key is zeroized when this function returns.
///
/// # Errors
///
/// - `KeyGenerationFailed`: entropy source failed
/// - `EncryptionFailed`: conversation key or NIP-44 encryption failed
pub fn wrap<E: Environment>(
    seal: &Event,
    recipient: &PublicKey,
    env: &E,
    now: Timestamp,
) -> Result<Event, ProtocolError> {
    let ephemeral = generate_keys(env)?;
    let entropy = |e: EntropyError| ProtocolError::KeyGenerationFailed { reason: e.to_string() };
    let nonce = env.random_32().map_err(entropy)?;
    let aux = env.random_32().map_err(entropy)?;

    let key = ephemeral
        .conversation_key(recipient)
        .map_err(|e| ProtocolError::EncryptionFailed { reason: e.to_string() })?;
    let plaintext =
        seal.to_json().map_err(|e| ProtocolError::EncryptionFailed { reason: e.to_string() })?;
    let content = nip44::encrypt(plaintext.as_bytes(), &key, nonce)
        .map_err(|e| ProtocolError::EncryptionFailed { reason: e.to_string() })?;

    let wrapped = UnsignedEvent::new(
        ephemeral.public_key(),
        now,
        Kind::GIFT_WRAP,
        vec![Tag::pubkey(recipient)],
        content,
    )
    .sign_with(&ephemeral, &aux);

    debug!(wrap = %wrapped.id, recipient = %recipient, "wrapped seal");
    Ok(wrapped)
}

/// Remove the gift-wrap layer, returning the verified seal.
///
/// # Errors
///
/// - `MalformedEnvelope`: wrong kind, not addressed to `local`, empty
///   content, bad outer signature, inner event unparsable, not a seal, or
///   seal signature invalid
/// - `OracleUnavailable`: no signer connected
/// - `DecryptionFailed`: oracle could not decrypt
pub async fn unwrap(
    wrap: &Event,
    local: &PublicKey,
    oracle: &dyn SigningOracle,
) -> Result<Event, ProtocolError> {
    if wrap.kind != Kind::GIFT_WRAP {
        return Err(ProtocolError::malformed(format!("expected gift wrap, got kind {}", wrap.kind)));
    }
    if !wrap.is_addressed_to(local) {
        return Err(ProtocolError::malformed("gift wrap is not addressed to us"));
    }
    if wrap.content.is_empty() {
        return Err(ProtocolError::malformed("gift wrap has no content"));
    }
    wrap.verify().map_err(|e| ProtocolError::malformed(format!("gift wrap: {e}")))?;

    let json = oracle.decrypt(&wrap.pubkey, &wrap.content).await.map_err(decryption_error)?;
    let sealed =
        Event::from_json(&json).map_err(|e| ProtocolError::malformed(format!("seal: {e}")))?;

    if sealed.kind != Kind::SEAL {
        return Err(ProtocolError::malformed(format!("expected seal, got kind {}", sealed.kind)));
    }
    sealed.verify().map_err(|e| ProtocolError::malformed(format!("seal: {e}")))?;

    trace!(wrap = %wrap.id, seal = %sealed.id, "unwrapped gift wrap");
    Ok(sealed)
}

/// Remove the seal layer, returning the view-key rumor.
///
/// # Errors
///
/// - `MalformedEnvelope`: not a seal, rumor unparsable, missing view tag,
///   or rumor owner differs from the seal signer
/// - `NotAViewKeyRumor`: rumor kind is not 21
/// - `OracleUnavailable` / `DecryptionFailed`: oracle failure
pub async fn unseal(seal: &Event, oracle: &dyn SigningOracle) -> Result<Rumor, ProtocolError> {
    if seal.kind != Kind::SEAL {
        return Err(ProtocolError::malformed(format!("expected seal, got kind {}", seal.kind)));
    }

    let json = oracle.decrypt(&seal.pubkey, &seal.content).await.map_err(decryption_error)?;
    let event = UnsignedEvent::from_json(&json)
        .map_err(|e| ProtocolError::malformed(format!("rumor: {e}")))?;
    let rumor = Rumor::from_event(&event)?;

    if rumor.owner != seal.pubkey {
        return Err(ProtocolError::malformed(format!(
            "rumor owner {} does not match seal signer {}",
            rumor.owner, seal.pubkey
        )));
    }

    Ok(rumor)
}

/// Unwrap then unseal.
pub async fn open(
    wrap: &Event,
    local: &PublicKey,
    oracle: &dyn SigningOracle,
) -> Result<Rumor, ProtocolError> {
    let sealed = unwrap(wrap, local, oracle).await?;
    unseal(&sealed, oracle).await
}

fn signing_error(err: OracleError) -> ProtocolError {
    match err {
        OracleError::Unavailable => ProtocolError::OracleUnavailable,
        OracleError::Rejected { reason } => ProtocolError::SigningFailed { reason },
    }
}

fn decryption_error(err: OracleError) -> ProtocolError {
    match err {
        OracleError::Unavailable => ProtocolError::OracleUnavailable,
        OracleError::Rejected { reason } => ProtocolError::DecryptionFailed { reason },
    }
}

#[cfg(test)]
mod tests {
    use veilfeed_crypto::Keys;

    use super::*;
    use crate::{
        oracle::{LocalKeyOracle, NoSigner},
        test_support::TestEnv,
    };

    const NOW: Timestamp = 1_700_000_000;

    fn oracle(byte: u8) -> LocalKeyOracle<TestEnv> {
        let keys = Keys::from_secret_bytes(&[byte; 32]).unwrap();
        LocalKeyOracle::new(keys, TestEnv::new(u64::from(byte)))
    }

    fn pubkey(byte: u8) -> PublicKey {
        Keys::from_secret_bytes(&[byte; 32]).unwrap().public_key()
    }

    fn view_key() -> ViewKey {
        ViewKey::from_bytes([0x42; 32]).unwrap()
    }

    async fn gift_wrap(sender: u8, recipient: u8) -> Event {
        let rumor = build_rumor(pubkey(sender), &view_key(), NOW);
        let sealed = seal(&rumor, &pubkey(sender), &pubkey(recipient), &oracle(sender), NOW)
            .await
            .unwrap();
        wrap(&sealed, &pubkey(recipient), &TestEnv::new(99), NOW).unwrap()
    }

    #[test]
    fn rumor_shape() {
        let rumor = build_rumor(pubkey(1), &view_key(), NOW);

        assert_eq!(rumor.kind, Kind::VIEW_KEY_RUMOR);
        assert_eq!(rumor.content, "");
        assert_eq!(rumor.tags, vec![Tag::new(["key", "view", view_key().to_hex().as_str()])]);
        assert_eq!(Rumor::from_event(&rumor).unwrap().view_key, view_key());
    }

    #[tokio::test]
    async fn seal_is_signed_by_sender_and_hides_key() {
        let rumor = build_rumor(pubkey(1), &view_key(), NOW);
        let sealed = seal(&rumor, &pubkey(1), &pubkey(2), &oracle(1), NOW).await.unwrap();

        assert_eq!(sealed.kind, Kind::SEAL);
        assert_eq!(sealed.pubkey, pubkey(1));
        assert!(sealed.is_addressed_to(&pubkey(2)));
        assert!(!sealed.content.contains(&view_key().to_hex()));
    }

    #[tokio::test]
    async fn wrap_is_signed_by_ephemeral_key() {
        let wrapped = gift_wrap(1, 2).await;

        assert_eq!(wrapped.kind, Kind::GIFT_WRAP);
        assert_ne!(wrapped.pubkey, pubkey(1));
        assert_ne!(wrapped.pubkey, pubkey(2));
        assert_eq!(wrapped.addressees().collect::<Vec<_>>(), vec![pubkey(2)]);
        assert_eq!(wrapped.verify(), Ok(()));
    }

    #[tokio::test]
    async fn round_trip() {
        let wrapped = gift_wrap(1, 2).await;
        let rumor = open(&wrapped, &pubkey(2), &oracle(2)).await.unwrap();

        assert_eq!(rumor.owner, pubkey(1));
        assert_eq!(rumor.view_key, view_key());
        assert_eq!(rumor.created_at, NOW);
    }

    #[tokio::test]
    async fn self_share_round_trip() {
        let wrapped = gift_wrap(1, 1).await;
        let rumor = open(&wrapped, &pubkey(1), &oracle(1)).await.unwrap();

        assert_eq!(rumor.owner, pubkey(1));
    }

    #[tokio::test]
    async fn seal_without_oracle_is_unavailable() {
        let rumor = build_rumor(pubkey(1), &view_key(), NOW);
        let result = seal(&rumor, &pubkey(1), &pubkey(2), &NoSigner, NOW).await;

        assert_eq!(result, Err(ProtocolError::OracleUnavailable));
    }

    #[tokio::test]
    async fn seal_for_wrong_sender_fails_signing() {
        // Oracle 1 refuses to sign an event claiming sender 3
        let rumor = build_rumor(pubkey(3), &view_key(), NOW);
        let result = seal(&rumor, &pubkey(3), &pubkey(2), &oracle(1), NOW).await;

        assert!(matches!(result, Err(ProtocolError::SigningFailed { .. })));
    }

    #[tokio::test]
    async fn wrap_without_entropy_fails() {
        let rumor = build_rumor(pubkey(1), &view_key(), NOW);
        let sealed = seal(&rumor, &pubkey(1), &pubkey(2), &oracle(1), NOW).await.unwrap();

        assert!(matches!(
            wrap(&sealed, &pubkey(2), &TestEnv::failing(), NOW),
            Err(ProtocolError::KeyGenerationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_recipient_is_malformed() {
        let wrapped = gift_wrap(1, 2).await;
        let result = open(&wrapped, &pubkey(3), &oracle(3)).await;

        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope { .. })));
    }

    #[tokio::test]
    async fn wrong_kind_is_malformed() {
        let wrapped = gift_wrap(1, 2).await;
        let rumor = open(&wrapped, &pubkey(2), &oracle(2)).await;
        assert!(rumor.is_ok());

        let mut post = wrapped;
        post.kind = Kind::ENCRYPTED_POST;
        let result = unwrap(&post, &pubkey(2), &oracle(2)).await;
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope { .. })));
    }

    #[tokio::test]
    async fn tampered_wrap_is_rejected() {
        let mut wrapped = gift_wrap(1, 2).await;
        wrapped.created_at += 1;

        let result = open(&wrapped, &pubkey(2), &oracle(2)).await;
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope { .. })));
    }

    #[tokio::test]
    async fn recipient_with_wrong_key_cannot_decrypt() {
        // Addressed to 2 but opened by identity 3 claiming to be 2
        let wrapped = gift_wrap(1, 2).await;
        let result = open(&wrapped, &pubkey(2), &oracle(3)).await;

        assert!(matches!(result, Err(ProtocolError::DecryptionFailed { .. })));
    }

    #[tokio::test]
    async fn non_view_key_rumor_is_reported() {
        let mut rumor = build_rumor(pubkey(1), &view_key(), NOW);
        rumor.kind = Kind(14);
        let sealed = seal(&rumor, &pubkey(1), &pubkey(2), &oracle(1), NOW).await.unwrap();
        let wrapped = wrap(&sealed, &pubkey(2), &TestEnv::new(5), NOW).unwrap();

        let result = open(&wrapped, &pubkey(2), &oracle(2)).await;
        assert_eq!(result, Err(ProtocolError::NotAViewKeyRumor { kind: Kind(14) }));
    }

    #[tokio::test]
    async fn rumor_without_view_tag_is_malformed() {
        let mut rumor = build_rumor(pubkey(1), &view_key(), NOW);
        rumor.tags.clear();
        let sealed = seal(&rumor, &pubkey(1), &pubkey(2), &oracle(1), NOW).await.unwrap();
        let wrapped = wrap(&sealed, &pubkey(2), &TestEnv::new(5), NOW).unwrap();

        let result = open(&wrapped, &pubkey(2), &oracle(2)).await;
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope { .. })));
    }

    #[tokio::test]
    async fn rumor_for_someone_else_is_rejected() {
        // Identity 1 seals a rumor claiming to be identity 3's key
        let rumor = build_rumor(pubkey(3), &view_key(), NOW);
        let ciphertext = oracle(1).encrypt(&pubkey(2), &rumor.to_json().unwrap()).await.unwrap();
        let tags = vec![Tag::pubkey(&pubkey(2))];
        let forged = oracle(1)
            .sign_event(UnsignedEvent::new(pubkey(1), NOW, Kind::SEAL, tags, ciphertext))
            .await
            .unwrap();
        let wrapped = wrap(&forged, &pubkey(2), &TestEnv::new(5), NOW).unwrap();

        let result = open(&wrapped, &pubkey(2), &oracle(2)).await;
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope { .. })));
    }

    #[tokio::test]
    async fn each_wrap_uses_a_new_ephemeral_key() {
        let rumor = build_rumor(pubkey(1), &view_key(), NOW);
        let sealed = seal(&rumor, &pubkey(1), &pubkey(2), &oracle(1), NOW).await.unwrap();
        let env = TestEnv::new(5);

        let first = wrap(&sealed, &pubkey(2), &env, NOW).unwrap();
        let second = wrap(&sealed, &pubkey(2), &env, NOW).unwrap();
        assert_ne!(first.pubkey, second.pubkey);
    }

    #[tokio::test]
    async fn opening_without_oracle_is_unavailable() {
        let wrapped = gift_wrap(1, 2).await;
        let result = open(&wrapped, &pubkey(2), &NoSigner).await;
        assert_eq!(result, Err(ProtocolError::OracleUnavailable));
    }
}
