//! Signed and unsigned events

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::Value;
use sha2::{Digest, Sha256};
use veilfeed_crypto::{Keys, KeyError, PublicKey, Signature, verify_schnorr};

use crate::{error::EventError, tag::Tag};

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Event kind number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(pub u16);

impl Kind {
    /// Unsigned rumor carrying a view key
    pub const VIEW_KEY_RUMOR: Self = Self(21);
    /// Seal: encrypted rumor signed by the real sender
    pub const SEAL: Self = Self(13);
    /// Gift wrap: encrypted seal signed by a one-shot key
    pub const GIFT_WRAP: Self = Self(1059);
    /// Post encrypted under the author's view key
    pub const ENCRYPTED_POST: Self = Self(9876);

    /// Kind number.
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte event id, hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId([u8; 32]);

impl EventId {
    /// Wrap raw id bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text).map_err(|e| KeyError::InvalidHex { reason: e.to_string() })?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: 32, actual: bytes.len() })?;
        Ok(Self(array))
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.to_hex())
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(de::Error::custom)
    }
}

/// An event before signing.
///
/// Rumors stay in this form for their whole life: they are serialized
/// without `id` or `sig` and only ever travel encrypted. Unknown fields
/// (including an `id` added by other clients) are ignored when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    /// Author identity
    pub pubkey: PublicKey,
    /// Creation time
    pub created_at: Timestamp,
    /// Event kind
    pub kind: Kind,
    /// Tags
    pub tags: Vec<Tag>,
    /// Content (ciphertext for every kind used here, empty for rumors)
    pub content: String,
}

impl UnsignedEvent {
    /// Create an unsigned event.
    pub fn new(
        pubkey: PublicKey,
        created_at: Timestamp,
        kind: Kind,
        tags: Vec<Tag>,
        content: impl Into<String>,
    ) -> Self {
        Self { pubkey, created_at, kind, tags, content: content.into() }
    }

    /// Event id: SHA-256 of `[0, pubkey, created_at, kind, tags, content]`.
    pub fn id(&self) -> EventId {
        compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Sign with an in-process key.
    ///
    /// The event's `pubkey` is replaced by the signer's key so the result
    /// always verifies.
    pub fn sign_with(mut self, keys: &Keys, aux_rand: &[u8; 32]) -> Event {
        self.pubkey = keys.public_key();
        let id = self.id();
        let sig = keys.sign_schnorr(id.as_bytes(), aux_rand);

        Event {
            id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }

    /// Compact JSON form.
    ///
    /// # Errors
    ///
    /// - `Encode`: the serializer failed
    pub fn to_json(&self) -> Result<String, EventError> {
        encode_json(self)
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// - `Malformed`: not JSON, missing fields, or fields of the wrong type
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).map_err(|e| EventError::Malformed { reason: e.to_string() })
    }
}

/// A signed event as stored and relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Content hash
    pub id: EventId,
    /// Author identity
    pub pubkey: PublicKey,
    /// Creation time
    pub created_at: Timestamp,
    /// Event kind
    pub kind: Kind,
    /// Tags
    pub tags: Vec<Tag>,
    /// Content
    pub content: String,
    /// Schnorr signature over `id`
    pub sig: Signature,
}

impl Event {
    /// Check the id against the content and the signature against the author.
    ///
    /// # Errors
    ///
    /// - `IdMismatch`: any field was altered after signing
    /// - `InvalidSignature`: signature does not verify for `pubkey`
    pub fn verify(&self) -> Result<(), EventError> {
        let computed =
            compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content);
        if computed != self.id {
            return Err(EventError::IdMismatch {
                claimed: self.id.to_hex(),
                computed: computed.to_hex(),
            });
        }

        verify_schnorr(&self.pubkey, self.id.as_bytes(), &self.sig)?;
        Ok(())
    }

    /// Public keys named by well-formed `p` tags, in tag order.
    pub fn addressees(&self) -> impl Iterator<Item = PublicKey> + '_ {
        self.tags.iter().filter_map(Tag::as_pubkey)
    }

    /// Whether a `p` tag names `pubkey`.
    pub fn is_addressed_to(&self, pubkey: &PublicKey) -> bool {
        self.addressees().any(|p| p == *pubkey)
    }

    /// Compact JSON form.
    ///
    /// # Errors
    ///
    /// - `Encode`: the serializer failed
    pub fn to_json(&self) -> Result<String, EventError> {
        encode_json(self)
    }

    /// Parse from JSON without verifying.
    ///
    /// # Errors
    ///
    /// - `Malformed`: not JSON, missing fields, or fields of the wrong type
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).map_err(|e| EventError::Malformed { reason: e.to_string() })
    }
}

fn compute_id(
    pubkey: &PublicKey,
    created_at: Timestamp,
    kind: Kind,
    tags: &[Tag],
    content: &str,
) -> EventId {
    let tags = tags
        .iter()
        .map(|tag| Value::Array(tag.as_slice().iter().cloned().map(Value::String).collect()))
        .collect();
    let canonical = Value::Array(vec![
        Value::from(0u8),
        Value::String(pubkey.to_hex()),
        Value::from(created_at),
        Value::from(kind.0),
        Value::Array(tags),
        Value::String(content.to_owned()),
    ]);

    EventId(Sha256::digest(canonical.to_string().as_bytes()).into())
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, EventError> {
    serde_json::to_string(value).map_err(|e| EventError::Encode { reason: e.to_string() })
}
