//! Event tags
//!
//! A tag is a JSON array of strings whose first element names it. Only two
//! shapes carry meaning here: `["p", <pubkey hex>]` addresses an event and
//! `["key", "view", <view key hex>]` carries a view key inside a rumor.

use serde::{Deserialize, Serialize};
use veilfeed_crypto::{PublicKey, ViewKey};

/// Name of the addressee tag
pub const PUBKEY_TAG: &str = "p";

/// Name of the key tag
pub const KEY_TAG: &str = "key";

/// Second element of a key tag that carries a view key
pub const VIEW_MARKER: &str = "view";

/// A single event tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Vec<String>);

impl Tag {
    /// Build a tag from raw parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// `["p", <pubkey>]`
    pub fn pubkey(pubkey: &PublicKey) -> Self {
        Self(vec![PUBKEY_TAG.to_string(), pubkey.to_hex()])
    }

    /// `["key", "view", <view key hex>]`
    pub fn view_key(view_key: &ViewKey) -> Self {
        Self(vec![KEY_TAG.to_string(), VIEW_MARKER.to_string(), view_key.to_hex()])
    }

    /// Tag name, if the tag is non-empty.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Raw tag elements.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Addressee of a well-formed `p` tag.
    ///
    /// Returns `None` for other tags and for `p` tags whose value is not a
    /// valid key.
    pub fn as_pubkey(&self) -> Option<PublicKey> {
        match self.0.as_slice() {
            [name, value, ..] if name == PUBKEY_TAG => PublicKey::from_hex(value).ok(),
            _ => None,
        }
    }

    /// Hex payload of a `["key", "view", ..]` tag.
    pub fn as_view_key_hex(&self) -> Option<&str> {
        match self.0.as_slice() {
            [name, marker, value, ..] if name == KEY_TAG && marker == VIEW_MARKER => {
                Some(value.as_str())
            },
            _ => None,
        }
    }
}
