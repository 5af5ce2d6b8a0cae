//! Subscription filters
//!
//! A filter is a conjunction: an event matches when it passes every field
//! that is set. Sets are disjunctions within one field. `authors: Some([])`
//! is kept distinct from `None` because relays treat an empty author list
//! as "match nothing", which is what a feed with no friends should see.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use veilfeed_crypto::PublicKey;

use crate::event::{Event, Kind, Timestamp};

/// NIP-01 subscription filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Accepted kinds (empty accepts any)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub kinds: BTreeSet<Kind>,

    /// Accepted authors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<BTreeSet<PublicKey>>,

    /// Accepted `p` tag values
    #[serde(rename = "#p", default, skip_serializing_if = "Option::is_none")]
    pub addressed_to: Option<BTreeSet<PublicKey>>,

    /// Oldest accepted `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,

    /// Maximum number of stored events to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Filter that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `kind`.
    #[must_use]
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Accept events by any of `authors`. An empty iterator matches nothing.
    #[must_use]
    pub fn authors(mut self, authors: impl IntoIterator<Item = PublicKey>) -> Self {
        self.authors.get_or_insert_with(BTreeSet::new).extend(authors);
        self
    }

    /// Accept events with a `p` tag naming `pubkey`.
    #[must_use]
    pub fn addressed_to(mut self, pubkey: PublicKey) -> Self {
        self.addressed_to.get_or_insert_with(BTreeSet::new).insert(pubkey);
        self
    }

    /// Accept events created at or after `since`.
    #[must_use]
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Cap the number of stored events returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` passes this filter. `limit` does not affect matching.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }

        let author_ok = self.authors.as_ref().is_none_or(|authors| authors.contains(&event.pubkey));
        let addressee_ok = self
            .addressed_to
            .as_ref()
            .is_none_or(|addressees| event.addressees().any(|p| addressees.contains(&p)));
        let since_ok = self.since.is_none_or(|since| event.created_at >= since);

        author_ok && addressee_ok && since_ok
    }
}

#[cfg(test)]
mod tests {
    use veilfeed_crypto::Keys;

    use super::*;
    use crate::{event::UnsignedEvent, tag::Tag};

    fn keys(byte: u8) -> Keys {
        Keys::from_secret_bytes(&[byte; 32]).unwrap()
    }

    fn event(author: &Keys, kind: Kind, created_at: Timestamp, to: Option<PublicKey>) -> Event {
        let tags = to.iter().map(Tag::pubkey).collect();
        UnsignedEvent::new(author.public_key(), created_at, kind, tags, "x")
            .sign_with(author, &[0; 32])
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&event(&keys(1), Kind(1), 0, None)));
    }

    #[test]
    fn kind_filter() {
        let filter = Filter::new().kind(Kind::GIFT_WRAP);

        assert!(filter.matches(&event(&keys(1), Kind::GIFT_WRAP, 0, None)));
        assert!(!filter.matches(&event(&keys(1), Kind::ENCRYPTED_POST, 0, None)));
    }

    #[test]
    fn author_filter() {
        let filter = Filter::new().authors([keys(1).public_key()]);

        assert!(filter.matches(&event(&keys(1), Kind(1), 0, None)));
        assert!(!filter.matches(&event(&keys(2), Kind(1), 0, None)));
    }

    #[test]
    fn empty_author_list_matches_nothing() {
        let filter = Filter::new().authors([]);
        assert!(!filter.matches(&event(&keys(1), Kind(1), 0, None)));
    }

    #[test]
    fn addressee_filter() {
        let bob = keys(2).public_key();
        let filter = Filter::new().addressed_to(bob);

        assert!(filter.matches(&event(&keys(1), Kind::GIFT_WRAP, 0, Some(bob))));
        assert!(!filter.matches(&event(&keys(1), Kind::GIFT_WRAP, 0, Some(keys(3).public_key()))));
        assert!(!filter.matches(&event(&keys(1), Kind::GIFT_WRAP, 0, None)));
    }

    #[test]
    fn since_is_inclusive() {
        let filter = Filter::new().since(100);

        assert!(filter.matches(&event(&keys(1), Kind(1), 100, None)));
        assert!(!filter.matches(&event(&keys(1), Kind(1), 99, None)));
    }

    #[test]
    fn serializes_with_hash_p() {
        let bob = keys(2).public_key();
        let json = serde_json::to_value(Filter::new().kind(Kind::GIFT_WRAP).addressed_to(bob))
            .unwrap();

        assert_eq!(json["kinds"], serde_json::json!([1059]));
        assert_eq!(json["#p"], serde_json::json!([bob.to_hex()]));
        assert!(json.get("authors").is_none());
    }
}
