//! Feed assembly: encrypted posts → decrypted timeline.
//!
//! [`Feed`] is a pure state machine. It receives [`FeedEvent`]s (a post, a
//! new key table snapshot, a new own key, end of stored events) and returns
//! [`FeedAction`]s describing what changed. [`FeedAssembler`] drives it from
//! a relay subscription and publishes the timeline as `Arc` snapshots.
//!
//! The assembler follows the set of known authors (the local identity,
//! friends, and every author in the key table). When that set changes it
//! opens a subscription for the new set and closes the old one; posts
//! delivered again by the new subscription are deduplicated by id.
//!
//! # Post states
//!
//! ```text
//!            key arrives            decrypt ok
//! Pending ─────────────────▶ ─┬──────────────▶ Decrypted
//!                             │
//!                             └──────────────▶ Failed ──(different key)──▶ retried
//!                                decrypt err
//! ```
//!
//! # Invariants
//!
//! - A post id appears at most once; duplicates are ignored
//! - A post is decrypted iff its author has a key (the local identity's own
//!   posts use the session's own key first)
//! - Entries are never removed; a key update only changes state in place

use std::{
    collections::{BTreeSet, HashMap, hash_map::Entry},
    sync::Arc,
};

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use veilfeed_core::{Relay, RelayError, Subscription, SubscriptionItem};
use veilfeed_crypto::{PublicKey, ViewKey, decrypt_post};
use veilfeed_proto::{Event, EventId, Filter, Kind, Timestamp};

use crate::{
    key_table::{KeySnapshot, OwnViewKey},
    task::TaskHandle,
};

/// Decryption state of one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostState {
    /// Author's view key not known yet
    Pending,
    /// Decrypted plaintext
    Decrypted(String),
    /// A key was present but decryption failed
    Failed(String),
}

/// One post in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Event id
    pub id: EventId,
    /// Author identity
    pub author: PublicKey,
    /// Author-claimed creation time
    pub created_at: Timestamp,
    /// NIP-44 payload under the author's view key
    pub ciphertext: String,
    /// Decryption state
    pub state: PostState,
}

impl FeedEntry {
    /// Plaintext if decrypted.
    pub fn plaintext(&self) -> Option<&str> {
        match &self.state {
            PostState::Decrypted(text) => Some(text),
            PostState::Pending | PostState::Failed(_) => None,
        }
    }
}

/// Input to the feed state machine.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A post event from the relay
    Post(Box<Event>),
    /// The author key table published a new snapshot
    KeysUpdated(KeySnapshot),
    /// The session now holds this view key for the local identity
    OwnKeyUpdated(ViewKey),
    /// The relay finished sending stored posts
    EndOfStoredEvents,
}

/// What a [`FeedEvent`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedAction {
    /// New post stored
    Added {
        /// Post id
        id: EventId,
        /// State it was stored in
        state: PostState,
    },
    /// An existing post moved to a new state after a key update
    Updated {
        /// Post id
        id: EventId,
        /// New state
        state: PostState,
    },
    /// Event ignored (wrong kind, bad id or signature)
    Rejected {
        /// Event id as claimed by the event
        id: EventId,
        /// Why it was ignored
        reason: String,
    },
    /// Stored posts fully delivered
    CaughtUp {
        /// Posts held
        total: usize,
        /// Posts still waiting for a key
        pending: usize,
    },
}

impl FeedAction {
    /// Whether the timeline changed.
    pub fn changes_timeline(&self) -> bool {
        matches!(self, Self::Added { .. } | Self::Updated { .. })
    }
}

/// Sans-IO feed state.
#[derive(Debug)]
pub struct Feed {
    local: PublicKey,
    own_key: Option<ViewKey>,
    keys: KeySnapshot,
    entries: HashMap<EventId, FeedEntry>,
    /// Key each failed entry was tried with, so a retry needs a new key
    failed_with: HashMap<EventId, ViewKey>,
}

impl Feed {
    /// Create an empty feed for `local`.
    ///
    /// `own_key` decrypts the local identity's posts; when absent, the
    /// table's entry for `local` is used.
    pub fn new(local: PublicKey, own_key: Option<ViewKey>, keys: KeySnapshot) -> Self {
        Self { local, own_key, keys, entries: HashMap::new(), failed_with: HashMap::new() }
    }

    /// Subscription filter: posts by `friends` and by `local`.
    pub fn filter(
        local: PublicKey,
        friends: impl IntoIterator<Item = PublicKey>,
        limit: Option<usize>,
    ) -> Filter {
        let filter = Filter::new().kind(Kind::ENCRYPTED_POST).authors(friends).authors([local]);
        match limit {
            Some(limit) => filter.limit(limit),
            None => filter,
        }
    }

    /// Process one event.
    pub fn handle(&mut self, event: FeedEvent) -> Vec<FeedAction> {
        match event {
            FeedEvent::Post(event) => self.handle_post(&event).into_iter().collect(),
            FeedEvent::KeysUpdated(keys) => {
                self.keys = keys;
                self.retry()
            },
            FeedEvent::OwnKeyUpdated(key) => {
                self.own_key = Some(key);
                self.retry()
            },
            FeedEvent::EndOfStoredEvents => vec![FeedAction::CaughtUp {
                total: self.entries.len(),
                pending: self.pending_count(),
            }],
        }
    }

    /// Posts ordered newest first; equal timestamps are ordered by id.
    pub fn timeline(&self) -> Vec<FeedEntry> {
        let mut entries: Vec<FeedEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Key used for the local identity's posts before the table.
    pub fn own_key(&self) -> Option<&ViewKey> {
        self.own_key.as_ref()
    }

    /// Entry for `id`.
    pub fn get(&self, id: &EventId) -> Option<&FeedEntry> {
        self.entries.get(id)
    }

    /// Number of posts held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the feed holds no posts.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of posts waiting for a key.
    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.state == PostState::Pending).count()
    }

    fn handle_post(&mut self, event: &Event) -> Option<FeedAction> {
        if event.kind != Kind::ENCRYPTED_POST {
            return Some(FeedAction::Rejected {
                id: event.id,
                reason: format!("unexpected kind {}", event.kind),
            });
        }
        if let Err(err) = event.verify() {
            return Some(FeedAction::Rejected { id: event.id, reason: err.to_string() });
        }

        let key = self.key_for(&event.pubkey);
        let Entry::Vacant(slot) = self.entries.entry(event.id) else {
            return None;
        };

        let state = match &key {
            Some(key) => decrypt(&event.content, key),
            None => PostState::Pending,
        };
        if let (PostState::Failed(_), Some(key)) = (&state, key) {
            self.failed_with.insert(event.id, key);
        }

        slot.insert(FeedEntry {
            id: event.id,
            author: event.pubkey,
            created_at: event.created_at,
            ciphertext: event.content.clone(),
            state: state.clone(),
        });
        Some(FeedAction::Added { id: event.id, state })
    }

    /// Re-decrypt every undecrypted entry whose author now has a key it was
    /// not yet tried with.
    fn retry(&mut self) -> Vec<FeedAction> {
        let retry: Vec<(EventId, PublicKey)> = self
            .entries
            .values()
            .filter(|entry| !matches!(entry.state, PostState::Decrypted(_)))
            .map(|entry| (entry.id, entry.author))
            .collect();

        let mut actions = Vec::new();
        for (id, author) in retry {
            let Some(key) = self.key_for(&author) else {
                continue;
            };
            if self.failed_with.get(&id) == Some(&key) {
                continue;
            }
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };

            let state = decrypt(&entry.ciphertext, &key);
            match state {
                PostState::Failed(_) => {
                    self.failed_with.insert(id, key);
                },
                PostState::Decrypted(_) | PostState::Pending => {
                    self.failed_with.remove(&id);
                },
            }

            if entry.state != state {
                entry.state = state.clone();
                actions.push(FeedAction::Updated { id, state });
            }
        }

        actions
    }

    fn key_for(&self, author: &PublicKey) -> Option<ViewKey> {
        if *author == self.local {
            if let Some(own) = &self.own_key {
                return Some(own.clone());
            }
        }
        self.keys.get(author).cloned()
    }
}

fn decrypt(ciphertext: &str, key: &ViewKey) -> PostState {
    match decrypt_post(ciphertext, key) {
        Ok(plaintext) => PostState::Decrypted(plaintext),
        Err(err) => PostState::Failed(err.to_string()),
    }
}

/// Ordered posts published to readers.
pub type Timeline = Arc<Vec<FeedEntry>>;

/// Friends of the session, as published to the feed.
pub type Friends = BTreeSet<PublicKey>;

/// Async driver feeding a [`Feed`] from a subscription and key updates.
pub struct FeedAssembler {
    feed: Feed,
    relay: Arc<dyn Relay>,
    local: PublicKey,
    limit: Option<usize>,
    own_key: OwnViewKey,
    keys: watch::Receiver<KeySnapshot>,
    friends: watch::Receiver<Friends>,
    /// Authors covered by the open subscription
    authors: BTreeSet<PublicKey>,
    timeline: watch::Sender<Timeline>,
}

impl FeedAssembler {
    /// Create an assembler reading posts from `relay`.
    ///
    /// Returns the receiver on which timeline snapshots are published.
    pub fn new(
        relay: Arc<dyn Relay>,
        local: PublicKey,
        own_key: OwnViewKey,
        mut keys: watch::Receiver<KeySnapshot>,
        mut friends: watch::Receiver<Friends>,
        limit: Option<usize>,
    ) -> (Self, watch::Receiver<Timeline>) {
        let snapshot = keys.borrow_and_update().clone();
        friends.mark_unchanged();
        let (timeline, reader) = watch::channel(Timeline::default());
        let feed = Feed::new(local, own_key.get(), snapshot);

        let assembler = Self {
            feed,
            relay,
            local,
            limit,
            own_key,
            keys,
            friends,
            authors: BTreeSet::new(),
            timeline,
        };
        (assembler, reader)
    }

    /// Subscribe to the current authors and spawn the assembler.
    ///
    /// Closing the returned handle closes the subscription; the last
    /// published timeline stays readable.
    ///
    /// # Errors
    ///
    /// Any error from the first [`Relay::subscribe`]. Later subscription
    /// failures are logged and the previous subscription is kept.
    pub async fn start(mut self) -> Result<TaskHandle, RelayError> {
        let authors = self.wanted_authors();
        let subscription = self.relay.subscribe(vec![self.filter(&authors)]).await?;
        self.authors = authors;

        Ok(TaskHandle::spawn(move |shutdown| self.run(subscription, shutdown)))
    }

    async fn run(mut self, mut subscription: Subscription, mut shutdown: oneshot::Receiver<()>) {
        debug!(subscription = %subscription.id(), authors = self.authors.len(), "feed started");
        let mut keys_open = true;
        let mut friends_open = true;

        loop {
            let actions = tokio::select! {
                _ = &mut shutdown => break,
                changed = self.keys.changed(), if keys_open => {
                    if changed.is_err() {
                        keys_open = false;
                        continue;
                    }
                    let snapshot = self.keys.borrow_and_update().clone();
                    let mut actions = self.sync_own_key();
                    actions.extend(self.feed.handle(FeedEvent::KeysUpdated(snapshot)));
                    self.resubscribe(&mut subscription).await;
                    actions
                },
                changed = self.friends.changed(), if friends_open => {
                    if changed.is_err() {
                        friends_open = false;
                    } else {
                        self.friends.mark_unchanged();
                        self.resubscribe(&mut subscription).await;
                    }
                    continue;
                },
                item = subscription.next() => match item {
                    Some(SubscriptionItem::Event(event)) => self.feed.handle(FeedEvent::Post(event)),
                    Some(SubscriptionItem::EndOfStoredEvents) => {
                        self.feed.handle(FeedEvent::EndOfStoredEvents)
                    },
                    None => {
                        debug!("feed subscription ended by relay");
                        break;
                    },
                },
            };

            self.apply(&actions);
        }

        subscription.close();
        debug!("feed stopped");
    }

    /// The local identity, friends, and every author with a key.
    fn wanted_authors(&self) -> BTreeSet<PublicKey> {
        let mut authors = self.friends.borrow().clone();
        authors.extend(self.keys.borrow().keys().copied());
        authors.insert(self.local);
        authors
    }

    fn filter(&self, authors: &BTreeSet<PublicKey>) -> Filter {
        Feed::filter(self.local, authors.iter().copied(), self.limit)
    }

    /// Replace the subscription if the author set changed.
    async fn resubscribe(&mut self, subscription: &mut Subscription) {
        let authors = self.wanted_authors();
        if authors == self.authors {
            return;
        }

        match self.relay.subscribe(vec![self.filter(&authors)]).await {
            Ok(next) => {
                debug!(subscription = %next.id(), authors = authors.len(), "feed resubscribed");
                let mut previous = std::mem::replace(subscription, next);
                previous.close();
                self.authors = authors;
            },
            Err(err) => {
                warn!(error = %err, "feed resubscribe failed; keeping previous authors");
            },
        }
    }

    /// Hand the session's own key to the feed if it changed.
    fn sync_own_key(&mut self) -> Vec<FeedAction> {
        match self.own_key.get() {
            Some(key) if self.feed.own_key() != Some(&key) => {
                self.feed.handle(FeedEvent::OwnKeyUpdated(key))
            },
            _ => Vec::new(),
        }
    }

    fn apply(&self, actions: &[FeedAction]) {
        for action in actions {
            match action {
                FeedAction::Added { id, state } => debug!(post = %id, ?state, "post added"),
                FeedAction::Updated { id, .. } => debug!(post = %id, "post re-decrypted"),
                FeedAction::Rejected { id, reason } => {
                    warn!(post = %id, reason = %reason, "dropping feed event");
                },
                FeedAction::CaughtUp { total, pending } => {
                    info!(total, pending, "feed caught up");
                },
            }
        }

        if actions.iter().any(FeedAction::changes_timeline) {
            self.timeline.send_replace(Arc::new(self.feed.timeline()));
        }
    }
}

impl std::fmt::Debug for FeedAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedAssembler")
            .field("local", &self.local)
            .field("authors", &self.authors.len())
            .field("posts", &self.feed.len())
            .finish_non_exhaustive()
    }
}
