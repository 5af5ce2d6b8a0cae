//! Author → view key table.
//!
//! # Invariants
//!
//! - An author maps to at most one view key at a time; the most recent share
//!   wins, whatever order shares are processed in
//! - Entries are never removed
//! - Readers see whole snapshots. A write clones the map only if a reader
//!   still holds the previous snapshot (copy-on-write through `Arc`).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::watch;
use tracing::debug;
use veilfeed_crypto::{PublicKey, ViewKey};
use veilfeed_proto::Timestamp;

/// Immutable view of the table at one point in time.
pub type KeySnapshot = Arc<HashMap<PublicKey, ViewKey>>;

/// Shared table of view keys by author.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone)]
pub struct AuthorKeyTable {
    sender: Arc<watch::Sender<KeySnapshot>>,
    /// When the stored key of each author was shared
    shared_at: Arc<Mutex<HashMap<PublicKey, Timestamp>>>,
}

impl AuthorKeyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(KeySnapshot::default());
        Self { sender: Arc::new(sender), shared_at: Arc::default() }
    }

    /// Record `view_key` for `author`, shared at `shared_at`.
    ///
    /// A share older than the stored one is ignored, so replaying stored
    /// shares newest first keeps the newest key. On equal times the later
    /// write wins.
    ///
    /// Returns true if the table changed. Writing the key already stored is
    /// a no-op and does not wake subscribers.
    pub fn upsert(&self, author: PublicKey, view_key: ViewKey, shared_at: Timestamp) -> bool {
        let mut times = self.shared_at.lock().unwrap_or_else(PoisonError::into_inner);
        if times.get(&author).is_some_and(|stored| *stored > shared_at) {
            debug!(author = %author, shared_at, "ignoring older view key share");
            return false;
        }
        times.insert(author, shared_at);

        let changed = self.sender.send_if_modified(|snapshot| {
            if snapshot.get(&author) == Some(&view_key) {
                return false;
            }
            Arc::make_mut(snapshot).insert(author, view_key);
            true
        });
        drop(times);

        if changed {
            debug!(author = %author, shared_at, "view key table updated");
        }
        changed
    }

    /// Key currently stored for `author`.
    pub fn get(&self, author: &PublicKey) -> Option<ViewKey> {
        self.sender.borrow().get(author).cloned()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> KeySnapshot {
        self.sender.borrow().clone()
    }

    /// Number of authors with a key.
    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    /// Whether no author has a key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver notified with a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<KeySnapshot> {
        self.sender.subscribe()
    }
}

impl Default for AuthorKeyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The local identity's own view key, held for the session.
///
/// Set by generation or restored from a self-share found in the inbox.
/// Follows the same newest-share rule as [`AuthorKeyTable`], so after any
/// replay it agrees with the table's self entry.
#[derive(Debug, Clone, Default)]
pub struct OwnViewKey {
    slot: Arc<Mutex<Option<(ViewKey, Timestamp)>>>,
}

impl OwnViewKey {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The held key, if any.
    pub fn get(&self) -> Option<ViewKey> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|(key, _)| key.clone())
    }

    /// Hold `key`, shared at `shared_at`, replacing any previous key.
    pub fn set(&self, key: ViewKey, shared_at: Timestamp) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((key, shared_at));
    }

    /// Hold `key` from a self-share unless a newer share is already held.
    ///
    /// Returns true if the held key changed.
    pub fn restore(&self, key: ViewKey, shared_at: Timestamp) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some((_, held_at)) if *held_at > shared_at => false,
            Some((held, held_at)) if *held == key => {
                *held_at = shared_at;
                false
            },
            _ => {
                *slot = Some((key, shared_at));
                true
            },
        }
    }
}
