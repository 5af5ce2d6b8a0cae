//! In-memory relay.
//!
//! Stores every accepted event and delivers it to open subscriptions whose
//! filters match, following NIP-01: on subscribe, stored matches are sent
//! (newest first, capped by `limit`), then end of stored events, then live
//! events in publish order.
//!
//! Failure injection covers the relay errors a session must surface:
//! rejected or dropped publishes and refused subscriptions.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use veilfeed_core::{Relay, RelayError, Subscription, SubscriptionItem};
use veilfeed_crypto::PublicKey;
use veilfeed_proto::{Event, EventId, Filter, Kind, SubscriptionId};

struct Listener {
    filters: Vec<Filter>,
    items: mpsc::UnboundedSender<SubscriptionItem>,
}

#[derive(Default)]
struct Inner {
    /// Accepted events in publish order
    events: Vec<Event>,
    ids: HashSet<EventId>,
    listeners: HashMap<SubscriptionId, Listener>,
    next_subscription: u64,
    /// Publishes still to fail with a connection error
    failing_publishes: usize,
    offline: bool,
}

/// Shared in-memory relay. Clones are handles to the same relay.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRelay {
    /// Empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` publishes with a connection error.
    pub fn fail_next_publishes(&self, count: usize) {
        self.lock().failing_publishes = count;
    }

    /// Refuse every publish and subscribe while `offline`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Store and deliver `event` without verifying it.
    ///
    /// Models a hostile relay or a peer that bypasses validation. Duplicate
    /// ids are still ignored.
    pub fn inject(&self, event: Event) {
        self.lock().accept(event);
    }

    /// Deliver `event` to matching subscriptions without storing it.
    pub fn broadcast(&self, event: &Event) {
        self.lock().deliver(event);
    }

    /// Every stored event, in publish order.
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Stored events of `kind`.
    pub fn events_of_kind(&self, kind: Kind) -> Vec<Event> {
        self.lock().events.iter().filter(|event| event.kind == kind).cloned().collect()
    }

    /// Stored events addressed to `recipient` with a `p` tag.
    pub fn events_addressed_to(&self, recipient: &PublicKey) -> Vec<Event> {
        self.lock().events.iter().filter(|event| event.is_addressed_to(recipient)).cloned().collect()
    }

    /// Number of open subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl Inner {
    fn accept(&mut self, event: Event) -> bool {
        if !self.ids.insert(event.id) {
            trace!(event = %event.id, "duplicate event");
            return false;
        }

        self.deliver(&event);
        self.events.push(event);
        true
    }

    fn deliver(&mut self, event: &Event) {
        self.listeners.retain(|id, listener| {
            if !listener.filters.iter().any(|filter| filter.matches(event)) {
                return true;
            }
            trace!(subscription = %id, event = %event.id, "delivering live event");
            listener.items.send(SubscriptionItem::Event(Box::new(event.clone()))).is_ok()
        });
    }

    /// Stored events matching any filter, newest first, each filter capped
    /// by its own `limit`.
    fn stored(&self, filters: &[Filter]) -> Vec<Event> {
        let mut selected = BTreeSet::new();

        for filter in filters {
            let matches = self
                .events
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, event)| filter.matches(event))
                .map(|(index, _)| index);
            match filter.limit {
                Some(limit) => selected.extend(matches.take(limit)),
                None => selected.extend(matches),
            }
        }

        let mut events: Vec<Event> =
            selected.into_iter().filter_map(|index| self.events.get(index).cloned()).collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events
    }
}

impl std::fmt::Debug for MemoryRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryRelay")
            .field("events", &inner.events.len())
            .field("subscriptions", &inner.listeners.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        let mut inner = self.lock();

        if inner.offline {
            return Err(RelayError::Connection { reason: "relay offline".to_string() });
        }
        if inner.failing_publishes > 0 {
            inner.failing_publishes -= 1;
            return Err(RelayError::Connection { reason: "simulated publish failure".to_string() });
        }
        if let Err(err) = event.verify() {
            return Err(RelayError::Rejected { reason: format!("invalid: {err}") });
        }

        if inner.accept(event.clone()) {
            debug!(event = %event.id, kind = %event.kind, "stored event");
        }
        Ok(())
    }

    async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription, RelayError> {
        let mut inner = self.lock();

        if inner.offline {
            return Err(RelayError::Connection { reason: "relay offline".to_string() });
        }

        let id = SubscriptionId::new(format!("mem-{}", inner.next_subscription));
        inner.next_subscription += 1;

        let (items, receiver) = mpsc::unbounded_channel();
        for event in inner.stored(&filters) {
            let _ = items.send(SubscriptionItem::Event(Box::new(event)));
        }
        let _ = items.send(SubscriptionItem::EndOfStoredEvents);

        inner.listeners.insert(id.clone(), Listener { filters, items });
        debug!(subscription = %id, "opened subscription");

        let relay = Arc::clone(&self.inner);
        let close_id = id.clone();
        let closer = move || {
            relay.lock().unwrap_or_else(PoisonError::into_inner).listeners.remove(&close_id);
        };

        Ok(Subscription::new(id, receiver, closer))
    }
}

#[cfg(test)]
mod tests {
    use veilfeed_crypto::Keys;
    use veilfeed_proto::UnsignedEvent;

    use super::*;

    fn post(author: u8, created_at: u64) -> Event {
        let keys = Keys::from_secret_bytes(&[author; 32]).unwrap();
        UnsignedEvent::new(keys.public_key(), created_at, Kind::ENCRYPTED_POST, vec![], "c")
            .sign_with(&keys, &[0; 32])
    }

    async fn collect_stored(subscription: &mut Subscription) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(SubscriptionItem::Event(event)) = subscription.next().await {
            events.push(*event);
        }
        events
    }

    #[tokio::test]
    async fn stored_events_then_eose_then_live() {
        let relay = MemoryRelay::new();
        relay.publish(&post(1, 10)).await.unwrap();

        let mut sub = relay.subscribe(vec![Filter::new().kind(Kind::ENCRYPTED_POST)]).await.unwrap();
        assert!(matches!(sub.next().await, Some(SubscriptionItem::Event(_))));
        assert_eq!(sub.next().await, Some(SubscriptionItem::EndOfStoredEvents));

        let live = post(2, 20);
        relay.publish(&live).await.unwrap();
        assert_eq!(sub.next().await, Some(SubscriptionItem::Event(Box::new(live))));
    }

    #[tokio::test]
    async fn limit_keeps_newest() {
        let relay = MemoryRelay::new();
        for at in [10, 30, 20] {
            relay.publish(&post(1, at)).await.unwrap();
        }

        let mut sub =
            relay.subscribe(vec![Filter::new().kind(Kind::ENCRYPTED_POST).limit(2)]).await.unwrap();
        let times: Vec<_> = collect_stored(&mut sub).await.iter().map(|e| e.created_at).collect();
        assert_eq!(times, [30, 20]);
    }

    #[tokio::test]
    async fn duplicates_are_stored_once() {
        let relay = MemoryRelay::new();
        let event = post(1, 10);

        relay.publish(&event).await.unwrap();
        relay.publish(&event).await.unwrap();
        relay.inject(event);

        assert_eq!(relay.events().len(), 1);
    }

    #[tokio::test]
    async fn forged_events_are_rejected() {
        let relay = MemoryRelay::new();
        let mut event = post(1, 10);
        event.content = "changed".to_string();

        assert!(matches!(relay.publish(&event).await, Err(RelayError::Rejected { .. })));
        assert!(relay.events().is_empty());
    }

    #[tokio::test]
    async fn injected_failures() {
        let relay = MemoryRelay::new();
        relay.fail_next_publishes(1);

        assert!(matches!(relay.publish(&post(1, 1)).await, Err(RelayError::Connection { .. })));
        assert!(relay.publish(&post(1, 1)).await.is_ok());

        relay.set_offline(true);
        assert!(relay.subscribe(vec![Filter::new()]).await.is_err());
    }

    #[tokio::test]
    async fn closing_removes_listener() {
        let relay = MemoryRelay::new();
        let mut sub = relay.subscribe(vec![Filter::new()]).await.unwrap();
        assert_eq!(relay.subscription_count(), 1);

        sub.close();
        assert_eq!(relay.subscription_count(), 0);

        drop(relay.subscribe(vec![Filter::new()]).await.unwrap());
        assert_eq!(relay.subscription_count(), 0);
    }
}
