//! Relay boundary.
//!
//! A relay stores signed events and streams the ones matching a
//! subscription's filters: first the stored backlog, then an end-of-stored
//! marker, then live events as they are published. It is untrusted: every
//! event it hands back is verified before use.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use veilfeed_proto::{Event, Filter, SubscriptionId};

/// Errors from relay operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Connection could not be established or was lost
    #[error("relay connection failed: {reason}")]
    Connection {
        /// Transport error
        reason: String,
    },

    /// Relay answered `OK false`
    #[error("event rejected by relay: {reason}")]
    Rejected {
        /// Relay-provided reason
        reason: String,
    },

    /// No acknowledgement within the configured timeout
    #[error("relay did not acknowledge within {0:?}")]
    Timeout(Duration),

    /// The relay connection has shut down
    #[error("relay connection closed")]
    Closed,
}

impl RelayError {
    /// Returns true if retrying may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// One item delivered on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionItem {
    /// Matching event, stored or live
    Event(Box<Event>),
    /// The stored backlog has been fully delivered
    EndOfStoredEvents,
}

type Closer = Box<dyn FnOnce() + Send>;

/// Handle to an open subscription.
///
/// Items arrive in relay order. Closing stops delivery immediately, is
/// idempotent, and happens automatically on drop.
pub struct Subscription {
    id: SubscriptionId,
    items: mpsc::UnboundedReceiver<SubscriptionItem>,
    closer: Option<Closer>,
}

impl Subscription {
    /// Build a subscription handle.
    ///
    /// `closer` runs once, on the first `close()` or on drop, and should
    /// tell the relay side to stop sending.
    pub fn new(
        id: SubscriptionId,
        items: mpsc::UnboundedReceiver<SubscriptionItem>,
        closer: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { id, items, closer: Some(Box::new(closer)) }
    }

    /// Subscription id.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Next item, or `None` once closed (locally or by the relay).
    pub async fn next(&mut self) -> Option<SubscriptionItem> {
        if self.closer.is_none() {
            return None;
        }
        self.items.recv().await
    }

    /// Stop the subscription. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            self.items.close();
            closer();
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closer.is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Publish/subscribe access to a relay.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Publish a signed event and wait for the relay to accept it.
    async fn publish(&self, event: &Event) -> Result<(), RelayError>;

    /// Open a subscription. An event matching any filter is delivered.
    async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription, RelayError>;
}
