//! Inbox resolution: gift wraps addressed to us → author key table.
//!
//! Runs one standing subscription for kind-1059 events tagged with the local
//! key. Each event is opened and, on success, its rumor's key is recorded for
//! the rumor's owner. Failures are per event: logged, dropped, and the
//! subscription continues.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use veilfeed_core::{
    ProtocolError, Rumor, SigningOracle, Subscription, SubscriptionItem, envelope::open,
};
use veilfeed_crypto::PublicKey;
use veilfeed_proto::{Event, Filter, Kind};

use crate::{
    key_table::{AuthorKeyTable, OwnViewKey},
    task::TaskHandle,
};

/// Resolves received gift wraps into the author key table.
///
/// The resolver is the only network-driven writer of the table.
#[derive(Clone)]
pub struct InboxResolver {
    local: PublicKey,
    oracle: Arc<dyn SigningOracle>,
    table: AuthorKeyTable,
    own_key: OwnViewKey,
}

impl InboxResolver {
    /// Create a resolver for the identity `local`.
    pub fn new(
        local: PublicKey,
        oracle: Arc<dyn SigningOracle>,
        table: AuthorKeyTable,
        own_key: OwnViewKey,
    ) -> Self {
        Self { local, oracle, table, own_key }
    }

    /// Subscription filter: gift wraps addressed to the local identity.
    pub fn filter(&self) -> Filter {
        Filter::new().kind(Kind::GIFT_WRAP).addressed_to(self.local)
    }

    /// Open one gift wrap and record its key.
    ///
    /// A self-share also restores the session's own view key. Keys are
    /// ordered by the rumor's `created_at`, so an older share never replaces
    /// a newer one.
    pub async fn handle_event(&self, event: &Event) -> Result<Rumor, ProtocolError> {
        let rumor = open(event, &self.local, self.oracle.as_ref()).await?;

        let self_share = rumor.owner == self.local;
        if self_share && self.own_key.restore(rumor.view_key.clone(), rumor.created_at) {
            info!("restored own view key from self-share");
        }
        if self.table.upsert(rumor.owner, rumor.view_key.clone(), rumor.created_at) {
            info!(author = %rumor.owner, "received view key");
        }

        Ok(rumor)
    }

    /// Process stored events until the relay signals end of stored events.
    ///
    /// Returns how many keys were resolved. Used for one-shot sessions that
    /// only need the backlog.
    pub async fn drain_stored(&self, subscription: &mut Subscription) -> usize {
        let mut resolved = 0;

        while let Some(item) = subscription.next().await {
            match item {
                SubscriptionItem::Event(event) => {
                    if self.process(&event).await {
                        resolved += 1;
                    }
                },
                SubscriptionItem::EndOfStoredEvents => {
                    self.caught_up();
                    break;
                },
            }
        }

        resolved
    }

    /// Spawn the resolver over `subscription`.
    ///
    /// Closing the returned handle closes the subscription. The key table
    /// keeps everything resolved so far.
    pub fn spawn(self, subscription: Subscription) -> TaskHandle {
        TaskHandle::spawn(move |shutdown| self.run(subscription, shutdown))
    }

    async fn run(self, mut subscription: Subscription, mut shutdown: oneshot::Receiver<()>) {
        debug!(subscription = %subscription.id(), "inbox started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                item = subscription.next() => match item {
                    Some(SubscriptionItem::Event(event)) => {
                        self.process(&event).await;
                    },
                    Some(SubscriptionItem::EndOfStoredEvents) => self.caught_up(),
                    None => {
                        debug!("inbox subscription ended by relay");
                        break;
                    },
                },
            }
        }

        subscription.close();
        debug!("inbox stopped");
    }

    async fn process(&self, event: &Event) -> bool {
        match self.handle_event(event).await {
            Ok(_) => true,
            Err(err) => {
                warn!(event = %event.id, error = %err, "dropping inbox event");
                false
            },
        }
    }

    fn caught_up(&self) {
        info!(keys = self.table.len(), "inbox caught up");

        if self.own_key.get().is_none() && self.table.get(&self.local).is_none() {
            info!("no view key found for this identity; generate one to start posting");
        }
    }
}

impl std::fmt::Debug for InboxResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxResolver").field("local", &self.local).finish_non_exhaustive()
    }
}
