//! WebSocket relay transport.
//!
//! [`WebSocketRelay`] speaks NIP-01 over one WebSocket connection. Two
//! internal tasks own the socket halves: a writer draining an outgoing queue
//! and a reader routing relay messages to waiting publishers and open
//! subscriptions. Protocol logic stays in the rest of the crate; this layer
//! only moves JSON text.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, oneshot},
    task::AbortHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use veilfeed_core::{Relay, RelayError, Subscription, SubscriptionItem};
use veilfeed_proto::{ClientMessage, Event, EventId, Filter, RelayMessage, SubscriptionId};

use crate::config::RelayConfig;

/// Relay reply to a published event: accepted flag and message.
type Ack = (bool, String);

struct Routes {
    /// Cleared once the reader task exits; nothing is routed after that.
    open: bool,
    acks: HashMap<EventId, oneshot::Sender<Ack>>,
    subscriptions: HashMap<SubscriptionId, mpsc::UnboundedSender<SubscriptionItem>>,
}

impl Default for Routes {
    fn default() -> Self {
        Self { open: true, acks: HashMap::new(), subscriptions: HashMap::new() }
    }
}

impl Routes {
    /// Drop every route. Dropping the senders ends subscriptions and fails
    /// pending publishes.
    fn close(&mut self) {
        self.open = false;
        self.acks.clear();
        self.subscriptions.clear();
    }

    fn add_ack(&mut self, id: EventId, ack: oneshot::Sender<Ack>) -> Result<(), RelayError> {
        if !self.open {
            return Err(RelayError::Closed);
        }
        self.acks.insert(id, ack);
        Ok(())
    }

    fn add_subscription(
        &mut self,
        id: SubscriptionId,
        items: mpsc::UnboundedSender<SubscriptionItem>,
    ) -> Result<(), RelayError> {
        if !self.open {
            return Err(RelayError::Closed);
        }
        self.subscriptions.insert(id, items);
        Ok(())
    }
}

type SharedRoutes = Arc<Mutex<Routes>>;

fn lock(routes: &SharedRoutes) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connected NIP-01 relay.
///
/// Dropping the relay aborts the connection tasks; open subscriptions then
/// end with `None`. Once the relay side of the connection ends, `publish` and
/// `subscribe` return [`RelayError::Closed`].
pub struct WebSocketRelay {
    config: RelayConfig,
    outgoing: mpsc::UnboundedSender<String>,
    routes: SharedRoutes,
    next_subscription: AtomicU64,
    reader: AbortHandle,
    writer: AbortHandle,
}

impl WebSocketRelay {
    /// Connect to `config.url`.
    ///
    /// # Errors
    ///
    /// - `Connection`: the WebSocket handshake failed
    pub async fn connect(config: RelayConfig) -> Result<Self, RelayError> {
        let (stream, _) = connect_async(config.url.as_str())
            .await
            .map_err(|e| RelayError::Connection { reason: e.to_string() })?;
        info!(url = %config.url, "connected to relay");

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut queue) = mpsc::unbounded_channel::<String>();
        let routes = SharedRoutes::default();

        let writer = tokio::spawn(async move {
            while let Some(text) = queue.recv().await {
                if let Err(err) = sink.send(Message::Text(text)).await {
                    warn!(error = %err, "relay write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_routes = Arc::clone(&routes);
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => route(&reader_routes, &text),
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "relay closed connection");
                        break;
                    },
                    // Pings are answered by tungstenite
                    Ok(_) => {},
                    Err(err) => {
                        warn!(error = %err, "relay read failed");
                        break;
                    },
                }
            }

            lock(&reader_routes).close();
        });

        Ok(Self {
            config,
            outgoing,
            routes,
            next_subscription: AtomicU64::new(0),
            reader: reader.abort_handle(),
            writer: writer.abort_handle(),
        })
    }

    /// Relay URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn send(&self, message: &ClientMessage) -> Result<(), RelayError> {
        let text = message.to_json().map_err(|e| RelayError::Rejected { reason: e.to_string() })?;
        self.outgoing.send(text).map_err(|_| RelayError::Closed)
    }
}

impl Drop for WebSocketRelay {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl std::fmt::Debug for WebSocketRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketRelay").field("url", &self.config.url).finish_non_exhaustive()
    }
}

#[async_trait]
impl Relay for WebSocketRelay {
    async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        lock(&self.routes).add_ack(event.id, ack_tx)?;

        if let Err(err) = self.send(&ClientMessage::Event(Box::new(event.clone()))) {
            lock(&self.routes).acks.remove(&event.id);
            return Err(err);
        }

        let timeout = self.config.publish_timeout;
        match tokio::time::timeout(timeout, ack_rx).await {
            Err(_) => {
                lock(&self.routes).acks.remove(&event.id);
                Err(RelayError::Timeout(timeout))
            },
            Ok(Err(_)) => Err(RelayError::Closed),
            Ok(Ok((accepted, message))) => {
                if accepted || message.starts_with("duplicate:") {
                    debug!(event = %event.id, "relay accepted event");
                    Ok(())
                } else {
                    Err(RelayError::Rejected { reason: message })
                }
            },
        }
    }

    async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription, RelayError> {
        let n = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let id = SubscriptionId::new(format!("veilfeed-{n}"));

        let (items_tx, items_rx) = mpsc::unbounded_channel();
        lock(&self.routes).add_subscription(id.clone(), items_tx)?;

        if let Err(err) = self.send(&ClientMessage::Req { subscription_id: id.clone(), filters }) {
            lock(&self.routes).subscriptions.remove(&id);
            return Err(err);
        }
        debug!(subscription = %id, "subscribed");

        let routes = Arc::clone(&self.routes);
        let outgoing = self.outgoing.clone();
        let close_id = id.clone();
        let closer = move || {
            lock(&routes).subscriptions.remove(&close_id);
            if let Ok(text) = ClientMessage::Close(close_id).to_json() {
                // The connection may already be gone
                let _ = outgoing.send(text);
            }
        };

        Ok(Subscription::new(id, items_rx, closer))
    }
}

fn route(routes: &SharedRoutes, text: &str) {
    let message = match RelayMessage::from_json(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "ignoring relay message");
            return;
        },
    };

    let mut routes = lock(routes);
    match message {
        RelayMessage::Event { subscription_id, event } => {
            deliver(&mut routes, &subscription_id, SubscriptionItem::Event(event));
        },
        RelayMessage::EndOfStoredEvents(subscription_id) => {
            deliver(&mut routes, &subscription_id, SubscriptionItem::EndOfStoredEvents);
        },
        RelayMessage::Ok { event_id, accepted, message } => {
            if let Some(ack) = routes.acks.remove(&event_id) {
                let _ = ack.send((accepted, message));
            }
        },
        RelayMessage::Closed { subscription_id, message } => {
            info!(subscription = %subscription_id, message = %message, "relay closed subscription");
            routes.subscriptions.remove(&subscription_id);
        },
        RelayMessage::Notice(message) => info!(message = %message, "relay notice"),
    }
}

fn deliver(routes: &mut Routes, id: &SubscriptionId, item: SubscriptionItem) {
    let Some(items) = routes.subscriptions.get(id) else {
        debug!(subscription = %id, "message for unknown subscription");
        return;
    };
    if items.send(item).is_err() {
        routes.subscriptions.remove(id);
    }
}
