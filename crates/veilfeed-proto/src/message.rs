//! NIP-01 relay messages
//!
//! Messages are JSON arrays whose first element is a label. Decoding is
//! strict about shape and lenient about extras: trailing elements beyond
//! those a message defines are ignored.
//!
//! | direction | message |
//! |-----------|---------|
//! | client → relay | `["EVENT", event]` |
//! | client → relay | `["REQ", sub, filter, ...]` |
//! | client → relay | `["CLOSE", sub]` |
//! | relay → client | `["EVENT", sub, event]` |
//! | relay → client | `["OK", id, accepted, message]` |
//! | relay → client | `["EOSE", sub]` |
//! | relay → client | `["CLOSED", sub, message]` |
//! | relay → client | `["NOTICE", message]` |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::WireError,
    event::{Event, EventId},
    filter::Filter,
};

/// Client-chosen subscription identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wrap a subscription id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages a client sends to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Publish an event
    Event(Box<Event>),
    /// Open a subscription
    Req {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Filters (an event matching any of them is delivered)
        filters: Vec<Filter>,
    },
    /// Close a subscription
    Close(SubscriptionId),
}

impl ClientMessage {
    /// Encode as a JSON array.
    pub fn to_json(&self) -> Result<String, WireError> {
        let array = match self {
            Self::Event(event) => vec![label("EVENT"), serde_json::to_value(event)?],
            Self::Req { subscription_id, filters } => {
                let mut array = Vec::with_capacity(2 + filters.len());
                array.push(label("REQ"));
                array.push(Value::String(subscription_id.0.clone()));
                for filter in filters {
                    array.push(serde_json::to_value(filter)?);
                }
                array
            },
            Self::Close(subscription_id) => {
                vec![label("CLOSE"), Value::String(subscription_id.0.clone())]
            },
        };

        Ok(serde_json::to_string(&array)?)
    }

    /// Decode a JSON array.
    ///
    /// # Errors
    ///
    /// - `Json`: not JSON
    /// - `Malformed`: not an array, or elements of the wrong type
    /// - `UnknownMessage`: unrecognized label
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        let (label, mut fields) = Fields::parse(text)?;

        match label.as_str() {
            "EVENT" => Ok(Self::Event(Box::new(fields.next_as("event")?))),
            "REQ" => {
                let subscription_id = SubscriptionId(fields.next_string("subscription id")?);
                let filters = fields
                    .rest
                    .map(|value| {
                        serde_json::from_value(value)
                            .map_err(|e| WireError::Malformed { reason: format!("filter: {e}") })
                    })
                    .collect::<Result<Vec<Filter>, _>>()?;
                Ok(Self::Req { subscription_id, filters })
            },
            "CLOSE" => Ok(Self::Close(SubscriptionId(fields.next_string("subscription id")?))),
            other => Err(WireError::UnknownMessage(other.to_string())),
        }
    }
}

/// Messages a relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Event matching a subscription
    Event {
        /// Subscription the event answers
        subscription_id: SubscriptionId,
        /// The event
        event: Box<Event>,
    },
    /// Acceptance or rejection of a published event
    Ok {
        /// Published event
        event_id: EventId,
        /// Whether the relay stored it
        accepted: bool,
        /// Machine-prefixed reason (`duplicate:`, `invalid:` ...)
        message: String,
    },
    /// All stored events for the subscription have been sent
    EndOfStoredEvents(SubscriptionId),
    /// The relay ended the subscription
    Closed {
        /// Subscription that was closed
        subscription_id: SubscriptionId,
        /// Reason
        message: String,
    },
    /// Human-readable notice
    Notice(String),
}

impl RelayMessage {
    /// Encode as a JSON array.
    pub fn to_json(&self) -> Result<String, WireError> {
        let array = match self {
            Self::Event { subscription_id, event } => vec![
                label("EVENT"),
                Value::String(subscription_id.0.clone()),
                serde_json::to_value(event)?,
            ],
            Self::Ok { event_id, accepted, message } => vec![
                label("OK"),
                Value::String(event_id.to_hex()),
                Value::Bool(*accepted),
                Value::String(message.clone()),
            ],
            Self::EndOfStoredEvents(subscription_id) => {
                vec![label("EOSE"), Value::String(subscription_id.0.clone())]
            },
            Self::Closed { subscription_id, message } => vec![
                label("CLOSED"),
                Value::String(subscription_id.0.clone()),
                Value::String(message.clone()),
            ],
            Self::Notice(message) => vec![label("NOTICE"), Value::String(message.clone())],
        };

        Ok(serde_json::to_string(&array)?)
    }

    /// Decode a JSON array.
    ///
    /// # Errors
    ///
    /// - `Json`: not JSON
    /// - `Malformed`: not an array, or elements of the wrong type
    /// - `UnknownMessage`: unrecognized label (callers usually skip these)
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        let (label, mut fields) = Fields::parse(text)?;

        match label.as_str() {
            "EVENT" => {
                let subscription_id = SubscriptionId(fields.next_string("subscription id")?);
                let event = Box::new(fields.next_as("event")?);
                Ok(Self::Event { subscription_id, event })
            },
            "OK" => {
                let id = fields.next_string("event id")?;
                let event_id = EventId::from_hex(&id)
                    .map_err(|e| WireError::Malformed { reason: format!("event id: {e}") })?;
                let accepted = fields.next_as("accepted flag")?;
                // Some relays omit the message on success
                let message = fields.next_string("message").unwrap_or_default();
                Ok(Self::Ok { event_id, accepted, message })
            },
            "EOSE" => {
                Ok(Self::EndOfStoredEvents(SubscriptionId(fields.next_string("subscription id")?)))
            },
            "CLOSED" => {
                let subscription_id = SubscriptionId(fields.next_string("subscription id")?);
                let message = fields.next_string("message").unwrap_or_default();
                Ok(Self::Closed { subscription_id, message })
            },
            "NOTICE" => Ok(Self::Notice(fields.next_string("message")?)),
            other => Err(WireError::UnknownMessage(other.to_string())),
        }
    }
}

fn label(name: &str) -> Value {
    Value::String(name.to_string())
}

/// Cursor over the elements of a message array after its label.
struct Fields {
    rest: std::vec::IntoIter<Value>,
}

impl Fields {
    fn parse(text: &str) -> Result<(String, Self), WireError> {
        let Value::Array(items) = serde_json::from_str(text)? else {
            return Err(WireError::Malformed { reason: "message is not an array".to_string() });
        };

        let mut rest = items.into_iter();
        let Some(Value::String(label)) = rest.next() else {
            return Err(WireError::Malformed { reason: "missing message label".to_string() });
        };

        Ok((label, Self { rest }))
    }

    fn next_value(&mut self, what: &str) -> Result<Value, WireError> {
        self.rest.next().ok_or_else(|| WireError::Malformed { reason: format!("missing {what}") })
    }

    fn next_string(&mut self, what: &str) -> Result<String, WireError> {
        match self.next_value(what)? {
            Value::String(text) => Ok(text),
            _ => Err(WireError::Malformed { reason: format!("{what} is not a string") }),
        }
    }

    fn next_as<T: serde::de::DeserializeOwned>(&mut self, what: &str) -> Result<T, WireError> {
        serde_json::from_value(self.next_value(what)?)
            .map_err(|e| WireError::Malformed { reason: format!("{what}: {e}") })
    }
}

#[cfg(test)]
mod tests {
    use veilfeed_crypto::Keys;

    use super::*;
    use crate::{
        event::{Kind, UnsignedEvent},
        tag::Tag,
    };

    fn event() -> Event {
        let keys = Keys::from_secret_bytes(&[1; 32]).unwrap();
        UnsignedEvent::new(
            keys.public_key(),
            1_700_000_000,
            Kind::GIFT_WRAP,
            vec![Tag::pubkey(&keys.public_key())],
            "ciphertext",
        )
        .sign_with(&keys, &[0; 32])
    }

    #[test]
    fn req_encoding() {
        let mut secret = [0; 32];
        secret[31] = 2;
        let bob = Keys::from_secret_bytes(&secret).unwrap().public_key();
        let message = ClientMessage::Req {
            subscription_id: SubscriptionId::new("inbox"),
            filters: vec![Filter::new().kind(Kind::GIFT_WRAP).addressed_to(bob)],
        };

        insta::assert_snapshot!(message.to_json().unwrap(), @r###"["REQ","inbox",{"#p":["c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5"],"kinds":[1059]}]"###);
    }

    #[test]
    fn close_encoding() {
        let message = ClientMessage::Close(SubscriptionId::new("feed"));
        insta::assert_snapshot!(message.to_json().unwrap(), @r###"["CLOSE","feed"]"###);
    }

    #[test]
    fn relay_control_encodings() {
        let eose = RelayMessage::EndOfStoredEvents(SubscriptionId::new("inbox"));
        insta::assert_snapshot!(eose.to_json().unwrap(), @r###"["EOSE","inbox"]"###);

        let closed = RelayMessage::Closed {
            subscription_id: SubscriptionId::new("feed"),
            message: "error: shutting down".to_string(),
        };
        insta::assert_snapshot!(closed.to_json().unwrap(), @r###"["CLOSED","feed","error: shutting down"]"###);
    }

    #[test]
    fn client_event_roundtrip() {
        let message = ClientMessage::Event(Box::new(event()));
        let decoded = ClientMessage::from_json(&message.to_json().unwrap()).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn relay_event_decodes() {
        let event = event();
        let text = format!(r#"["EVENT","inbox",{}]"#, event.to_json().unwrap());

        let RelayMessage::Event { subscription_id, event: decoded } =
            RelayMessage::from_json(&text).unwrap()
        else {
            panic!("expected EVENT");
        };
        assert_eq!(subscription_id.as_str(), "inbox");
        assert_eq!(*decoded, event);
    }

    #[test]
    fn ok_decodes() {
        let id = event().id;
        let text = format!(r#"["OK","{id}",false,"blocked: rate limited"]"#);

        assert_eq!(
            RelayMessage::from_json(&text).unwrap(),
            RelayMessage::Ok {
                event_id: id,
                accepted: false,
                message: "blocked: rate limited".to_string()
            }
        );
    }

    #[test]
    fn ok_without_message() {
        let id = event().id;
        let decoded = RelayMessage::from_json(&format!(r#"["OK","{id}",true]"#)).unwrap();

        assert_eq!(decoded, RelayMessage::Ok { event_id: id, accepted: true, message: String::new() });
    }

    #[test]
    fn req_with_several_filters() {
        let text = r#"["REQ","s",{"kinds":[9876]},{"kinds":[1059],"limit":5}]"#;
        let ClientMessage::Req { filters, .. } = ClientMessage::from_json(text).unwrap() else {
            panic!("expected REQ");
        };

        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].limit, Some(5));
    }

    #[test]
    fn malformed_messages() {
        assert!(matches!(RelayMessage::from_json("{}"), Err(WireError::Malformed { .. })));
        assert!(matches!(RelayMessage::from_json("[]"), Err(WireError::Malformed { .. })));
        assert!(matches!(RelayMessage::from_json("[1]"), Err(WireError::Malformed { .. })));
        assert!(matches!(RelayMessage::from_json(r#"["EOSE"]"#), Err(WireError::Malformed { .. })));
        assert!(matches!(RelayMessage::from_json("not json"), Err(WireError::Json { .. })));
        assert!(matches!(
            RelayMessage::from_json(r#"["AUTH","challenge"]"#),
            Err(WireError::UnknownMessage(label)) if label == "AUTH"
        ));
    }

    #[test]
    fn event_with_bad_pubkey_is_malformed() {
        let text = r#"["EVENT","s",{"id":"00","pubkey":"zz","created_at":0,"kind":1,"tags":[],"content":"","sig":"00"}]"#;
        assert!(matches!(RelayMessage::from_json(text), Err(WireError::Malformed { .. })));
    }
}
