//! Wire formats for veilfeed.
//!
//! Everything that crosses a relay is a signed JSON event. This crate owns the
//! event model, the kind registry, subscription filters, the NIP-19 text
//! encoding of keys and the NIP-01 messages exchanged with a relay.
//!
//! # Event identity
//!
//! ```text
//! id  = sha256(json([0, pubkey, created_at, kind, tags, content]))
//! sig = schnorr(secret, id)
//! ```
//!
//! Ids are recomputed and signatures verified on every event that arrives
//! from the network; a relay is never trusted to have done it.
//!
//! # Kind registry
//!
//! | kind | meaning |
//! |------|---------|
//! | 21   | view-key rumor (unsigned, never sent in the clear) |
//! | 13   | seal |
//! | 1059 | gift wrap |
//! | 9876 | encrypted post |

#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod filter;
pub mod message;
pub mod nip19;
pub mod tag;

pub use error::{EventError, Nip19Error, WireError};
pub use event::{Event, EventId, Kind, Timestamp, UnsignedEvent};
pub use filter::Filter;
pub use message::{ClientMessage, RelayMessage, SubscriptionId};
pub use nip19::{decode_npub, decode_nsec, encode_npub, parse_public_key};
pub use tag::Tag;
