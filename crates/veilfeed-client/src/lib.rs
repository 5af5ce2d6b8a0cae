//! Client
//!
//! Everything a user session runs on top of the envelope protocol: sharing
//! the view key with friends, resolving keys received from friends, and
//! assembling the decrypted feed.
//!
//! # Architecture
//!
//! Two long-running tasks share one [`AuthorKeyTable`]:
//!
//! ```text
//!  relay ──1059──▶ InboxResolver ──upsert──▶ AuthorKeyTable
//!                                                 │ watch
//!  relay ──9876──▶ FeedAssembler ◀────────────────┘
//!                        │ watch
//!                        ▼
//!                    Timeline
//! ```
//!
//! The inbox is the only network-driven writer of the table. The feed never
//! blocks on it: a post whose author has no key yet is held as pending and
//! decrypted when the table publishes a snapshot containing that author.
//! A new author in the table, or a change to the friend list, makes the
//! feed subscribe again for the new set of authors.
//!
//! [`Feed`] is a Sans-IO state machine ([`FeedEvent`] in, [`FeedAction`]
//! out); [`FeedAssembler`] drives it from a subscription.
//!
//! # Components
//!
//! - [`Client`]: session façade (identity, own view key, friend list)
//! - [`share_view_key`]: rumor → seal → wrap → publish
//! - [`InboxResolver`]: gift wraps → author key table
//! - [`Feed`] / [`FeedAssembler`]: posts → timeline
//! - [`SystemEnv`]: OS clock and entropy
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`transport::WebSocketRelay`], a NIP-01 relay client over WebSocket.

#![forbid(unsafe_code)]

mod client;
mod config;
mod distribution;
mod error;
mod feed;
mod inbox;
mod key_table;
mod system_env;
mod task;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use config::{
    ClientConfig, DEFAULT_FEED_LIMIT, DEFAULT_PUBLISH_TIMEOUT, DEFAULT_RELAY_URL, RelayConfig,
};
pub use distribution::share_view_key;
pub use error::ClientError;
pub use feed::{
    Feed, FeedAction, FeedAssembler, FeedEntry, FeedEvent, Friends, PostState, Timeline,
};
pub use inbox::InboxResolver;
pub use key_table::{AuthorKeyTable, KeySnapshot, OwnViewKey};
pub use system_env::SystemEnv;
pub use task::TaskHandle;
pub use veilfeed_core::env::Environment;
