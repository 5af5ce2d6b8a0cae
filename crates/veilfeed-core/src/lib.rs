//! Core
//!
//! The three-layer envelope that carries a view key from one identity to
//! another, and the boundaries the protocol runs against.
//!
//! # Architecture
//!
//! Protocol code never touches the network, the clock or the identity secret
//! directly. It is written against three seams:
//!
//! - [`Environment`]: wall-clock time and cryptographic randomness
//! - [`SigningOracle`]: signs events and performs NIP-44 with the identity
//!   key, which never leaves the oracle
//! - [`Relay`]: publishes events and opens subscriptions
//!
//! # Envelope
//!
//! ```text
//! Rumor (21, unsigned)      {owner, ["key","view",<hex>]}
//!   │ oracle.encrypt(recipient)      oracle.sign
//!   ▼
//! Seal (13)                 signed by the real sender
//!   │ nip44(ephemeral × recipient)   ephemeral.sign
//!   ▼
//! GiftWrap (1059)           signed by a one-shot key, ["p", recipient]
//! ```
//!
//! A relay observer sees only the recipient and an unlinkable signer.
//! [`envelope::open`] reverses the layers and checks that the rumor's owner
//! is the identity that signed the seal.

#![forbid(unsafe_code)]

pub mod env;
pub mod envelope;
pub mod error;
pub mod keygen;
pub mod oracle;
pub mod relay;

pub use env::{EntropyError, Environment};
pub use envelope::{Rumor, build_rumor, open, seal, unseal, unwrap, wrap};
pub use error::ProtocolError;
pub use keygen::{generate_keys, generate_view_key};
pub use oracle::{LocalKeyOracle, NoSigner, OracleError, SigningOracle};
pub use relay::{Relay, RelayError, Subscription, SubscriptionItem};

#[cfg(test)]
pub(crate) mod test_support;
