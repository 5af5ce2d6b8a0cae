//! Deterministic simulation harness for veilfeed protocol testing.
//!
//! In-memory implementations of the [`Environment`] and [`Relay`] seams, so
//! whole sessions (several identities sharing keys and posting through one
//! relay) run inside a single test process with reproducible bytes.
//!
//! - [`SimEnv`]: seeded ChaCha RNG and a manual clock
//! - [`MemoryRelay`]: NIP-01 relay semantics over in-process channels, with
//!   failure injection
//! - [`scenario`]: identities, clients and wait helpers
//!
//! [`Environment`]: veilfeed_core::Environment
//! [`Relay`]: veilfeed_core::Relay

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod memory_relay;
pub mod scenario;
pub mod sim_env;

pub use memory_relay::MemoryRelay;
pub use scenario::Scenario;
pub use sim_env::SimEnv;
