//! Multi-identity scenarios over one [`MemoryRelay`].
//!
//! ```ignore
//! let scenario = Scenario::new(7);
//! let mut alice = scenario.client(1).await?;
//! let bob = scenario.client(2).await?;
//! alice.generate_view_key().await?;
//! alice.add_friend(&scenario.npub(2)).await?;
//! ```

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use veilfeed_client::{Client, ClientConfig, ClientError, KeySnapshot, Timeline};
use veilfeed_core::{LocalKeyOracle, SigningOracle};
use veilfeed_crypto::{Keys, PublicKey};
use veilfeed_proto::encode_npub;

use crate::{memory_relay::MemoryRelay, sim_env::SimEnv};

/// How long wait helpers poll before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deterministic identity for `seed` (any value but 0 and 255).
///
/// # Panics
///
/// Panics if `[seed; 32]` is not a valid secret key.
#[allow(clippy::expect_used)]
pub fn identity(seed: u8) -> Keys {
    Keys::from_secret_bytes(&[seed; 32]).expect("seed must give a valid secret key")
}

/// Public key of [`identity`]`(seed)`.
pub fn pubkey(seed: u8) -> PublicKey {
    identity(seed).public_key()
}

/// Shared relay and environment for a group of sessions.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Relay every session talks to
    pub relay: MemoryRelay,
    /// Environment every session draws from
    pub env: SimEnv,
}

impl Scenario {
    /// Fresh relay with an environment seeded by `seed`.
    pub fn new(seed: u64) -> Self {
        Self { relay: MemoryRelay::new(), env: SimEnv::with_seed(seed) }
    }

    /// In-process oracle for identity `seed`.
    pub fn oracle(&self, seed: u8) -> Arc<dyn SigningOracle> {
        Arc::new(LocalKeyOracle::new(identity(seed), self.env.clone()))
    }

    /// Session for identity `seed` with default configuration.
    pub async fn client(&self, seed: u8) -> Result<Client<SimEnv>, ClientError> {
        Client::new(
            self.env.clone(),
            self.oracle(seed),
            Arc::new(self.relay.clone()),
            ClientConfig::default(),
        )
        .await
    }

    /// npub text for identity `seed`.
    ///
    /// # Panics
    ///
    /// Panics if the key cannot be bech32 encoded.
    #[allow(clippy::expect_used)]
    pub fn npub(&self, seed: u8) -> String {
        encode_npub(&pubkey(seed)).expect("x-only keys always encode")
    }
}

/// Wait until the key table snapshot satisfies `ready`.
///
/// Returns false on timeout.
pub async fn wait_for_keys(
    keys: &mut watch::Receiver<KeySnapshot>,
    ready: impl FnMut(&KeySnapshot) -> bool,
) -> bool {
    matches!(tokio::time::timeout(WAIT_TIMEOUT, keys.wait_for(ready)).await, Ok(Ok(_)))
}

/// Wait until the published timeline satisfies `ready`, and return it.
pub async fn wait_for_timeline(
    timeline: &mut watch::Receiver<Timeline>,
    ready: impl FnMut(&Timeline) -> bool,
) -> Option<Timeline> {
    match tokio::time::timeout(WAIT_TIMEOUT, timeline.wait_for(ready)).await {
        Ok(Ok(snapshot)) => Some(snapshot.clone()),
        Ok(Err(_)) | Err(_) => None,
    }
}
