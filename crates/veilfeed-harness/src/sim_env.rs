//! Simulated environment: seeded randomness and a manual clock.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use veilfeed_core::{EntropyError, Environment};
use veilfeed_proto::Timestamp;

/// Clock value new environments start at (2023-11-14).
pub const START_TIME: Timestamp = 1_700_000_000;

/// Deterministic [`Environment`].
///
/// Clones share the RNG stream and the clock, so every component in a
/// scenario draws from one reproducible sequence.
#[derive(Debug, Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    clock: Arc<AtomicU64>,
    entropy_broken: Arc<AtomicBool>,
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with a specific seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            clock: Arc::new(AtomicU64::new(START_TIME)),
            entropy_broken: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the clock.
    pub fn set_time(&self, now: Timestamp) {
        self.clock.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: u64) {
        self.clock.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Make every following `random_bytes` call fail (or succeed again).
    pub fn break_entropy(&self, broken: bool) {
        self.entropy_broken.store(broken, Ordering::SeqCst);
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn unix_time(&self) -> Timestamp {
        self.clock.load(Ordering::SeqCst)
    }

    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError> {
        if self.entropy_broken.load(Ordering::SeqCst) {
            return Err(EntropyError { reason: "simulated entropy failure".to_string() });
        }
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
        Ok(())
    }
}
