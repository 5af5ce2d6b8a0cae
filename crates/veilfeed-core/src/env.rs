//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (wall-clock time and
//! randomness). Production uses the OS clock and entropy source; simulation
//! uses a manual clock and a seeded RNG so envelope bytes are reproducible.

use thiserror::Error;
use veilfeed_proto::Timestamp;

/// The entropy source could not produce bytes.
///
/// Never papered over with a weaker source: callers surface it as a key
/// generation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entropy source failed: {reason}")]
pub struct EntropyError {
    /// Source error
    pub reason: String,
}

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - `random_bytes()` either fills the whole buffer or returns an error
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time in seconds since the Unix epoch.
    ///
    /// Used for `created_at`; relays and feeds order by it, so it should
    /// track real time but is not required to be monotonic.
    fn unix_time(&self) -> Timestamp;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError>;

    /// Draws a random 32-byte array (nonces, aux randomness, secrets).
    fn random_32(&self) -> Result<[u8; 32], EntropyError> {
        let mut bytes = [0u8; 32];
        self.random_bytes(&mut bytes)?;
        Ok(bytes)
    }
}
