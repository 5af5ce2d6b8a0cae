//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` reads the wall clock for `created_at` and draws every nonce,
//! ephemeral key and view key from the OS RNG via getrandom. Not
//! reproducible; simulations use the harness `SimEnv` instead.

use std::time::{SystemTime, UNIX_EPOCH};

use veilfeed_core::env::{EntropyError, Environment};
use veilfeed_proto::Timestamp;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). A failure is
/// returned to the caller and surfaces as `KeyGenerationFailed`; it is never
/// replaced by a weaker source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn unix_time(&self) -> Timestamp {
        // A clock before 1970 is a misconfigured host; report the epoch.
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
    }

    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError> {
        getrandom::fill(buffer).map_err(|e| EntropyError { reason: e.to_string() })
    }
}
