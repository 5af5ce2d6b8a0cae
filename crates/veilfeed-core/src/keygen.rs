//! Key generation from the environment's entropy source

use tracing::warn;
use veilfeed_crypto::{Keys, ViewKey};
use zeroize::Zeroize;

use crate::{env::Environment, error::ProtocolError};

/// Draws before giving up on finding a valid scalar. A uniform draw is
/// invalid with probability below 2^-127, so hitting this limit means the
/// entropy source is broken.
const MAX_DRAWS: usize = 4;

/// Generate a fresh view key.
///
/// # Errors
///
/// - `KeyGenerationFailed`: the entropy source failed or kept producing
///   invalid scalars
pub fn generate_view_key<E: Environment>(env: &E) -> Result<ViewKey, ProtocolError> {
    draw(env, |bytes| ViewKey::from_bytes(bytes).ok())
}

/// Generate a fresh secp256k1 key pair (used for one-shot gift-wrap keys).
pub fn generate_keys<E: Environment>(env: &E) -> Result<Keys, ProtocolError> {
    draw(env, |bytes| Keys::from_secret_bytes(&bytes).ok())
}

fn draw<E, T>(env: &E, mut build: impl FnMut([u8; 32]) -> Option<T>) -> Result<T, ProtocolError>
where
    E: Environment,
{
    for attempt in 1..=MAX_DRAWS {
        let mut bytes = env
            .random_32()
            .map_err(|e| ProtocolError::KeyGenerationFailed { reason: e.to_string() })?;

        let key = build(bytes);
        bytes.zeroize();

        if let Some(key) = key {
            return Ok(key);
        }
        warn!(attempt, "drew invalid secret scalar, retrying");
    }

    Err(ProtocolError::KeyGenerationFailed {
        reason: format!("no valid scalar after {MAX_DRAWS} draws"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestEnv;

    #[test]
    fn view_keys_differ_between_draws() {
        let env = TestEnv::new(1);
        assert_ne!(generate_view_key(&env).unwrap(), generate_view_key(&env).unwrap());
    }

    #[test]
    fn same_seed_same_key() {
        assert_eq!(
            generate_view_key(&TestEnv::new(7)).unwrap(),
            generate_view_key(&TestEnv::new(7)).unwrap()
        );
    }

    #[test]
    fn entropy_failure_is_key_generation_failed() {
        let env = TestEnv::failing();

        assert!(matches!(
            generate_view_key(&env),
            Err(ProtocolError::KeyGenerationFailed { .. })
        ));
        assert!(matches!(generate_keys(&env), Err(ProtocolError::KeyGenerationFailed { .. })));
    }

    #[test]
    fn invalid_scalars_are_redrawn() {
        // First draw is all 0xFF (above the curve order), second is valid
        let env = TestEnv::scripted(vec![[0xFF; 32], [0x11; 32]]);
        assert_eq!(generate_view_key(&env).unwrap(), ViewKey::from_bytes([0x11; 32]).unwrap());
    }

    #[test]
    fn persistent_invalid_scalars_give_up() {
        let env = TestEnv::scripted(vec![[0; 32]; MAX_DRAWS]);
        assert!(matches!(generate_keys(&env), Err(ProtocolError::KeyGenerationFailed { .. })));
    }
}
