//! Sharing a view key with one recipient.

use tracing::info;
use veilfeed_core::{
    Environment, ProtocolError, Relay, SigningOracle,
    envelope::{build_rumor, seal, wrap},
};
use veilfeed_crypto::{PublicKey, ViewKey};
use veilfeed_proto::Event;

/// Deliver `view_key` to `recipient` through a gift wrap published on
/// `relay`.
///
/// Sharing with oneself uses the same path; that self-share is how a
/// session restores its own key later. Every call wraps under a new
/// ephemeral key.
///
/// Returns the published gift wrap.
///
/// # Errors
///
/// - Any envelope error from [`seal`] or [`wrap`]
/// - `PublishFailed`: the relay did not accept the gift wrap
pub async fn share_view_key<E: Environment>(
    env: &E,
    oracle: &dyn SigningOracle,
    relay: &dyn Relay,
    local: &PublicKey,
    view_key: &ViewKey,
    recipient: &PublicKey,
) -> Result<Event, ProtocolError> {
    let now = env.unix_time();

    let rumor = build_rumor(*local, view_key, now);
    let sealed = seal(&rumor, local, recipient, oracle, now).await?;
    let wrapped = wrap(&sealed, recipient, env, now)?;

    relay
        .publish(&wrapped)
        .await
        .map_err(|e| ProtocolError::PublishFailed { reason: e.to_string() })?;

    info!(recipient = %recipient, wrap = %wrapped.id, "shared view key");
    Ok(wrapped)
}
