//! Session façade.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument};
use veilfeed_core::{
    Environment, OracleError, ProtocolError, Relay, SigningOracle, generate_view_key,
};
use veilfeed_crypto::{PublicKey, ViewKey, encrypt_post};
use veilfeed_proto::{Event, Kind, UnsignedEvent, parse_public_key};

use crate::{
    config::ClientConfig,
    distribution::share_view_key,
    error::ClientError,
    feed::{FeedAssembler, Friends, Timeline},
    inbox::InboxResolver,
    key_table::{AuthorKeyTable, OwnViewKey},
    task::TaskHandle,
};

/// One user session: identity, view key, friends, and the relay.
///
/// The friend list lives only for the session. A friend is recorded after
/// the view key was shared with them, so the list always names identities
/// that can read the local user's posts. Running feeds follow changes to
/// the list.
pub struct Client<E: Environment> {
    env: E,
    oracle: Arc<dyn SigningOracle>,
    relay: Arc<dyn Relay>,
    config: ClientConfig,
    local: PublicKey,
    own_key: OwnViewKey,
    table: AuthorKeyTable,
    friends: watch::Sender<Friends>,
}

impl<E: Environment> Client<E> {
    /// Start a session.
    ///
    /// # Errors
    ///
    /// - `OracleUnavailable`: no signer is connected
    /// - `SigningFailed`: the signer refused to reveal its public key
    pub async fn new(
        env: E,
        oracle: Arc<dyn SigningOracle>,
        relay: Arc<dyn Relay>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let local = oracle.public_key().await.map_err(oracle_error)?;
        debug!(local = %local, "session started");

        Ok(Self {
            env,
            oracle,
            relay,
            config,
            local,
            own_key: OwnViewKey::new(),
            table: AuthorKeyTable::new(),
            friends: watch::channel(Friends::new()).0,
        })
    }

    /// Local identity.
    pub fn local_pubkey(&self) -> PublicKey {
        self.local
    }

    /// Session configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The local view key: the held key, else the table's self entry.
    pub fn view_key(&self) -> Option<ViewKey> {
        self.own_key.get().or_else(|| self.table.get(&self.local))
    }

    /// Shared author key table.
    pub fn key_table(&self) -> &AuthorKeyTable {
        &self.table
    }

    /// Friends recorded this session.
    pub fn friends(&self) -> Friends {
        self.friends.borrow().clone()
    }

    /// Generate the view key and share it with the local identity.
    ///
    /// The key is held only after the self-share was published, so a failed
    /// call can be retried.
    ///
    /// # Errors
    ///
    /// - `ViewKeyExists`: a key is already held or was restored
    /// - `KeyGenerationFailed`: the entropy source failed
    /// - Any error from [`share_view_key`]
    #[instrument(skip(self), fields(local = %self.local))]
    pub async fn generate_view_key(&mut self) -> Result<ViewKey, ClientError> {
        if self.view_key().is_some() {
            return Err(ClientError::ViewKeyExists);
        }

        let view_key = generate_view_key(&self.env)?;
        let shared_at = self.env.unix_time();
        self.share(&view_key, &self.local).await?;

        self.own_key.set(view_key.clone(), shared_at);
        self.table.upsert(self.local, view_key.clone(), shared_at);
        info!("generated view key");
        Ok(view_key)
    }

    /// Share the view key with the identity in `text` (npub or hex) and
    /// record it as a friend.
    ///
    /// # Errors
    ///
    /// - `InvalidRecipientIdentity`: `text` is not a public key
    /// - `AlreadyFriend`: already a friend, or the local identity
    /// - `MissingViewKey`: no view key is held
    /// - Any error from [`share_view_key`]
    #[instrument(skip(self), fields(local = %self.local))]
    pub async fn add_friend(&mut self, text: &str) -> Result<PublicKey, ClientError> {
        let friend = parse_public_key(text).map_err(ProtocolError::from)?;

        if friend == self.local || self.friends.borrow().contains(&friend) {
            return Err(ClientError::AlreadyFriend(friend));
        }
        let view_key = self.view_key().ok_or(ClientError::MissingViewKey)?;

        self.share(&view_key, &friend).await?;
        self.friends.send_modify(|friends| {
            friends.insert(friend);
        });
        info!(friend = %friend, "added friend");
        Ok(friend)
    }

    /// Record `friend` without sharing, for a friend shared with in an
    /// earlier session. Returns false if already recorded.
    pub fn insert_friend(&mut self, friend: PublicKey) -> bool {
        friend != self.local && self.friends.send_if_modified(|friends| friends.insert(friend))
    }

    /// Forget a friend.
    ///
    /// Only the feed subscription changes, and only if the friend has not
    /// shared a key with us. A shared key cannot be taken back.
    pub fn remove_friend(&mut self, friend: &PublicKey) -> Result<(), ClientError> {
        if !self.friends.send_if_modified(|friends| friends.remove(friend)) {
            return Err(ClientError::UnknownFriend(*friend));
        }
        info!(friend = %friend, "removed friend");
        Ok(())
    }

    /// Encrypt `text` under the view key, sign and publish it.
    ///
    /// # Errors
    ///
    /// - `MissingViewKey`: no view key is held
    /// - `EncryptionFailed`: entropy failure or a body the cipher rejects
    /// - `OracleUnavailable` / `SigningFailed`: the signer failed
    /// - `PublishFailed`: the relay did not accept the post
    #[instrument(skip(self, text), fields(local = %self.local, len = text.len()))]
    pub async fn publish_post(&self, text: &str) -> Result<Event, ClientError> {
        let view_key = self.view_key().ok_or(ClientError::MissingViewKey)?;

        let nonce = self
            .env
            .random_32()
            .map_err(|e| ProtocolError::EncryptionFailed { reason: e.to_string() })?;
        let ciphertext = encrypt_post(text, &view_key, nonce)
            .map_err(|e| ProtocolError::EncryptionFailed { reason: e.to_string() })?;

        let unsigned = UnsignedEvent::new(
            self.local,
            self.env.unix_time(),
            Kind::ENCRYPTED_POST,
            vec![],
            ciphertext,
        );
        let post = self.oracle.sign_event(unsigned).await.map_err(oracle_error)?;
        if let Err(err) = post.verify() {
            return Err(ProtocolError::SigningFailed { reason: err.to_string() }.into());
        }

        self.relay
            .publish(&post)
            .await
            .map_err(|e| ProtocolError::PublishFailed { reason: e.to_string() })?;

        info!(post = %post.id, "published post");
        Ok(post)
    }

    /// Inbox resolver writing into this session's key table.
    pub fn inbox(&self) -> InboxResolver {
        InboxResolver::new(
            self.local,
            Arc::clone(&self.oracle),
            self.table.clone(),
            self.own_key.clone(),
        )
    }

    /// Resolve the stored inbox once and return how many keys were found.
    ///
    /// Restores the local view key from a self-share left by an earlier
    /// session.
    pub async fn sync_inbox(&self) -> Result<usize, ClientError> {
        let inbox = self.inbox();
        let mut subscription = self.relay.subscribe(vec![inbox.filter()]).await?;

        let resolved = inbox.drain_stored(&mut subscription).await;
        subscription.close();
        Ok(resolved)
    }

    /// Spawn the inbox resolver on a standing subscription.
    pub async fn start_inbox(&self) -> Result<TaskHandle, ClientError> {
        let inbox = self.inbox();
        let subscription = self.relay.subscribe(vec![inbox.filter()]).await?;
        Ok(inbox.spawn(subscription))
    }

    /// Spawn the feed assembler over posts by the local identity, friends,
    /// and every author whose key is in the table.
    ///
    /// Returns the task handle and the timeline receiver. The feed follows
    /// friends added or removed and keys received after it started.
    pub async fn start_feed(&self) -> Result<(TaskHandle, watch::Receiver<Timeline>), ClientError> {
        let (assembler, timeline) = FeedAssembler::new(
            Arc::clone(&self.relay),
            self.local,
            self.own_key.clone(),
            self.table.subscribe(),
            self.friends.subscribe(),
            self.config.feed_limit,
        );
        Ok((assembler.start().await?, timeline))
    }

    async fn share(&self, view_key: &ViewKey, recipient: &PublicKey) -> Result<Event, ClientError> {
        let wrap = share_view_key(
            &self.env,
            self.oracle.as_ref(),
            self.relay.as_ref(),
            &self.local,
            view_key,
            recipient,
        )
        .await?;
        Ok(wrap)
    }
}

impl<E: Environment> std::fmt::Debug for Client<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("local", &self.local)
            .field("friends", &self.friends.borrow().len())
            .field("keys", &self.table.len())
            .finish_non_exhaustive()
    }
}

fn oracle_error(err: OracleError) -> ClientError {
    let err = match err {
        OracleError::Unavailable => ProtocolError::OracleUnavailable,
        OracleError::Rejected { reason } => ProtocolError::SigningFailed { reason },
    };
    err.into()
}
