//! Inbox and feed tasks running together over the in-memory relay.

use veilfeed_client::{PostState, Timeline};
use veilfeed_crypto::encrypt_post;
use veilfeed_harness::{
    Scenario,
    scenario::{identity, pubkey, wait_for_keys, wait_for_timeline},
};
use veilfeed_proto::{Kind, Tag, UnsignedEvent};

fn plaintexts(timeline: &Timeline) -> Vec<Option<&str>> {
    timeline.iter().map(|entry| entry.plaintext()).collect()
}

#[tokio::test]
async fn friend_decrypts_and_stranger_sees_pending() {
    let scenario = Scenario::new(20);
    let mut alice = scenario.client(1).await.unwrap();
    let mut bob = scenario.client(2).await.unwrap();
    let mut carol = scenario.client(3).await.unwrap();

    alice.generate_view_key().await.unwrap();
    alice.add_friend(&scenario.npub(2)).await.unwrap();
    let post = alice.publish_post("hello friends").await.unwrap();

    let _bob_inbox = bob.start_inbox().await.unwrap();
    assert!(
        wait_for_keys(&mut bob.key_table().subscribe(), |keys| keys.contains_key(&pubkey(1)))
            .await
    );
    bob.insert_friend(pubkey(1));
    let (_bob_feed, mut bob_timeline) = bob.start_feed().await.unwrap();

    let timeline = wait_for_timeline(&mut bob_timeline, |t| !t.is_empty()).await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].id, post.id);
    assert_eq!(timeline[0].author, pubkey(1));
    assert_eq!(plaintexts(&timeline), [Some("hello friends")]);

    assert_eq!(carol.sync_inbox().await.unwrap(), 0);
    carol.insert_friend(pubkey(1));
    let (_carol_feed, mut carol_timeline) = carol.start_feed().await.unwrap();

    let timeline = wait_for_timeline(&mut carol_timeline, |t| !t.is_empty()).await.unwrap();
    assert_eq!(timeline[0].state, PostState::Pending);
}

#[tokio::test]
async fn pending_post_decrypts_when_key_arrives() {
    let scenario = Scenario::new(21);
    let mut alice = scenario.client(1).await.unwrap();
    let mut bob = scenario.client(2).await.unwrap();

    let _bob_inbox = bob.start_inbox().await.unwrap();
    bob.insert_friend(pubkey(1));
    let (_bob_feed, mut bob_timeline) = bob.start_feed().await.unwrap();

    alice.generate_view_key().await.unwrap();
    alice.publish_post("before sharing").await.unwrap();

    let pending = wait_for_timeline(&mut bob_timeline, |t| !t.is_empty()).await.unwrap();
    assert_eq!(plaintexts(&pending), [None]);

    alice.add_friend(&scenario.npub(2)).await.unwrap();

    let timeline =
        wait_for_timeline(&mut bob_timeline, |t| t.iter().all(|e| e.plaintext().is_some()))
            .await
            .unwrap();
    assert_eq!(plaintexts(&timeline), [Some("before sharing")]);
    assert_eq!(timeline[0].id, pending[0].id, "re-decrypted in place, not duplicated");
}

#[tokio::test]
async fn own_posts_decrypt_and_order_newest_first() {
    let scenario = Scenario::new(22);
    let mut alice = scenario.client(1).await.unwrap();
    alice.generate_view_key().await.unwrap();

    for text in ["first", "second", "third"] {
        alice.publish_post(text).await.unwrap();
        scenario.env.advance(60);
    }

    let (_feed, mut timeline) = alice.start_feed().await.unwrap();
    let timeline = wait_for_timeline(&mut timeline, |t| t.len() == 3).await.unwrap();

    assert_eq!(plaintexts(&timeline), [Some("third"), Some("second"), Some("first")]);
}

#[tokio::test]
async fn duplicate_delivery_is_ignored() {
    let scenario = Scenario::new(23);
    let mut alice = scenario.client(1).await.unwrap();
    alice.generate_view_key().await.unwrap();

    let (_feed, mut timeline) = alice.start_feed().await.unwrap();
    let post = alice.publish_post("once").await.unwrap();
    wait_for_timeline(&mut timeline, |t| t.len() == 1).await.unwrap();

    // A relay re-sending the same event
    scenario.relay.broadcast(&post);
    alice.publish_post("twice").await.unwrap();

    let timeline = wait_for_timeline(&mut timeline, |t| t.len() == 2).await.unwrap();
    assert_eq!(timeline.iter().filter(|entry| entry.id == post.id).count(), 1);
}

#[tokio::test]
async fn malformed_wraps_are_dropped_and_inbox_continues() {
    let scenario = Scenario::new(24);
    let mut alice = scenario.client(1).await.unwrap();
    let bob = scenario.client(2).await.unwrap();

    // Signed, addressed to bob, but not a NIP-44 payload
    let junk = identity(9);
    scenario.relay.inject(
        UnsignedEvent::new(
            junk.public_key(),
            1,
            Kind::GIFT_WRAP,
            vec![Tag::pubkey(&pubkey(2))],
            "not a payload",
        )
        .sign_with(&junk, &[0; 32]),
    );

    // Forged id
    let mut forged = UnsignedEvent::new(
        junk.public_key(),
        2,
        Kind::GIFT_WRAP,
        vec![Tag::pubkey(&pubkey(2))],
        "x",
    )
    .sign_with(&junk, &[0; 32]);
    forged.content = "tampered".to_string();
    scenario.relay.inject(forged);

    let _inbox = bob.start_inbox().await.unwrap();

    alice.generate_view_key().await.unwrap();
    alice.add_friend(&scenario.npub(2)).await.unwrap();

    assert!(
        wait_for_keys(&mut bob.key_table().subscribe(), |keys| keys.contains_key(&pubkey(1)))
            .await
    );
    assert_eq!(bob.key_table().len(), 1);
}

#[tokio::test]
async fn forged_posts_are_not_shown() {
    let scenario = Scenario::new(25);
    let mut alice = scenario.client(1).await.unwrap();
    let view_key = alice.generate_view_key().await.unwrap();

    // Claims alice as author but signed by someone else
    let mallory = identity(9);
    let ciphertext = encrypt_post("spoofed", &view_key, [7; 32]).unwrap();
    let mut forged =
        UnsignedEvent::new(mallory.public_key(), 5, Kind::ENCRYPTED_POST, vec![], ciphertext)
            .sign_with(&mallory, &[0; 32]);
    forged.pubkey = pubkey(1);
    scenario.relay.inject(forged);

    alice.publish_post("genuine").await.unwrap();

    let (_feed, mut timeline) = alice.start_feed().await.unwrap();
    let timeline = wait_for_timeline(&mut timeline, |t| !t.is_empty()).await.unwrap();
    assert_eq!(plaintexts(&timeline), [Some("genuine")]);
}

#[tokio::test]
async fn closing_inbox_leaves_feed_running() {
    let scenario = Scenario::new(26);
    let mut alice = scenario.client(1).await.unwrap();
    alice.generate_view_key().await.unwrap();

    let mut inbox = alice.start_inbox().await.unwrap();
    let (_feed, mut timeline) = alice.start_feed().await.unwrap();

    inbox.close();
    inbox.close();
    inbox.join().await;

    alice.publish_post("after close").await.unwrap();
    let timeline = wait_for_timeline(&mut timeline, |t| !t.is_empty()).await.unwrap();
    assert_eq!(plaintexts(&timeline), [Some("after close")]);
    assert_eq!(scenario.relay.subscription_count(), 1);
}

#[tokio::test]
async fn removed_friend_drops_from_next_feed() {
    let scenario = Scenario::new(27);
    let mut bob = scenario.client(2).await.unwrap();
    let mut alice = scenario.client(1).await.unwrap();

    alice.generate_view_key().await.unwrap();
    alice.publish_post("from alice").await.unwrap();
    bob.generate_view_key().await.unwrap();
    bob.add_friend(&scenario.npub(1)).await.unwrap();
    bob.publish_post("from bob").await.unwrap();

    bob.remove_friend(&pubkey(1)).unwrap();
    let (_feed, mut timeline) = bob.start_feed().await.unwrap();
    let timeline = wait_for_timeline(&mut timeline, |t| !t.is_empty()).await.unwrap();

    assert!(timeline.iter().all(|entry| entry.author == pubkey(2)));
}

#[tokio::test]
async fn key_received_after_start_brings_author_into_feed() {
    let scenario = Scenario::new(28);
    let mut alice = scenario.client(1).await.unwrap();
    let bob = scenario.client(2).await.unwrap();

    let _bob_inbox = bob.start_inbox().await.unwrap();
    let (_bob_feed, mut bob_timeline) = bob.start_feed().await.unwrap();

    alice.generate_view_key().await.unwrap();
    alice.publish_post("for bob").await.unwrap();
    alice.add_friend(&scenario.npub(2)).await.unwrap();

    let timeline = wait_for_timeline(&mut bob_timeline, |t| {
        !t.is_empty() && t.iter().all(|entry| entry.plaintext().is_some())
    })
    .await
    .unwrap();
    assert_eq!(plaintexts(&timeline), [Some("for bob")]);
    assert!(bob.friends().is_empty());
}

#[tokio::test]
async fn friend_added_after_start_joins_feed() {
    let scenario = Scenario::new(29);
    let mut alice = scenario.client(1).await.unwrap();
    let mut bob = scenario.client(2).await.unwrap();

    alice.generate_view_key().await.unwrap();
    alice.publish_post("from alice").await.unwrap();
    bob.generate_view_key().await.unwrap();

    let (_feed, mut timeline) = bob.start_feed().await.unwrap();
    bob.add_friend(&scenario.npub(1)).await.unwrap();

    let timeline =
        wait_for_timeline(&mut timeline, |t| t.iter().any(|entry| entry.author == pubkey(1)))
            .await
            .unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].state, PostState::Pending);
}

#[tokio::test]
async fn own_key_restored_after_start_decrypts_own_posts() {
    let scenario = Scenario::new(30);
    let mut earlier = scenario.client(1).await.unwrap();
    earlier.generate_view_key().await.unwrap();
    earlier.publish_post("earlier session").await.unwrap();

    let session = scenario.client(1).await.unwrap();
    let (_feed, mut timeline) = session.start_feed().await.unwrap();
    let pending = wait_for_timeline(&mut timeline, |t| !t.is_empty()).await.unwrap();
    assert_eq!(plaintexts(&pending), [None]);

    let _inbox = session.start_inbox().await.unwrap();
    let timeline =
        wait_for_timeline(&mut timeline, |t| t.iter().all(|entry| entry.plaintext().is_some()))
            .await
            .unwrap();
    assert_eq!(plaintexts(&timeline), [Some("earlier session")]);
    assert_eq!(session.view_key(), earlier.view_key());
}
