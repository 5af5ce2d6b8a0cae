//! Fuzz target for the feed state machine
//!
//! Drives `Feed` with arbitrary interleavings of valid posts, corrupted
//! posts, replays and key updates.
//!
//! # Invariants
//!
//! - Handling never panics
//! - One timeline entry per distinct accepted post id
//! - A post whose author has the right key in the table is decrypted

#![no_main]

use std::{collections::HashMap, sync::Arc};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use veilfeed_client::{Feed, FeedEvent, KeySnapshot, PostState};
use veilfeed_crypto::{Keys, ViewKey, encrypt_post};
use veilfeed_proto::{Event, Kind, UnsignedEvent};

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Post { author: u8, created_at: u16, text: String },
    Corrupt { author: u8, created_at: u16, content: String },
    Replay(u8),
    Key { author: u8, wrong: bool },
    EndOfStoredEvents,
}

fn author_keys(author: u8) -> Option<Keys> {
    Keys::from_secret_bytes(&[author % 4 + 1; 32]).ok()
}

fn view_key(author: u8, wrong: bool) -> Option<ViewKey> {
    let byte = author % 4 + if wrong { 0x61 } else { 0x41 };
    ViewKey::from_bytes([byte; 32]).ok()
}

fn post(author: u8, created_at: u16, content: String) -> Option<Event> {
    let keys = author_keys(author)?;
    Some(
        UnsignedEvent::new(
            keys.public_key(),
            u64::from(created_at),
            Kind::ENCRYPTED_POST,
            vec![],
            content,
        )
        .sign_with(&keys, &[0; 32]),
    )
}

fuzz_target!(|steps: Vec<Step>| {
    let Some(local) = Keys::from_secret_bytes(&[0x7F; 32]).ok() else {
        return;
    };
    let mut feed = Feed::new(local.public_key(), None, KeySnapshot::default());
    let mut table = HashMap::new();
    let mut sent: Vec<Event> = Vec::new();

    for step in steps {
        let event = match step {
            Step::Post { author, created_at, text } => view_key(author, false)
                .and_then(|key| encrypt_post(&text, &key, [created_at as u8; 32]).ok())
                .and_then(|content| post(author, created_at, content)),
            Step::Corrupt { author, created_at, content } => post(author, created_at, content),
            Step::Replay(index) => {
                (!sent.is_empty()).then(|| sent[usize::from(index) % sent.len()].clone())
            },
            Step::Key { author, wrong } => {
                if let (Some(keys), Some(key)) = (author_keys(author), view_key(author, wrong)) {
                    table.insert(keys.public_key(), key);
                    feed.handle(FeedEvent::KeysUpdated(Arc::new(table.clone())));
                }
                None
            },
            Step::EndOfStoredEvents => {
                feed.handle(FeedEvent::EndOfStoredEvents);
                None
            },
        };

        if let Some(event) = event {
            sent.push(event.clone());
            feed.handle(FeedEvent::Post(Box::new(event)));
        }
    }

    let mut ids: Vec<_> = sent.iter().map(|event| event.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(feed.len(), ids.len());

    for entry in feed.timeline() {
        let Some(author) = (0..4).find(|a| author_keys(*a).map(|k| k.public_key()) == Some(entry.author))
        else {
            continue;
        };
        let right_key = view_key(author, false);
        let encrypted_by_us = right_key
            .as_ref()
            .is_some_and(|key| veilfeed_crypto::decrypt_post(&entry.ciphertext, key).is_ok());
        if table.get(&entry.author) == right_key.as_ref() && encrypted_by_us {
            assert!(matches!(entry.state, PostState::Decrypted(_)));
        }
    }
});
