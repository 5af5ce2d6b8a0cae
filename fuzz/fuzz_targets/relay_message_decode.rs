//! Fuzz target for NIP-01 wire message decoding
//!
//! # Invariants
//!
//! - Decoding arbitrary text never panics
//! - Anything that decodes re-encodes and decodes to the same message

#![no_main]

use libfuzzer_sys::fuzz_target;
use veilfeed_proto::{ClientMessage, Event, RelayMessage};

fuzz_target!(|text: &str| {
    if let Ok(message) = RelayMessage::from_json(text) {
        if let Ok(encoded) = message.to_json() {
            assert_eq!(RelayMessage::from_json(&encoded).ok(), Some(message));
        }
    }

    if let Ok(message) = ClientMessage::from_json(text) {
        if let Ok(encoded) = message.to_json() {
            assert_eq!(ClientMessage::from_json(&encoded).ok(), Some(message));
        }
    }

    if let Ok(event) = Event::from_json(text) {
        let _ = event.verify();
    }
});
