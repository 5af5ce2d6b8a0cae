//! Text rendering for command output.

use veilfeed_client::{FeedEntry, PostState};
use veilfeed_crypto::PublicKey;
use veilfeed_proto::encode_npub;

/// Characters of an npub shown in feed lines.
const SHORT_NPUB: usize = 16;

/// `npub1abcd…` prefix used to label authors, or the hex key if it cannot
/// be encoded.
pub fn short_npub(pubkey: &PublicKey) -> String {
    let npub = encode_npub(pubkey).unwrap_or_else(|_| pubkey.to_hex());
    match npub.get(..SHORT_NPUB) {
        Some(prefix) => format!("{prefix}…"),
        None => npub,
    }
}

/// One feed line: time, author, then the plaintext or a state marker.
pub fn feed_line(entry: &FeedEntry, local: &PublicKey) -> String {
    let author = if entry.author == *local { "me".to_string() } else { short_npub(&entry.author) };
    let body = match &entry.state {
        PostState::Decrypted(text) => text.clone(),
        PostState::Pending => "<pending: no view key from this author>".to_string(),
        PostState::Failed(reason) => format!("<undecryptable: {reason}>"),
    };
    format!("{} {author} {body}", entry.created_at)
}
