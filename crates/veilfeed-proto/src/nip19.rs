//! NIP-19 bech32 text encoding for keys

use bech32::{Bech32, Hrp};
use veilfeed_crypto::{KeyError, Keys, PublicKey};
use zeroize::Zeroize;

use crate::error::Nip19Error;

const NPUB: Hrp = Hrp::parse_unchecked("npub");
const NSEC: Hrp = Hrp::parse_unchecked("nsec");

/// Encode a public key as `npub1...`.
///
/// # Errors
///
/// - `Bech32`: the encoder rejected the payload
pub fn encode_npub(pubkey: &PublicKey) -> Result<String, Nip19Error> {
    bech32::encode::<Bech32>(NPUB, pubkey.as_bytes())
        .map_err(|e| Nip19Error::Bech32 { reason: e.to_string() })
}

/// Decode an `npub1...` string.
///
/// # Errors
///
/// - `Bech32`: bad checksum or characters
/// - `WrongPrefix`: valid bech32 with a prefix other than `npub`
/// - `Key`: payload is not a 32-byte curve point
pub fn decode_npub(text: &str) -> Result<PublicKey, Nip19Error> {
    let data = decode_with_prefix(text.trim(), &NPUB, "npub")?;
    Ok(PublicKey::from_slice(&data)?)
}

/// Decode an `nsec1...` string into a key pair.
pub fn decode_nsec(text: &str) -> Result<Keys, Nip19Error> {
    let mut data = decode_with_prefix(text.trim(), &NSEC, "nsec")?;
    let result = match <[u8; 32]>::try_from(data.as_slice()) {
        Ok(mut secret) => {
            let keys = Keys::from_secret_bytes(&secret);
            secret.zeroize();
            keys.map_err(Nip19Error::from)
        },
        Err(_) => Err(Nip19Error::Key(KeyError::InvalidLength { expected: 32, actual: data.len() })),
    };

    data.zeroize();
    result
}

/// Parse a public key typed by a user: `npub1...` or 64 hex characters.
pub fn parse_public_key(text: &str) -> Result<PublicKey, Nip19Error> {
    let text = text.trim();
    if text.to_ascii_lowercase().starts_with("npub1") {
        decode_npub(text)
    } else {
        Ok(PublicKey::from_hex(text)?)
    }
}

fn decode_with_prefix(
    text: &str,
    expected: &Hrp,
    expected_name: &'static str,
) -> Result<Vec<u8>, Nip19Error> {
    let (hrp, data) =
        bech32::decode(text).map_err(|e| Nip19Error::Bech32 { reason: e.to_string() })?;

    if hrp.to_lowercase() != expected.to_lowercase() {
        return Err(Nip19Error::WrongPrefix { expected: expected_name, found: hrp.to_string() });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> PublicKey {
        PublicKey::from_hex("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap()
    }

    #[test]
    fn npub_roundtrip() {
        let npub = encode_npub(&generator()).unwrap();

        assert!(npub.starts_with("npub1"));
        assert_eq!(decode_npub(&npub).unwrap(), generator());
    }

    #[test]
    fn known_npub() {
        // NIP-19 example key
        let pubkey =
            PublicKey::from_hex("3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d")
                .unwrap();
        assert_eq!(
            encode_npub(&pubkey).unwrap(),
            "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6"
        );
    }

    #[test]
    fn nsec_is_not_npub() {
        let nsec = "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";
        assert!(matches!(decode_npub(nsec), Err(Nip19Error::WrongPrefix { .. })));
    }

    #[test]
    fn known_nsec() {
        let keys =
            decode_nsec("nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5").unwrap();
        let expected =
            Keys::from_secret_hex("67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa")
                .unwrap();
        assert_eq!(keys.public_key(), expected.public_key());
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let npub = encode_npub(&generator()).unwrap();
        let replacement = if npub.as_bytes()[10] == b'q' { "p" } else { "q" };
        let npub = format!("{}{replacement}{}", &npub[..10], &npub[11..]);

        assert!(matches!(decode_npub(&npub), Err(Nip19Error::Bech32 { .. })));
    }

    #[test]
    fn parse_accepts_npub_and_hex() {
        let npub = encode_npub(&generator()).unwrap();

        assert_eq!(parse_public_key(&npub).unwrap(), generator());
        assert_eq!(parse_public_key(&format!("  {}\n", generator().to_hex())).unwrap(), generator());
        assert!(parse_public_key("hello").is_err());
    }
}
