//! Public key canonicalization.
//!
//! Providers hand back the same key in different textual encodings (hex
//! from one signer, base64 from another). Every comparison goes through
//! [`PublicKey`], which holds the raw bytes and renders as lowercase hex.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::KeyError;

pub const PUBLIC_KEY_LEN: usize = 32;

/// A public key in canonical form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Parse hex (any case) or base64 (standard or URL-safe, padded or not).
    pub fn parse(text: &str) -> Result<Self, KeyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(KeyError::Empty);
        }

        let bytes = if text.len() == PUBLIC_KEY_LEN * 2
            && text.chars().all(|c| c.is_ascii_hexdigit())
        {
            hex::decode(text).map_err(|_| KeyError::UnrecognizedEncoding)?
        } else {
            decode_base64(text).ok_or(KeyError::UnrecognizedEncoding)?
        };

        let len = bytes.len();
        let array: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::WrongLength { len })?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn encode(&self, encoding: KeyEncoding) -> String {
        match encoding {
            KeyEncoding::Hex => self.to_hex(),
            KeyEncoding::Base64 => self.to_base64(),
        }
    }
}

/// Textual encodings a signer may report a key in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    #[default]
    Hex,
    Base64,
}

fn decode_base64(text: &str) -> Option<Vec<u8>> {
    [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Result of comparing an authenticated key with the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyComparison {
    Matches,
    Mismatch,
}

/// Compare two textual keys after canonicalizing both.
pub fn compare_keys(expected: &str, actual: &str) -> Result<KeyComparison, KeyError> {
    let expected = PublicKey::parse(expected)?;
    let actual = PublicKey::parse(actual)?;
    Ok(if expected == actual {
        KeyComparison::Matches
    } else {
        KeyComparison::Mismatch
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; PUBLIC_KEY_LEN])
    }

    #[test]
    fn same_key_in_hex_and_base64_matches() {
        let k = key(0xab);
        assert_eq!(
            compare_keys(&k.to_hex(), &k.to_base64()).unwrap(),
            KeyComparison::Matches
        );
        assert_eq!(
            compare_keys(&k.to_hex().to_uppercase(), &k.to_hex()).unwrap(),
            KeyComparison::Matches
        );
    }

    #[test]
    fn url_safe_unpadded_base64_is_accepted() {
        let k = PublicKey::from_bytes(std::array::from_fn(|i| (i as u8).wrapping_mul(37)));
        let text = URL_SAFE_NO_PAD.encode(k.as_bytes());
        assert_eq!(PublicKey::parse(&text).unwrap(), k);
    }

    #[test]
    fn different_keys_in_same_encoding_mismatch() {
        assert_eq!(
            compare_keys(&key(1).to_hex(), &key(2).to_hex()).unwrap(),
            KeyComparison::Mismatch
        );
        assert_eq!(
            compare_keys(&key(1).to_base64(), &key(2).to_base64()).unwrap(),
            KeyComparison::Mismatch
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(PublicKey::parse("   "), Err(KeyError::Empty));
        assert_eq!(
            PublicKey::parse("not a key!"),
            Err(KeyError::UnrecognizedEncoding)
        );
        // Valid base64 of 3 bytes.
        assert_eq!(PublicKey::parse("AQID"), Err(KeyError::WrongLength { len: 3 }));
    }

    #[test]
    fn display_and_serde_use_lowercase_hex() {
        let k = key(0x0f);
        assert_eq!(k.to_string(), "0f".repeat(32));
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, format!("\"{}\"", "0f".repeat(32)));
        let parsed: PublicKey = serde_json::from_str(&format!("\"{}\"", k.to_base64())).unwrap();
        assert_eq!(parsed, k);
    }
}
