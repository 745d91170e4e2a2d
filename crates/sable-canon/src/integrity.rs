//! Content hashing and verification over canonical bytes.
//!
//! A [`ContentHash`] pairs an algorithm tag with the raw digest bytes. Its
//! textual form is `<algorithm>:<lowercase-hex>`; parsing accepts both the
//! dashed (`sha-256`) and undashed (`sha256`) algorithm spellings,
//! case-insensitively, while hex bytes are accepted strictly lowercase.
//! Digest equality is constant-time.

use md5::Md5;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

use crate::canon::canonicalize;

/// Supported digest algorithms. Sha256 is the default and recommended
/// choice; Md5 exists only to verify legacy bundle manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
    Md5,
}

impl HashAlgorithm {
    /// Canonical textual tag, dashed spelling.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha-256",
            HashAlgorithm::Sha384 => "sha-384",
            HashAlgorithm::Sha512 => "sha-512",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Digest size in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
            HashAlgorithm::Md5 => 16,
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "sha384" | "sha-384" => Ok(HashAlgorithm::Sha384),
            "sha512" | "sha-512" => Ok(HashAlgorithm::Sha512),
            "md5" => Ok(HashAlgorithm::Md5),
            other => Err(IntegrityError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Error raised while parsing a textual hash form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    UnknownAlgorithm(String),
    MissingSeparator,
    InvalidHex(String),
    WrongDigestLength { expected: usize, actual: usize },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::UnknownAlgorithm(name) => {
                write!(f, "unknown hash algorithm '{name}'")
            }
            IntegrityError::MissingSeparator => {
                write!(f, "hash text must look like '<algorithm>:<hex>'")
            }
            IntegrityError::InvalidHex(text) => {
                write!(f, "invalid lowercase hex '{text}'")
            }
            IntegrityError::WrongDigestLength { expected, actual } => {
                write!(f, "digest is {actual} bytes, expected {expected}")
            }
        }
    }
}

impl std::error::Error for IntegrityError {}

/// A digest tagged with the algorithm that produced it.
///
/// Equality compares the byte arrays in constant time; a mismatched
/// algorithm tag or digest length is a non-match without touching bytes.
#[derive(Debug, Clone, Eq)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl ContentHash {
    pub fn new(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse the textual form `<algorithm>:<lowercase-hex>`.
    ///
    /// The algorithm token is case-insensitive and accepts both spellings;
    /// the hex payload must be strictly lowercase and the right length for
    /// the algorithm.
    pub fn parse(text: &str) -> Result<Self, IntegrityError> {
        let (alg_text, hex_text) = text
            .split_once(':')
            .ok_or(IntegrityError::MissingSeparator)?;
        let algorithm: HashAlgorithm = alg_text.parse()?;
        if !hex_text
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(IntegrityError::InvalidHex(hex_text.to_string()));
        }
        let bytes =
            hex::decode(hex_text).map_err(|_| IntegrityError::InvalidHex(hex_text.to_string()))?;
        if bytes.len() != algorithm.digest_len() {
            return Err(IntegrityError::WrongDigestLength {
                expected: algorithm.digest_len(),
                actual: bytes.len(),
            });
        }
        Ok(Self { algorithm, bytes })
    }
}

impl PartialEq for ContentHash {
    fn eq(&self, other: &Self) -> bool {
        if self.algorithm != other.algorithm || self.bytes.len() != other.bytes.len() {
            return false;
        }
        // Accumulate XOR differences so the comparison never exits early.
        let mut diff = 0u8;
        for (a, b) in self.bytes.iter().zip(other.bytes.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHash::parse(s)
    }
}

/// Hash a raw byte slice.
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> ContentHash {
    let bytes = match algorithm {
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        HashAlgorithm::Md5 => Md5::digest(data).to_vec(),
    };
    ContentHash::new(algorithm, bytes)
}

/// Hash a string's UTF-8 bytes.
pub fn hash_string(text: &str, algorithm: HashAlgorithm) -> ContentHash {
    hash_bytes(text.as_bytes(), algorithm)
}

/// Canonicalize a JSON value, then hash the canonical bytes.
pub fn hash_json(value: &Value, algorithm: HashAlgorithm) -> ContentHash {
    hash_string(&canonicalize(value), algorithm)
}

/// Recompute the digest of `data` and compare against `expected`.
pub fn verify(data: &[u8], expected: &ContentHash) -> bool {
    hash_bytes(data, expected.algorithm) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_matches_known_vector() {
        let digest = hash_string("abc", HashAlgorithm::Sha256);
        assert_eq!(
            digest.to_string(),
            "sha-256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn md5_matches_known_vector() {
        let digest = hash_string("abc", HashAlgorithm::Md5);
        assert_eq!(digest.to_string(), "md5:900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn hash_json_ignores_key_order() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(
            hash_json(&a, HashAlgorithm::Sha256),
            hash_json(&b, HashAlgorithm::Sha256)
        );
    }

    #[test]
    fn hash_json_equals_hash_of_canonical_text() {
        let doc = json!({"a": 1, "b": 2});
        assert_eq!(
            hash_json(&doc, HashAlgorithm::Sha256),
            hash_string(r#"{"a":1,"b":2}"#, HashAlgorithm::Sha256)
        );
    }

    #[test]
    fn verify_round_trips_every_algorithm() {
        let data = b"bundle payload";
        for algorithm in [
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
            HashAlgorithm::Md5,
        ] {
            let digest = hash_bytes(data, algorithm);
            assert!(verify(data, &digest), "{algorithm} digest should verify");
        }
    }

    #[test]
    fn verify_rejects_flipped_payload_bit() {
        let mut data = b"bundle payload".to_vec();
        let digest = hash_bytes(&data, HashAlgorithm::Sha256);
        data[0] ^= 0x01;
        assert!(!verify(&data, &digest));
    }

    #[test]
    fn verify_rejects_flipped_digest_bit() {
        let data = b"bundle payload";
        let digest = hash_bytes(data, HashAlgorithm::Sha256);
        let mut bytes = digest.bytes().to_vec();
        bytes[31] ^= 0x80;
        let tampered = ContentHash::new(HashAlgorithm::Sha256, bytes);
        assert!(!verify(data, &tampered));
    }

    #[test]
    fn mismatched_algorithm_never_compares_equal() {
        let a = hash_string("abc", HashAlgorithm::Sha256);
        let b = hash_string("abc", HashAlgorithm::Sha512);
        assert_ne!(a, b);
    }

    #[test]
    fn parse_accepts_both_spellings_case_insensitively() {
        let digest = hash_string("abc", HashAlgorithm::Sha256);
        let text = digest.to_string();
        let undashed = text.replace("sha-256", "SHA256");
        assert_eq!(ContentHash::parse(&undashed).expect("parse"), digest);
    }

    #[test]
    fn parse_rejects_uppercase_hex() {
        let text = "sha-256:BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        assert!(matches!(
            ContentHash::parse(text),
            Err(IntegrityError::InvalidHex(_))
        ));
    }

    #[test]
    fn parse_rejects_wrong_digest_length() {
        assert!(matches!(
            ContentHash::parse("sha-256:abcd"),
            Err(IntegrityError::WrongDigestLength { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_algorithm() {
        assert!(matches!(
            ContentHash::parse("crc32:abcd"),
            Err(IntegrityError::UnknownAlgorithm(_))
        ));
    }
}
