//! Cryptographic hashing utilities for the ledger
//!
//! Provides the fixed-width [`Hash`] type, the double SHA-256 used for
//! block and transaction identity, and conversions between hashes and
//! arbitrary-precision integers for target arithmetic.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Length of a hash in bytes
pub const HASH_LEN: usize = 32;

/// Errors produced when parsing a hash from text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("Hex string has odd length {0}")]
    OddLength(usize),
    #[error("Invalid hex character in {0:?}")]
    InvalidHex(String),
    #[error("Hex string too long: {0} digits")]
    TooLong(usize),
}

/// Canonical byte encoding of a hashable entity
///
/// The encoding is fixed-layout and little-endian so that hashing the same
/// value always yields the same digest, independent of any serde format.
pub trait Marshal {
    fn marshal(&self) -> Vec<u8>;
}

/// A 256-bit digest.
///
/// Bytes are stored least-significant first: `bytes[HASH_LEN - 1]` is the
/// most significant byte when the hash is read as a number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// The all-zero hash
    pub const fn zero() -> Self {
        Self([0u8; HASH_LEN])
    }

    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a hash from a slice of exactly [`HASH_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Compare against `other`, returning whether the relation `ord` holds
    pub fn compare_to(&self, other: &Hash, ord: Ordering) -> bool {
        self.cmp(other) == ord
    }

    /// Whether this hash, read as a number, is strictly below `target`
    pub fn meets_target(&self, target: &Hash) -> bool {
        self.compare_to(target, Ordering::Less)
    }

    /// Hex encoding of the stored bytes
    pub fn hex_string(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hash from its hex encoding.
    ///
    /// Shorter strings fill the leading bytes and leave the rest zero.
    pub fn parse_hex_string(s: &str) -> Result<Self, HashError> {
        if s.len() > HASH_LEN * 2 {
            return Err(HashError::TooLong(s.len()));
        }
        if s.len() % 2 != 0 {
            return Err(HashError::OddLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| HashError::InvalidHex(s.to_string()))?;

        let mut hash = [0u8; HASH_LEN];
        hash[..bytes.len()].copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        // Most significant byte sits at the end of the array
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex_string())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.hex_string())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::parse_hex_string(&s).map_err(serde::de::Error::custom)
    }
}

impl Marshal for Hash {
    fn marshal(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(&second);
    Hash(hash)
}

/// Double SHA-256 over the canonical encoding of `value`
pub fn hash_sum<M: Marshal + ?Sized>(value: &M) -> Hash {
    double_sha256(&value.marshal())
}

/// Convert an integer into hash form.
///
/// Integers wider than [`HASH_LEN`] bytes do not fit and map to the zero hash.
pub fn big_int_to_hash(x: &BigUint) -> Hash {
    let bytes = x.to_bytes_le();
    if bytes.len() > HASH_LEN {
        return Hash::zero();
    }
    let mut hash = [0u8; HASH_LEN];
    hash[..bytes.len()].copy_from_slice(&bytes);
    Hash(hash)
}

/// Read a hash as an unsigned integer
pub fn hash_to_big_int(hash: &Hash) -> BigUint {
    BigUint::from_bytes_le(&hash.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            hex::encode(hash),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_double_sha256_is_deterministic() {
        let data = b"hello world";
        assert_eq!(double_sha256(data), double_sha256(data));
        assert_ne!(double_sha256(data), double_sha256(b"hello worle"));
    }

    #[test]
    fn test_ordering_uses_most_significant_byte() {
        let mut low = [0u8; HASH_LEN];
        low[0] = 0xFF;
        let mut high = [0u8; HASH_LEN];
        high[HASH_LEN - 1] = 0x01;

        let low = Hash::new(low);
        let high = Hash::new(high);

        assert!(low.compare_to(&high, Ordering::Less));
        assert!(high.compare_to(&low, Ordering::Greater));
        assert!(low.compare_to(&low, Ordering::Equal));
        assert!(low.meets_target(&high));
        assert!(!high.meets_target(&high));
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = double_sha256(b"round trip");
        let parsed = Hash::parse_hex_string(&hash.hex_string()).unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_short_hex_fills_leading_bytes() {
        let hash = Hash::parse_hex_string("0a0b").unwrap();
        assert_eq!(hash.as_bytes()[0], 0x0a);
        assert_eq!(hash.as_bytes()[1], 0x0b);
        assert!(hash.as_bytes()[2..].iter().all(|b| *b == 0));

        assert_eq!(Hash::parse_hex_string("").unwrap(), Hash::zero());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(Hash::parse_hex_string("abc"), Err(HashError::OddLength(3)));
        assert!(matches!(
            Hash::parse_hex_string("zz"),
            Err(HashError::InvalidHex(_))
        ));
        let too_long = "00".repeat(HASH_LEN + 1);
        assert_eq!(
            Hash::parse_hex_string(&too_long),
            Err(HashError::TooLong(too_long.len()))
        );
    }

    #[test]
    fn test_big_int_conversion() {
        let value = BigUint::from(0x0102_0304u32);
        let hash = big_int_to_hash(&value);
        assert_eq!(hash.as_bytes()[0], 0x04);
        assert_eq!(hash.as_bytes()[3], 0x01);
        assert_eq!(hash_to_big_int(&hash), value);
    }

    #[test]
    fn test_oversized_big_int_truncates_to_zero() {
        let too_big = BigUint::from(1u8) << (HASH_LEN * 8);
        assert_eq!(big_int_to_hash(&too_big), Hash::zero());
    }
}
