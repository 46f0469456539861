//! ECDSA key management for the ledger
//!
//! Provides the [`Address`] identity (raw public key coordinates), the
//! fixed-width [`Signature`], key pair generation and the [`Wallet`]
//! signing capability consumed by the rest of the crate.

use rand::rngs::OsRng;
use secp256k1::ecdsa;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::hash::{sha256, Hash, Marshal};

/// Length of a single curve coordinate in bytes
pub const COORD_LEN: usize = 32;

/// Length of an address in bytes (X and Y coordinates)
pub const ADDR_LEN: usize = 2 * COORD_LEN;

/// Length of a signature in bytes (R and S scalars)
pub const SIG_LEN: usize = 64;

/// Version byte prepended before computing an address representation
pub const ADDRESS_VERSION: u8 = 0x00;

/// Tag byte of an uncompressed SEC1 public key
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// Public key identity of a sender or recipient
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDR_LEN]);

/// Address used as the sender of coinbase transactions
pub const NIL_ADDRESS: Address = Address([0u8; ADDR_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let serialized = public_key.serialize_uncompressed();
        let mut bytes = [0u8; ADDR_LEN];
        bytes.copy_from_slice(&serialized[1..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == NIL_ADDRESS
    }

    /// Recover the curve point, failing for coordinates not on the curve
    pub fn to_public_key(&self) -> Result<PublicKey, KeyError> {
        let mut sec1 = [0u8; ADDR_LEN + 1];
        sec1[0] = UNCOMPRESSED_TAG;
        sec1[1..].copy_from_slice(&self.0);
        PublicKey::from_slice(&sec1).map_err(|_| KeyError::InvalidPublicKey)
    }

    /// Shortened textual identity.
    ///
    /// SHA-256 over version byte and X‖Y, keeping the middle 20 bytes.
    pub fn repr(&self) -> String {
        let mut data = Vec::with_capacity(ADDR_LEN + 1);
        data.push(ADDRESS_VERSION);
        data.extend_from_slice(&self.0);
        let digest = sha256(&data);
        hex::encode(&digest[6..26])
    }

    pub fn hex_string(&self) -> String {
        hex::encode(self.0)
    }

    pub fn parse_hex_string(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidHex(s.to_string()))?;
        let array: [u8; ADDR_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidHex(s.to_string()))?;
        Ok(Self(array))
    }

    /// Check `signature` over `digest` against this identity
    pub fn verify(&self, digest: &Hash, signature: &Signature) -> bool {
        let Ok(public_key) = self.to_public_key() else {
            return false;
        };
        let Ok(sig) = ecdsa::Signature::from_compact(signature.as_bytes()) else {
            return false;
        };
        let message = Message::from_digest(*digest.as_bytes());
        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&message, &sig, &public_key).is_ok()
    }
}

impl Default for Address {
    fn default() -> Self {
        NIL_ADDRESS
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.repr())
    }
}

impl Marshal for Address {
    fn marshal(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse_hex_string(&s).map_err(serde::de::Error::custom)
    }
}

/// ECDSA signature as the (R, S) scalar pair
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIG_LEN]);

/// Signature carried by coinbase transactions, which are never signed
pub const NIL_SIGNATURE: Signature = Signature([0u8; SIG_LEN]);

impl Signature {
    pub const fn new(bytes: [u8; SIG_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIG_LEN] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == NIL_SIGNATURE
    }

    pub fn hex_string(&self) -> String {
        hex::encode(self.0)
    }

    pub fn parse_hex_string(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidHex(s.to_string()))?;
        let array: [u8; SIG_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self(array))
    }
}

impl Default for Signature {
    fn default() -> Self {
        NIL_SIGNATURE
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.hex_string())
    }
}

impl Marshal for Signature {
    fn marshal(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex_string())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::parse_hex_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Signing capability: an identity that can sign digests.
///
/// The ledger only needs the address and a signature over a digest; how
/// keys are stored or protected is up to the implementor.
pub trait Wallet: Send + Sync {
    fn public(&self) -> Address;
    fn sign(&self, digest: &Hash) -> Result<Signature, KeyError>;
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }
}

impl Wallet for KeyPair {
    fn public(&self) -> Address {
        self.address()
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, KeyError> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*digest.as_bytes());
        let sig = secp.sign_ecdsa(&message, &self.secret_key);
        Ok(Signature(sig.serialize_compact()))
    }
}
