//! Cryptographic primitives for the ledger
//!
//! This module provides:
//! - Double SHA-256 hashing and the fixed-width `Hash` type
//! - Elliptic-curve identities (`Address`) and signatures (secp256k1)
//! - The `Wallet` signing capability

pub mod hash;
pub mod keys;

pub use hash::{
    big_int_to_hash, double_sha256, hash_sum, hash_to_big_int, sha256, Hash, HashError, Marshal,
    HASH_LEN,
};
pub use keys::{
    Address, KeyError, KeyPair, Signature, Wallet, ADDR_LEN, NIL_ADDRESS, NIL_SIGNATURE, SIG_LEN,
};
