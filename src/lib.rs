//! Cloud Ledger: the consensus core of a proof-of-work cryptocurrency node
//!
//! This crate provides:
//! - Double SHA-256 hashing and secp256k1 identities
//! - Single-input transactions and coinbase-first blocks
//! - A lock-protected, append-only block chain
//! - Validation returning a closed result code for every rule
//! - Difficulty targets and a halving block reward
//! - A FIFO transaction pool that assembles size-bounded candidate blocks
//! - A cancellable, pausable proof-of-work miner
//! - JSON persistence with rotating backups
//!
//! # Example
//!
//! ```rust,no_run
//! use cloud_ledger::crypto::KeyPair;
//! use cloud_ledger::node::{Node, NodeConfig};
//! use std::sync::Arc;
//!
//! let wallet = KeyPair::generate();
//! let node = Node::new(
//!     NodeConfig::default(),
//!     Default::default(),
//!     Default::default(),
//!     Arc::new(wallet),
//! )
//! .unwrap();
//!
//! let (result, block) = node.mine_once();
//! if let Some(block) = block {
//!     println!("Mined block {} after {} hashes", block.block_number(), result.hashes);
//! }
//! ```

pub mod cli;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod node;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use consensus::{Consensus, ConsensusConfig, MinedBlockCode};
pub use core::{Block, BlockChain, SharedChain, Transaction};
pub use crypto::{Address, Hash, KeyPair, Wallet};
pub use mining::{Miner, Pool};
pub use node::{Node, NodeConfig};
pub use storage::Storage;
