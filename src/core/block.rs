//! Block implementation for the ledger
//!
//! A block contains a header with metadata and an ordered list of
//! transactions, the first of which is the coinbase.

use crate::core::transaction::Transaction;
use crate::crypto::{double_sha256, hash_sum, Address, Hash, Marshal};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// Block Constants
// =============================================================================

/// Default maximum encoded block size in bytes (256 KiB)
pub const BLOCK_SIZE: usize = 1 << 18;

/// Encoded header size without extra data
pub const BLOCK_HEADER_SIZE: usize = 4 + 32 + 32 + 4 + 4;

/// Current unix time as carried in block headers
pub fn unix_time_now() -> u32 {
    Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Height of this block; zero only for the genesis block
    pub block_number: u32,
    /// Hash of the previous block (zero for genesis)
    pub last_block: Hash,
    /// Proof-of-work target the block hash must fall below
    pub target: Hash,
    /// Unix timestamp
    pub time: u32,
    /// Nonce used for proof of work
    pub nonce: u32,
    #[serde(default)]
    pub extra_data: Vec<u8>,
}

impl Marshal for BlockHeader {
    fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_HEADER_SIZE + self.extra_data.len());
        buf.extend_from_slice(&self.block_number.to_le_bytes());
        buf.extend_from_slice(self.last_block.as_bytes());
        buf.extend_from_slice(self.target.as_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.extra_data);
        buf
    }
}

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Create a genesis block paying `reward` to `recipient`.
    ///
    /// Genesis blocks are accepted without proof of work.
    pub fn genesis(recipient: Address, reward: u64, target: Hash) -> Self {
        let header = BlockHeader {
            block_number: 0,
            last_block: Hash::zero(),
            target,
            time: unix_time_now(),
            nonce: 0,
            extra_data: Vec::new(),
        };
        Self::new(header, vec![Transaction::coinbase(recipient, reward)])
    }

    /// Identity of this block (header and transactions)
    pub fn hash(&self) -> Hash {
        hash_sum(self)
    }

    /// Hash this block as if its nonce were `nonce`, given the encoded
    /// transactions from [`Block::marshal_transactions`].
    pub fn hash_with_nonce(&mut self, nonce: u32, encoded_txs: &[u8]) -> Hash {
        self.header.nonce = nonce;
        let mut buf = self.header.marshal();
        buf.extend_from_slice(encoded_txs);
        double_sha256(&buf)
    }

    pub fn marshal_transactions(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for tx in &self.transactions {
            buf.extend(tx.marshal());
        }
        buf
    }

    pub fn block_number(&self) -> u32 {
        self.header.block_number
    }

    pub fn is_genesis(&self) -> bool {
        self.header.block_number == 0
    }

    /// Get the coinbase transaction (first transaction)
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Position of a transaction spending the same input as `tx`
    pub fn contains_transaction(&self, tx: &Transaction) -> Option<u32> {
        self.transactions
            .iter()
            .position(|t| t.spends_same_input(tx))
            .map(|i| i as u32)
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        self.marshal().len()
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

impl Marshal for Block {
    fn marshal(&self) -> Vec<u8> {
        let mut buf = self.header.marshal();
        buf.extend(self.marshal_transactions());
        buf
    }
}
