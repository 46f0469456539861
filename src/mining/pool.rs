//! Transaction pool for pending transactions
//!
//! Holds transactions that passed validation but are not yet in a block.
//! At most one transaction is pooled per input pointer: a newer transaction
//! with the same input replaces the older one. Block assembly takes
//! transactions in arrival order.

use crate::consensus::Consensus;
use crate::core::block::{unix_time_now, Block, BlockHeader, BLOCK_HEADER_SIZE};
use crate::core::blockchain::BlockChain;
use crate::core::transaction::{Transaction, TxHashPointer};
use crate::core::validation::{valid_block, valid_transaction};
use crate::crypto::{Address, Hash};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

// =============================================================================
// Pool Entry
// =============================================================================

/// Entry in the pool with its insertion time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PooledTransaction {
    pub transaction: Transaction,
    /// Insertion time in microseconds, strictly increasing across the pool
    pub added_at: i64,
}

// =============================================================================
// Pool
// =============================================================================

/// Pending transactions keyed by input pointer, with arrival order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<PooledTransaction>", into = "Vec<PooledTransaction>")]
pub struct Pool {
    /// Entries indexed by the hash of their input pointer
    entries: HashMap<Hash, PooledTransaction>,
    /// (added_at, key) sorted by insertion time
    order: VecDeque<(i64, Hash)>,
    last_added_at: i64,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of pending transactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if exactly this transaction is pooled
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.entries
            .get(&tx.input().key())
            .is_some_and(|entry| entry.transaction == *tx)
    }

    /// Pooled transaction spending `input`
    pub fn get(&self, input: &TxHashPointer) -> Option<&Transaction> {
        self.entries.get(&input.key()).map(|e| &e.transaction)
    }

    /// Validate `tx` against `chain` and pool it on success
    pub fn push(&mut self, tx: Transaction, chain: &BlockChain) -> bool {
        let (valid, code) = valid_transaction(chain, Some(&tx));
        if !valid {
            debug!("Rejected transaction {}: {}", tx.hash(), code);
            return false;
        }
        self.push_unsafe(tx);
        true
    }

    /// Pool `tx` without validation, replacing any entry for the same input
    pub fn push_unsafe(&mut self, tx: Transaction) {
        let key = tx.input().key();
        if let Some(replaced) = self.remove_key(&key) {
            debug!(
                "Transaction {} replaced by {}",
                replaced.hash(),
                tx.hash()
            );
        }

        let added_at = self.next_timestamp();
        self.order.push_back((added_at, key));
        self.entries.insert(
            key,
            PooledTransaction {
                transaction: tx,
                added_at,
            },
        );
    }

    /// Remove the entry for `tx`'s input pointer
    pub fn delete(&mut self, tx: &Transaction) -> Option<Transaction> {
        self.remove_key(&tx.input().key())
    }

    /// Drop every transaction consumed by `block` if the block is valid.
    ///
    /// An invalid block leaves the pool untouched.
    pub fn update(&mut self, block: &Block, chain: &BlockChain) -> bool {
        let (valid, code) = valid_block(chain, Some(block));
        if !valid {
            debug!("Pool not updated for block {}: {}", block.block_number(), code);
            return false;
        }

        let removed = block
            .transactions
            .iter()
            .skip(1)
            .filter(|tx| self.delete(tx).is_some())
            .count();
        debug!(
            "Block {} consumed {} pooled transactions",
            block.block_number(),
            removed
        );
        true
    }

    /// Remove and return the oldest transaction
    pub fn pop(&mut self) -> Option<Transaction> {
        let (_, key) = self.order.pop_front()?;
        self.entries.remove(&key).map(|e| e.transaction)
    }

    /// Oldest transaction
    pub fn peek(&self) -> Option<&Transaction> {
        let (_, key) = self.order.front()?;
        self.entries.get(key).map(|e| &e.transaction)
    }

    /// Pending transactions in arrival order
    pub fn transactions(&self) -> Vec<&Transaction> {
        self.order
            .iter()
            .filter_map(|(_, key)| self.entries.get(key).map(|e| &e.transaction))
            .collect()
    }

    /// Clear all transactions
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Assemble an unmined block on top of `chain`.
    ///
    /// The coinbase pays the scheduled reward to `miner`. Pooled transactions
    /// follow in arrival order until the next one would push the encoded
    /// block past `max_size`; that one and everything after it stay pooled.
    pub fn next_block(
        &mut self,
        chain: &BlockChain,
        consensus: &Consensus,
        miner: Address,
        max_size: usize,
    ) -> Block {
        let header = BlockHeader {
            block_number: chain.len() as u32,
            last_block: chain.head(),
            target: consensus.current_target(),
            time: unix_time_now(),
            nonce: 0,
            extra_data: Vec::new(),
        };

        let coinbase = Transaction::coinbase(miner, consensus.current_block_reward(chain));
        let mut size = BLOCK_HEADER_SIZE + coinbase.size();
        let mut transactions = vec![coinbase];

        while let Some(tx) = self.peek() {
            let tx_size = tx.size();
            if size + tx_size > max_size {
                break;
            }
            size += tx_size;
            if let Some(tx) = self.pop() {
                transactions.push(tx);
            }
        }

        info!(
            "Assembled block {} with {} transactions ({} bytes, {} left in pool)",
            header.block_number,
            transactions.len(),
            size,
            self.len()
        );
        Block::new(header, transactions)
    }

    fn remove_key(&mut self, key: &Hash) -> Option<Transaction> {
        let entry = self.entries.remove(key)?;
        if let Ok(index) = self
            .order
            .binary_search_by_key(&entry.added_at, |(added_at, _)| *added_at)
        {
            self.order.remove(index);
        }
        Some(entry.transaction)
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_micros();
        self.last_added_at = now.max(self.last_added_at.saturating_add(1));
        self.last_added_at
    }
}

impl From<Vec<PooledTransaction>> for Pool {
    fn from(mut pooled: Vec<PooledTransaction>) -> Self {
        pooled.sort_by_key(|p| p.added_at);
        let mut pool = Pool::new();
        for entry in pooled {
            let key = entry.transaction.input().key();
            pool.remove_key(&key);
            let added_at = entry.added_at.max(pool.last_added_at.saturating_add(1));
            pool.last_added_at = added_at;
            pool.order.push_back((added_at, key));
            pool.entries.insert(
                key,
                PooledTransaction {
                    transaction: entry.transaction,
                    added_at,
                },
            );
        }
        pool
    }
}

impl From<Pool> for Vec<PooledTransaction> {
    fn from(mut pool: Pool) -> Self {
        pool.order
            .drain(..)
            .filter_map(|(_, key)| pool.entries.remove(&key))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
