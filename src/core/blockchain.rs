//! Blockchain implementation
//!
//! [`BlockChain`] is the append-only block sequence and its read queries.
//! [`SharedChain`] wraps it in a reader/writer lock so validation, mining
//! and block acceptance can run on different threads.

use crate::core::block::Block;
use crate::core::transaction::{Transaction, TxHashPointer};
use crate::core::validation::{valid_block, BlockCode};
use crate::crypto::Hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The ordered block sequence plus the cached hash of its tail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChain {
    pub blocks: Vec<Block>,
    /// Hash of the last block, zero while the chain is empty
    pub head: Hash,
}

impl BlockChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chain holding only `genesis`
    pub fn with_genesis(genesis: Block) -> Self {
        let mut chain = Self::new();
        chain.append_block(genesis);
        chain
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn head(&self) -> Hash {
        self.head
    }

    /// Push `block` and move the head to it. Callers validate first.
    pub fn append_block(&mut self, block: Block) {
        self.head = block.hash();
        self.blocks.push(block);
    }

    /// Remove and return the last block
    pub fn roll_back(&mut self) -> Option<Block> {
        let removed = self.blocks.pop()?;
        self.head = self.blocks.last().map(Block::hash).unwrap_or_default();
        Some(removed)
    }

    /// Get the latest block
    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Get a block by number
    pub fn get_block(&self, block_number: u32) -> Option<&Block> {
        self.blocks.get(block_number as usize)
    }

    /// Resolve an input pointer to the transaction it references
    pub fn get_input_transaction(&self, pointer: &TxHashPointer) -> Option<&Transaction> {
        self.get_block(pointer.block_number)?
            .transactions
            .get(pointer.index as usize)
    }

    /// Find a recorded transaction spending the same input as `tx` within
    /// blocks `start..stop`, returning its (block number, index).
    pub fn contains_transaction(
        &self,
        tx: &Transaction,
        start: u32,
        stop: u32,
    ) -> Option<(u32, u32)> {
        let stop = (stop as usize).min(self.blocks.len());
        let start = start as usize;
        if start >= stop {
            return None;
        }

        self.blocks[start..stop]
            .iter()
            .enumerate()
            .find_map(|(offset, block)| {
                block
                    .contains_transaction(tx)
                    .map(|index| ((start + offset) as u32, index))
            })
    }

    /// Find the block whose previous-block hash is `hash`
    pub fn get_block_by_last_block_hash(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.iter().find(|b| b.header.last_block == *hash)
    }

    /// Re-validate every block against its predecessors and check the
    /// proof of work of every mined block.
    ///
    /// Returns the number and failure code of the first invalid block.
    pub fn verify(&self) -> Result<(), (u32, BlockCode)> {
        for block in &self.blocks {
            let (valid, code) = valid_block(self, Some(block));
            if !valid {
                return Err((block.block_number(), code));
            }
            if !block.is_genesis() && !block.hash().meets_target(&block.header.target) {
                return Err((block.block_number(), BlockCode::BadProofOfWork));
            }
        }

        for (i, block) in self.blocks.iter().enumerate() {
            if block.block_number() as usize != i {
                return Err((block.block_number(), BlockCode::BadBlockNumber));
            }
        }

        let expected_head = self.blocks.last().map(Block::hash).unwrap_or_default();
        if self.head != expected_head {
            let number = self.blocks.len().saturating_sub(1) as u32;
            return Err((number, BlockCode::BadHash));
        }

        Ok(())
    }

    /// Get chain statistics
    pub fn stats(&self) -> ChainStats {
        ChainStats {
            height: self.blocks.len() as u64,
            total_transactions: self.blocks.iter().map(|b| b.tx_count() as u64).sum(),
            head: self.head,
        }
    }
}

/// Chain statistics
#[derive(Debug, Clone)]
pub struct ChainStats {
    pub height: u64,
    pub total_transactions: u64,
    pub head: Hash,
}

/// A [`BlockChain`] behind a reader/writer lock.
///
/// Validation and queries take the shared lock; appends and rollbacks take
/// the exclusive one. Hold a single [`SharedChain::write`] guard across any
/// check-then-append sequence.
#[derive(Debug, Default)]
pub struct SharedChain {
    inner: RwLock<BlockChain>,
}

impl SharedChain {
    pub fn new(chain: BlockChain) -> Self {
        Self {
            inner: RwLock::new(chain),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, BlockChain> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, BlockChain> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append_block(&self, block: Block) {
        self.write().append_block(block);
    }

    pub fn roll_back(&self) -> Option<Block> {
        self.write().roll_back()
    }

    pub fn last_block(&self) -> Option<Block> {
        self.read().last_block().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Serialize for SharedChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedChain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BlockChain::deserialize(deserializer).map(SharedChain::new)
    }
}
