//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (single input pointer, signed body)
//! - Blocks (header plus coinbase-first transaction list)
//! - Blockchain (append-only block sequence behind a reader/writer lock)
//! - Validation (closed code sets for every rule)

pub mod block;
pub mod blockchain;
pub mod transaction;
pub mod validation;

pub use block::{unix_time_now, Block, BlockHeader, BLOCK_HEADER_SIZE, BLOCK_SIZE};
pub use blockchain::{BlockChain, ChainStats, SharedChain};
pub use transaction::{Transaction, TxBody, TxHashPointer, TxOutput};
pub use validation::{
    valid_block, valid_block_structure, valid_cloud_base, valid_genesis_block,
    valid_target, valid_transaction, BlockCode, CloudBaseTransactionCode, GenesisBlockCode,
    TransactionCode,
};
