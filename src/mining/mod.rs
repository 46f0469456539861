//! Mining module for block assembly and proof of work

pub mod miner;
pub mod pool;

pub use miner::{MineResult, Miner, MinerState, MiningInfo};
pub use pool::{Pool, PooledTransaction};
