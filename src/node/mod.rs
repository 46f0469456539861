//! Node context
//!
//! Ties the ledger, the pool, the consensus parameters, the miner and the
//! node's wallet together. The chain lock is always taken before the pool
//! lock.

pub mod message;
pub mod worker;

pub use message::{NodeStatus, Request, Response, Responder, WorkItem};
pub use worker::{run_worker, spawn_miner, MinerHandle};

use crate::consensus::{Consensus, ConsensusConfig, MinedBlockCode};
use crate::core::block::{Block, BLOCK_SIZE};
use crate::core::blockchain::{BlockChain, SharedChain};
use crate::core::transaction::Transaction;
use crate::core::validation::{valid_genesis_block, GenesisBlockCode};
use crate::crypto::{Address, KeyError, Wallet};
use crate::mining::{MineResult, Miner, Pool};
use crate::storage::StorageError;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Node errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Invalid genesis block: {0}")]
    InvalidGenesis(GenesisBlockCode),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for ledger storage
    pub data_dir: PathBuf,
    /// Encoded size limit for assembled blocks
    pub max_block_size: usize,
    pub consensus: ConsensusConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ledger_data"),
            max_block_size: BLOCK_SIZE,
            consensus: ConsensusConfig::default(),
        }
    }
}

/// The ledger core of a running node
pub struct Node {
    config: NodeConfig,
    chain: Arc<SharedChain>,
    pool: Mutex<Pool>,
    consensus: Consensus,
    miner: Miner,
    wallet: Arc<dyn Wallet>,
}

impl Node {
    /// Create a node over `chain` and `pool`.
    ///
    /// An empty chain receives a genesis block paying the wallet.
    pub fn new(
        config: NodeConfig,
        mut chain: BlockChain,
        pool: Pool,
        wallet: Arc<dyn Wallet>,
    ) -> Result<Self, NodeError> {
        let consensus = Consensus::new(config.consensus.clone());

        if chain.is_empty() {
            let genesis = consensus.genesis_block(wallet.public());
            chain.append_block(genesis);
            let (valid, code) = valid_genesis_block(&chain, chain.blocks.first());
            if !valid {
                return Err(NodeError::InvalidGenesis(code));
            }
            info!("Created genesis block {}", chain.head());
        }
        consensus.sync_reward(&chain);

        Ok(Self {
            config,
            chain: Arc::new(SharedChain::new(chain)),
            pool: Mutex::new(pool),
            consensus,
            miner: Miner::new(),
            wallet,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<SharedChain> {
        &self.chain
    }

    pub fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    /// Address rewarded for blocks this node mines
    pub fn address(&self) -> Address {
        self.wallet.public()
    }

    pub fn pool(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate `tx` and add it to the pool
    pub fn submit_transaction(&self, tx: Transaction) -> bool {
        let chain = self.chain.read();
        let accepted = self.pool().push(tx, &chain);
        if accepted {
            debug!("Pooled transaction; {} pending", self.pool().len());
        }
        accepted
    }

    /// Validate a block claimed to be mined by `miner` and append it.
    ///
    /// Runs under the chain write lock: mined-block checks, pool
    /// reconciliation, append and the halving hook. An accepted block
    /// supersedes whatever the local miner is working on.
    pub fn submit_block(&self, block: Block, miner: &Address) -> (bool, MinedBlockCode) {
        let mut chain = self.chain.write();

        if block.block_number() as usize != chain.len() || block.header.last_block != chain.head() {
            warn!(
                "Rejected block {}: does not extend the tip at height {}",
                block.block_number(),
                chain.len()
            );
            return (false, MinedBlockCode::BadBlock);
        }

        let (valid, code) = self
            .consensus
            .valid_mined_block(&chain, miner, Some(&block));
        if !valid {
            warn!("Rejected block {}: {}", block.block_number(), code);
            return (false, code);
        }

        self.pool().update(&block, &chain);
        let number = block.block_number();
        let hash = block.hash();
        chain.append_block(block);
        self.consensus.halve_reward(chain.len() as u64);
        drop(chain);

        self.miner.stop_mining();
        info!("Accepted block {} ({})", number, hash);
        (true, code)
    }

    /// Assemble a candidate block rewarding this node
    pub fn next_block(&self) -> Block {
        let chain = self.chain.read();
        self.pool().next_block(
            &chain,
            &self.consensus,
            self.address(),
            self.config.max_block_size,
        )
    }

    /// Mine one candidate block and submit it.
    ///
    /// Returns the mining result and the block if it was appended.
    /// Transactions from a block that was not appended go back to the pool
    /// when still valid.
    pub fn mine_once(&self) -> (MineResult, Option<Block>) {
        let stop_epoch = self.miner.stop_epoch();
        let mut block = self.next_block();
        let result = self.miner.mine_since(&mut block, stop_epoch);

        if result.complete {
            let (accepted, _) = self.submit_block(block.clone(), &self.address());
            if accepted {
                return (result, Some(block));
            }
        }

        self.restore_transactions(&block);
        (result, None)
    }

    fn restore_transactions(&self, block: &Block) {
        let chain = self.chain.read();
        let mut pool = self.pool();
        let restored = block
            .transactions
            .iter()
            .skip(1)
            .filter(|tx| pool.push((*tx).clone(), &chain))
            .count();
        if restored > 0 {
            debug!("Returned {} transactions to the pool", restored);
        }
    }

    pub fn status(&self) -> NodeStatus {
        let chain = self.chain.read();
        NodeStatus {
            height: chain.len(),
            head: chain.head(),
            target: self.consensus.current_target(),
            reward: self.consensus.current_block_reward(&chain),
            pool_size: self.pool().len(),
        }
    }

    /// Answer one work-queue request
    pub fn handle(&self, request: Request) -> Response {
        debug!("Handling {} request", request.type_name());
        match request {
            Request::Transaction(tx) => Response::Transaction {
                accepted: self.submit_transaction(tx),
            },
            Request::Block { block, miner } => {
                let (accepted, code) = self.submit_block(block, &miner);
                Response::Block { accepted, code }
            }
            Request::NextBlock => Response::NextBlock(self.next_block()),
            Request::Status => Response::Status(self.status()),
        }
    }
}
