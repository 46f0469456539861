//! Shared fixtures for unit tests

use crate::consensus::{ConsensusConfig, MAX_TARGET};
use crate::core::block::{unix_time_now, Block, BlockHeader};
use crate::core::blockchain::BlockChain;
use crate::core::transaction::{Transaction, TxBody, TxHashPointer, TxOutput};
use crate::crypto::{KeyPair, Wallet};
use crate::node::NodeConfig;

/// Reward paid by the fixture genesis block
pub const STARTING_REWARD: u64 = 50;

/// A one-block chain whose genesis coinbase pays `alice`
pub struct Fixture {
    pub alice: KeyPair,
    pub bob: KeyPair,
    pub chain: BlockChain,
    pub funding: Transaction,
}

impl Fixture {
    pub fn new() -> Self {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let genesis = Block::genesis(alice.address(), STARTING_REWARD, MAX_TARGET);
        let funding = genesis.transactions[0].clone();
        Self {
            alice,
            bob,
            chain: BlockChain::with_genesis(genesis),
            funding,
        }
    }

    /// Pointer to the genesis coinbase
    pub fn funding_pointer(&self) -> TxHashPointer {
        TxHashPointer::new(0, self.funding.hash(), 0)
    }

    /// Alice spends the genesis coinbase, sending `amount` to Bob and the
    /// rest back to herself
    pub fn alice_pays_bob(&self, amount: u64) -> Transaction {
        signed(
            &self.alice,
            self.funding_pointer(),
            vec![
                TxOutput::new(amount, self.bob.address()),
                TxOutput::new(STARTING_REWARD - amount, self.alice.address()),
            ],
        )
    }

    /// Unmined block extending the chain, rewarding Alice
    pub fn candidate(&self, transactions: Vec<Transaction>) -> Block {
        next_block(&self.chain, &self.alice, transactions)
    }
}

pub fn signed(from: &KeyPair, input: TxHashPointer, outputs: Vec<TxOutput>) -> Transaction {
    Transaction::new_signed(TxBody::new(from.public(), input, outputs), from).unwrap()
}

pub fn next_block(chain: &BlockChain, miner: &KeyPair, transactions: Vec<Transaction>) -> Block {
    let header = BlockHeader {
        block_number: chain.len() as u32,
        last_block: chain.head(),
        target: MAX_TARGET,
        time: unix_time_now(),
        nonce: 0,
        extra_data: Vec::new(),
    };
    let mut all = vec![Transaction::coinbase(miner.address(), STARTING_REWARD)];
    all.extend(transactions);
    Block::new(header, all)
}

/// Node settings where every hash meets the target
pub fn easy_node_config(halving_interval: u32) -> NodeConfig {
    NodeConfig {
        consensus: ConsensusConfig {
            starting_difficulty: 1,
            starting_reward: STARTING_REWARD,
            halving_interval,
        },
        ..Default::default()
    }
}
