//! Consensus parameters
//!
//! Difficulty, the proof-of-work target derived from it and the block reward
//! schedule. The node owns one [`Consensus`] value and passes it to whatever
//! needs these numbers; nothing here is process-global.

use crate::core::block::Block;
use crate::core::blockchain::BlockChain;
use crate::core::validation::valid_block;
use crate::crypto::{big_int_to_hash, hash_to_big_int, Address, Hash, HASH_LEN};
use log::{debug, info};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};

// =============================================================================
// Consensus Constants
// =============================================================================

/// Base units per coin
pub const COIN: u64 = 100_000_000;

/// Reward of the first block era
pub const STARTING_BLOCK_REWARD: u64 = 50 * COIN;

/// Blocks between reward halvings
pub const HALVING_INTERVAL: u32 = 210_000;

/// Starting difficulty
pub const DEFAULT_DIFFICULTY: u64 = 1 << 16;

const fn low_byte(value: u8) -> [u8; HASH_LEN] {
    let mut bytes = [0u8; HASH_LEN];
    bytes[0] = value;
    bytes
}

/// Smallest (hardest) permitted target
pub const MIN_TARGET: Hash = Hash::new(low_byte(1));

/// Largest (easiest) permitted target
pub const MAX_TARGET: Hash = Hash::new([0xFF; HASH_LEN]);

/// Reward for the block at `height` under a halving schedule
pub fn reward_at_height(starting_reward: u64, halving_interval: u32, height: u64) -> u64 {
    if halving_interval == 0 {
        return starting_reward;
    }
    let halvings = height / halving_interval as u64;
    if halvings >= u64::BITS as u64 {
        return 0;
    }
    starting_reward >> halvings
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub starting_difficulty: u64,
    pub starting_reward: u64,
    pub halving_interval: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            starting_difficulty: DEFAULT_DIFFICULTY,
            starting_reward: STARTING_BLOCK_REWARD,
            halving_interval: HALVING_INTERVAL,
        }
    }
}

// =============================================================================
// Mined block codes
// =============================================================================

/// Outcome of [`Consensus::valid_mined_block`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinedBlockCode {
    ValidMinedBlock,
    BadBlock,
    BadReward,
    BadMiner,
    BadDifficulty,
    BadNonce,
}

impl fmt::Display for MinedBlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Consensus state
// =============================================================================

#[derive(Debug)]
struct ConsensusState {
    difficulty: BigUint,
    block_reward: u64,
    /// Chain height at which the reward was last halved
    last_halving: u64,
}

/// Shared difficulty and reward state.
///
/// Readers see either the old or the new values of a halving, never a mix.
#[derive(Debug)]
pub struct Consensus {
    config: ConsensusConfig,
    state: RwLock<ConsensusState>,
}

impl Consensus {
    pub fn new(config: ConsensusConfig) -> Self {
        let state = ConsensusState {
            difficulty: BigUint::from(config.starting_difficulty.max(1)),
            block_reward: config.starting_reward,
            last_halving: 0,
        };
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn current_difficulty(&self) -> BigUint {
        self.read_state().difficulty.clone()
    }

    /// Replace the difficulty; zero is treated as one
    pub fn set_difficulty(&self, difficulty: BigUint) {
        let difficulty = difficulty.max(BigUint::from(1u32));
        debug!("Difficulty set to {}", difficulty);
        self.write_state().difficulty = difficulty;
    }

    /// `MAX_TARGET / difficulty`, never below [`MIN_TARGET`]
    pub fn current_target(&self) -> Hash {
        let target = hash_to_big_int(&MAX_TARGET) / &self.read_state().difficulty;
        big_int_to_hash(&target).max(MIN_TARGET)
    }

    /// Reward tracked through [`Consensus::halve_reward`]
    pub fn block_reward(&self) -> u64 {
        self.read_state().block_reward
    }

    /// Reward for the next block on `chain`
    pub fn current_block_reward(&self, chain: &BlockChain) -> u64 {
        self.reward_at(chain.len() as u64)
    }

    pub fn reward_at(&self, height: u64) -> u64 {
        reward_at_height(
            self.config.starting_reward,
            self.config.halving_interval,
            height,
        )
    }

    /// Halve the tracked reward if `height` starts a new reward era.
    ///
    /// Called after every append with the new chain length. Repeated calls at
    /// the same height halve only once. Returns whether a halving happened.
    pub fn halve_reward(&self, height: u64) -> bool {
        let interval = self.config.halving_interval as u64;
        if interval == 0 || height == 0 || height % interval != 0 {
            return false;
        }

        let mut state = self.write_state();
        if height <= state.last_halving {
            return false;
        }
        state.block_reward /= 2;
        state.last_halving = height;
        info!(
            "Block reward halved to {} at height {}",
            state.block_reward, height
        );
        true
    }

    /// Realign the tracked reward with the length of a loaded chain
    pub fn sync_reward(&self, chain: &BlockChain) {
        let height = chain.len() as u64;
        let interval = self.config.halving_interval.max(1) as u64;
        let mut state = self.write_state();
        state.block_reward = self.reward_at(height);
        state.last_halving = height / interval * interval;
    }

    /// Genesis block paying the starting reward to `recipient`
    pub fn genesis_block(&self, recipient: Address) -> Block {
        Block::genesis(recipient, self.reward_at(0), self.current_target())
    }

    /// Validate a block claimed to be mined by `miner`.
    ///
    /// On top of [`valid_block`], the coinbase must pay the scheduled reward
    /// to `miner`, the target must match the current target and the block
    /// hash must fall below it.
    pub fn valid_mined_block(
        &self,
        chain: &BlockChain,
        miner: &Address,
        b: Option<&Block>,
    ) -> (bool, MinedBlockCode) {
        let (valid, code) = valid_block(chain, b);
        let Some(b) = b.filter(|_| valid) else {
            debug!("Mined block rejected: {}", code);
            return (false, MinedBlockCode::BadBlock);
        };

        // valid_block guarantees a coinbase with exactly one output
        let reward = &b.transactions[0].outputs()[0];
        if reward.amount != self.reward_at(b.block_number() as u64) {
            return (false, MinedBlockCode::BadReward);
        }
        if reward.recipient != *miner {
            return (false, MinedBlockCode::BadMiner);
        }
        if b.header.target != self.current_target() {
            return (false, MinedBlockCode::BadDifficulty);
        }
        if !b.hash().meets_target(&b.header.target) {
            return (false, MinedBlockCode::BadNonce);
        }

        (true, MinedBlockCode::ValidMinedBlock)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ConsensusState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ConsensusState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Consensus {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}
