//! Proof-of-work search
//!
//! A [`Miner`] runs one nonce search at a time. Control calls (pause, resume,
//! stop) may come from any thread holding a clone of the miner; the search
//! loop polls the shared state before every hash, so a stop is observed
//! within one hash computation.

use crate::core::block::Block;
use crate::core::validation::valid_block_structure;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

/// Hashes between progress log lines
const PROGRESS_INTERVAL: u64 = 1 << 20;

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;
const PAUSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Stopped,
    Running,
    Paused,
}

impl MinerState {
    fn from_u8(value: u8) -> Self {
        match value {
            RUNNING => MinerState::Running,
            PAUSED => MinerState::Paused,
            _ => MinerState::Stopped,
        }
    }
}

/// Why a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningInfo {
    MiningSuccessful,
    MiningHalted,
    MiningNeverStarted,
}

/// Mining result with statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MineResult {
    pub complete: bool,
    pub info: MiningInfo,
    /// Number of hash attempts
    pub hashes: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
}

impl MineResult {
    fn new(info: MiningInfo, hashes: u64, started: Instant) -> Self {
        Self {
            complete: info == MiningInfo::MiningSuccessful,
            info,
            hashes,
            time_ms: started.elapsed().as_millis(),
        }
    }
}

#[derive(Debug, Default)]
struct Control {
    state: AtomicU8,
    /// Bumped by every new search; a search whose generation is stale halts
    generation: AtomicU64,
    /// Bumped by every stop, so a stop issued before a search starts is seen
    stops: AtomicU64,
    pause_lock: Mutex<()>,
    wake: Condvar,
}

/// Cancellable proof-of-work search.
///
/// Clones share the same control block.
#[derive(Debug, Clone, Default)]
pub struct Miner {
    control: Arc<Control>,
}

impl Miner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MinerState {
        MinerState::from_u8(self.control.state.load(Ordering::SeqCst))
    }

    /// Number of stops issued so far, for [`Miner::mine_since`]
    pub fn stop_epoch(&self) -> u64 {
        self.control.stops.load(Ordering::SeqCst)
    }

    /// Search for a nonce that puts `block`'s hash below its target.
    ///
    /// Any search already in flight is superseded and returns
    /// [`MiningInfo::MiningHalted`]. The nonce wraps around on overflow, so
    /// an unsuccessful search only ends through [`Miner::stop_mining`].
    pub fn mine(&self, block: &mut Block) -> MineResult {
        self.mine_since(block, self.stop_epoch())
    }

    /// Like [`Miner::mine`], but halts immediately if a stop was issued
    /// after `stop_epoch` was read. Read the epoch before assembling the
    /// block so a stop racing with assembly is not lost.
    pub fn mine_since(&self, block: &mut Block, stop_epoch: u64) -> MineResult {
        let started = Instant::now();

        let (valid, code) = valid_block_structure(block);
        if !valid {
            warn!("Not mining block {}: {}", block.block_number(), code);
            return MineResult::new(MiningInfo::MiningNeverStarted, 0, started);
        }

        let generation = {
            let _guard = self.lock();
            if self.control.stops.load(Ordering::SeqCst) != stop_epoch {
                info!("Block {} went stale before mining", block.block_number());
                return MineResult::new(MiningInfo::MiningHalted, 0, started);
            }
            let generation = self.control.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.control.state.store(RUNNING, Ordering::SeqCst);
            self.control.wake.notify_all();
            generation
        };

        info!(
            "Mining block {} with target {}...",
            block.block_number(),
            block.header.target
        );

        let encoded_txs = block.marshal_transactions();
        let target = block.header.target;
        let mut nonce = block.header.nonce;
        let mut hashes = 0u64;

        loop {
            if self.control.generation.load(Ordering::SeqCst) != generation {
                debug!("Search for block {} superseded", block.block_number());
                return MineResult::new(MiningInfo::MiningHalted, hashes, started);
            }
            match self.control.state.load(Ordering::SeqCst) {
                STOPPED => {
                    info!("Mining block {} halted", block.block_number());
                    return MineResult::new(MiningInfo::MiningHalted, hashes, started);
                }
                PAUSED => {
                    self.wait_while_paused(generation);
                    continue;
                }
                _ => {}
            }

            let hash = block.hash_with_nonce(nonce, &encoded_txs);
            hashes += 1;
            if hash.meets_target(&target) {
                self.finish(generation);
                let result = MineResult::new(MiningInfo::MiningSuccessful, hashes, started);
                info!(
                    "Block {} mined in {}ms ({} attempts, nonce {})",
                    block.block_number(),
                    result.time_ms,
                    hashes,
                    nonce
                );
                return result;
            }

            if hashes % PROGRESS_INTERVAL == 0 {
                debug!("Block {}: {} hashes tried", block.block_number(), hashes);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Pause a running search. Returns false if none was running.
    pub fn pause_if_running(&self) -> bool {
        self.control
            .state
            .compare_exchange(RUNNING, PAUSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Resume a paused search. Returns false if none was paused.
    pub fn resume_mining(&self) -> bool {
        let _guard = self.lock();
        let resumed = self
            .control
            .state
            .compare_exchange(PAUSED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.control.wake.notify_all();
        resumed
    }

    /// Stop the current search, if any
    pub fn stop_mining(&self) {
        let _guard = self.lock();
        self.control.stops.fetch_add(1, Ordering::SeqCst);
        self.control.state.store(STOPPED, Ordering::SeqCst);
        self.control.wake.notify_all();
    }

    /// Mark the search of `generation` done unless a newer one has started
    fn finish(&self, generation: u64) {
        let _guard = self.lock();
        if self.control.generation.load(Ordering::SeqCst) == generation {
            self.control.state.store(STOPPED, Ordering::SeqCst);
        }
    }

    fn wait_while_paused(&self, generation: u64) {
        let guard = self.lock();
        let _guard = self
            .control
            .wake
            .wait_while(guard, |_| {
                self.control.state.load(Ordering::SeqCst) == PAUSED
                    && self.control.generation.load(Ordering::SeqCst) == generation
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.control
            .pause_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
