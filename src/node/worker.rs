//! Background tasks driving a [`Node`]
//!
//! [`run_worker`] drains the work queue fed by the networking layer.
//! [`spawn_miner`] keeps a dedicated thread mining candidate blocks.

use super::{Node, NodeError, WorkItem};
use crate::mining::{Miner, MiningInfo};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

/// Pause before retrying after a candidate block could not be mined
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Answer work items until every sender is dropped.
///
/// Requests run on the blocking pool since validation and block assembly
/// take the ledger locks.
pub async fn run_worker(node: Arc<Node>, mut queue: mpsc::Receiver<WorkItem>) {
    info!("Work queue started");

    while let Some(WorkItem { request, responder }) = queue.recv().await {
        let node = node.clone();
        let kind = request.type_name();
        match tokio::task::spawn_blocking(move || node.handle(request)).await {
            Ok(response) => responder.respond(response),
            Err(e) => error!("{} request failed: {}", kind, e),
        }
    }

    info!("Work queue closed");
}

/// Handle to the mining thread
pub struct MinerHandle {
    shutdown: Arc<AtomicBool>,
    miner: Miner,
    thread: Option<JoinHandle<()>>,
}

/// Start a thread that mines and submits blocks until shut down
pub fn spawn_miner(node: Arc<Node>) -> Result<MinerHandle, NodeError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let miner = node.miner().clone();

    let flag = shutdown.clone();
    let thread = thread::Builder::new()
        .name("miner".to_string())
        .spawn(move || {
            info!("Miner started for {}", node.address());
            while !flag.load(Ordering::SeqCst) {
                let (result, block) = node.mine_once();
                if let Some(block) = block {
                    info!(
                        "Mined block {} with {} transactions",
                        block.block_number(),
                        block.tx_count()
                    );
                } else if result.info == MiningInfo::MiningNeverStarted {
                    warn!("Candidate block rejected before mining; retrying");
                    thread::sleep(RETRY_DELAY);
                }
            }
            info!("Miner stopped");
        })?;

    Ok(MinerHandle {
        shutdown,
        miner,
        thread: Some(thread),
    })
}

impl MinerHandle {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop mining and wait for the thread to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::SeqCst);

        // The thread may read the stop epoch after the first stop and
        // before seeing the shutdown flag, so keep stopping until it exits
        while !thread.is_finished() {
            self.miner.stop_mining();
            thread::sleep(Duration::from_millis(10));
        }
        if thread.join().is_err() {
            error!("Miner thread panicked");
        }
    }
}

impl Drop for MinerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
