//! Work queue messages
//!
//! The networking layer turns peer traffic into [`Request`]s and hands them
//! to the node's worker together with a [`Responder`] that carries the
//! answer back. How the answer reaches the peer is up to the responder.

use crate::consensus::MinedBlockCode;
use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::crypto::{Address, Hash};
use tokio::sync::oneshot;

/// Work submitted to the node
#[derive(Debug, Clone)]
pub enum Request {
    /// Validate and pool a transaction
    Transaction(Transaction),
    /// Validate and append a block mined by `miner`
    Block { block: Block, miner: Address },
    /// Assemble a candidate block from the pool
    NextBlock,
    /// Report height, target and reward
    Status,
}

impl Request {
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Transaction(_) => "Transaction",
            Request::Block { .. } => "Block",
            Request::NextBlock => "NextBlock",
            Request::Status => "Status",
        }
    }
}

/// Snapshot of the node for peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub height: usize,
    pub head: Hash,
    pub target: Hash,
    pub reward: u64,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub enum Response {
    Transaction { accepted: bool },
    Block { accepted: bool, code: MinedBlockCode },
    NextBlock(Block),
    Status(NodeStatus),
}

/// Delivers the result of a [`Request`]
pub trait Responder: Send {
    fn respond(self: Box<Self>, response: Response);
}

impl Responder for oneshot::Sender<Response> {
    fn respond(self: Box<Self>, response: Response) {
        if (*self).send(response).is_err() {
            log::debug!("Requester went away before the response was ready");
        }
    }
}

/// A request paired with where its answer goes
pub struct WorkItem {
    pub request: Request,
    pub responder: Box<dyn Responder>,
}

impl WorkItem {
    pub fn new(request: Request, responder: Box<dyn Responder>) -> Self {
        Self { request, responder }
    }

    /// Work item answered through a oneshot channel
    pub fn with_reply(request: Request) -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(request, Box::new(tx)), rx)
    }
}
