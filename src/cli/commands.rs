//! CLI commands for the ledger
//!
//! Implements all command handlers for the CLI interface.

use crate::core::transaction::{Transaction, TxBody, TxHashPointer, TxOutput};
use crate::crypto::{Address, KeyPair, Wallet};
use crate::mining::MiningInfo;
use crate::node::{run_worker, spawn_miner, Node, NodeConfig, Request, Response, WorkItem};
use crate::storage::{Storage, StorageConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// File holding the node's signing key
const KEY_FILE: &str = "wallet.json";

/// Pending requests buffered for the worker
const QUEUE_CAPACITY: usize = 64;

const STATUS_INTERVAL_SECS: u64 = 30;

#[derive(Serialize, Deserialize)]
struct KeyFile {
    private_key: String,
}

fn key_path(data_dir: &Path) -> PathBuf {
    data_dir.join(KEY_FILE)
}

fn load_key(data_dir: &Path) -> CliResult<KeyPair> {
    let contents = fs::read_to_string(key_path(data_dir))?;
    let key_file: KeyFile = serde_json::from_str(&contents)?;
    Ok(KeyPair::from_private_key_hex(&key_file.private_key)?)
}

fn save_key(data_dir: &Path, key: &KeyPair) -> CliResult<()> {
    let key_file = KeyFile {
        private_key: key.private_key_hex(),
    };
    fs::write(key_path(data_dir), serde_json::to_string_pretty(&key_file)?)?;
    Ok(())
}

/// Application state
pub struct AppState {
    pub node: Arc<Node>,
    pub key: KeyPair,
    pub storage: Storage,
}

impl AppState {
    /// Load the key, chain and pool from `config.data_dir`
    pub fn new(config: NodeConfig) -> CliResult<Self> {
        let data_dir = config.data_dir.clone();
        let storage = Storage::new(StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        })?;

        if !storage.exists() {
            return Err(format!(
                "no ledger at {}; run `ledger init` first",
                data_dir.display()
            )
            .into());
        }

        let key = load_key(&data_dir)?;
        let chain = storage.load()?;
        let pool = storage.load_pool()?;
        let node = Arc::new(Node::new(config, chain, pool, Arc::new(key.clone()))?);

        Ok(Self { node, key, storage })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.node.chain().read())?;
        self.storage.save_pool(&self.node.pool())?;
        Ok(())
    }
}

/// Create a signing key and a genesis block paying it
pub fn cmd_init(config: NodeConfig, force: bool) -> CliResult<()> {
    let data_dir = config.data_dir.clone();
    let storage = Storage::new(StorageConfig {
        data_dir: data_dir.clone(),
        ..Default::default()
    })?;

    if storage.exists() && !force {
        println!("⚠️  Ledger already exists at {:?}", data_dir);
        println!("   Use --force to reinitialize (this will delete existing data)");
        return Ok(());
    }
    storage.delete()?;

    let key = KeyPair::generate();
    save_key(&data_dir, &key)?;

    let node = Node::new(config, Default::default(), Default::default(), Arc::new(key.clone()))?;
    storage.save(&node.chain().read())?;
    storage.save_pool(&node.pool())?;

    println!("✅ Ledger initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    println!("   📍 Address: {}", key.address().repr());
    println!("   🧱 Genesis block hash: {}", node.chain().read().head());

    Ok(())
}

/// Mine new blocks
pub fn cmd_mine(state: &mut AppState, count: u32) -> CliResult<()> {
    println!(
        "⛏️  Mining {} block(s) for address: {}",
        count,
        state.node.address().repr()
    );
    println!("   Current target: {}", state.node.consensus().current_target());

    for _ in 0..count {
        let (result, block) = state.node.mine_once();

        let Some(block) = block else {
            if result.info == MiningInfo::MiningNeverStarted {
                println!("❌ Candidate block is not minable (reward exhausted?)");
            } else {
                println!("❌ Mining ended without a block ({:?})", result.info);
            }
            break;
        };

        let hash_rate = if result.time_ms > 0 {
            result.hashes as f64 / (result.time_ms as f64 / 1000.0)
        } else {
            result.hashes as f64
        };

        println!("\n   Block {} mined!", block.block_number());
        println!("   ├─ Hash: {}", block.hash());
        println!("   ├─ Transactions: {}", block.tx_count());
        println!("   ├─ Time: {}ms", result.time_ms);
        println!("   ├─ Attempts: {}", result.hashes);
        println!("   └─ Hash rate: {:.2} H/s", hash_rate);

        // Save after each block
        state.save()?;
    }

    Ok(())
}

/// Run the node: mine continuously and answer queued requests until Ctrl+C
pub fn cmd_run(state: &AppState) -> CliResult<()> {
    println!("🚀 Starting node...");
    println!("   📍 Mining for: {}", state.node.address().repr());
    println!("   ⛓️  Height: {}", state.node.chain().len());
    println!("\n   Press Ctrl+C to stop\n");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (queue, requests) = tokio::sync::mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(run_worker(state.node.clone(), requests));
        let miner = spawn_miner(state.node.clone())?;

        let mut ticker = tokio::time::interval(Duration::from_secs(STATUS_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = ticker.tick() => {
                    let (item, reply) = WorkItem::with_reply(Request::Status);
                    if queue.send(item).await.is_err() {
                        break;
                    }
                    if let Ok(Response::Status(status)) = reply.await {
                        log::info!(
                            "Height {} | head {} | pool {} | reward {}",
                            status.height,
                            status.head,
                            status.pool_size,
                            status.reward
                        );
                    }
                }
            }
        }

        println!("\n🛑 Shutting down...");
        tokio::task::spawn_blocking(move || miner.shutdown()).await?;
        drop(queue);
        worker.await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    state.save()?;
    println!("💾 Ledger saved ({} blocks)", state.node.chain().len());
    Ok(())
}

/// Print this node's address
pub fn cmd_address(state: &AppState) -> CliResult<()> {
    let address = state.node.address();
    println!("📍 Address: {}", address.repr());
    println!("   Public key: {}", address.hex_string());
    Ok(())
}

/// Spend one unspent input of this node's wallet
pub fn cmd_send(state: &mut AppState, to: &str, amount: u64) -> CliResult<()> {
    let recipient = Address::parse_hex_string(to)?;
    let me = state.key.public();

    let Some((input, available)) = find_spendable_input(&state.node, &me, amount) else {
        println!("❌ No single unspent input of at least {} units", amount);
        return Ok(());
    };

    let mut outputs = vec![TxOutput::new(amount, recipient)];
    if available > amount {
        outputs.push(TxOutput::new(available - amount, me));
    }
    let tx = Transaction::new_signed(TxBody::new(me, input, outputs), &state.key)?;
    let hash = tx.hash();

    if !state.node.submit_transaction(tx) {
        println!("❌ Transaction rejected");
        return Ok(());
    }
    state.save()?;

    println!("📤 Transaction created:");
    println!("   Hash: {}", hash);
    println!("   To: {}", recipient.repr());
    println!("   Amount: {}", amount);
    println!("\n✅ Transaction added to pool");
    println!("   It will be included in the next mined block.");

    Ok(())
}

/// First recorded transaction paying `owner` at least `amount` whose funds
/// are neither spent on chain nor claimed by a pooled transaction
fn find_spendable_input(node: &Node, owner: &Address, amount: u64) -> Option<(TxHashPointer, u64)> {
    let chain = node.chain().read();
    let pool = node.pool();

    for block in &chain.blocks {
        for (index, tx) in block.transactions.iter().enumerate() {
            let available = tx.total_to(owner).unwrap_or(0);
            if available < amount || available == 0 {
                continue;
            }

            let input = TxHashPointer::new(block.block_number(), tx.hash(), index as u32);
            let probe = Transaction {
                body: TxBody::new(*owner, input, Vec::new()),
                sig: Default::default(),
            };
            let spent = chain
                .contains_transaction(&probe, input.block_number, chain.len() as u32)
                .is_some();
            if !spent && pool.get(&input).is_none() {
                return Some((input, available));
            }
        }
    }
    None
}

/// Display ledger info
pub fn cmd_chain_info(state: &AppState) -> CliResult<()> {
    let stats = state.node.chain().read().stats();
    let status = state.node.status();

    println!("⛓️  Ledger Info");
    println!("   ├─ Height: {}", stats.height);
    println!("   ├─ Total transactions: {}", stats.total_transactions);
    println!("   ├─ Difficulty: {}", state.node.consensus().current_difficulty());
    println!("   ├─ Target: {}", status.target);
    println!("   ├─ Next reward: {}", status.reward);
    println!("   └─ Head: {}", stats.head);

    Ok(())
}

/// List recent blocks
pub fn cmd_chain_blocks(state: &AppState, count: u32) -> CliResult<()> {
    let chain = state.node.chain().read();
    let start = chain.len().saturating_sub(count as usize);

    println!("🧱 Recent blocks:");
    for block in chain.blocks[start..].iter().rev() {
        let time = chrono::DateTime::from_timestamp(block.header.time as i64, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "   #{} | {} | {} tx | {}",
            block.block_number(),
            block.hash(),
            block.tx_count(),
            time
        );
    }

    Ok(())
}

/// Validate the ledger
pub fn cmd_validate(state: &AppState) -> CliResult<()> {
    println!("🔍 Validating ledger...");

    let chain = state.node.chain().read();
    match chain.verify() {
        Ok(()) => {
            println!("✅ Ledger is valid!");
            println!("   {} blocks verified", chain.len());
        }
        Err((number, code)) => {
            println!("❌ Ledger validation FAILED at block {}: {}", number, code);
            println!("   The chain may have been tampered with.");
        }
    }

    Ok(())
}

/// Show pool status
pub fn cmd_pool(state: &AppState) -> CliResult<()> {
    let pool = state.node.pool();
    println!("📬 Pool Status");
    println!("   Pending transactions: {}", pool.len());

    if !pool.is_empty() {
        println!("\n   Transactions:");
        for tx in pool.transactions().into_iter().take(10) {
            println!(
                "   └─ {} from {} ({} outputs)",
                tx.hash(),
                tx.sender().repr(),
                tx.outputs().len()
            );
        }
    }

    Ok(())
}
