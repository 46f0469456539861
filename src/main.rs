//! Ledger node CLI
//!
//! A command-line interface for running and inspecting a ledger node.

use clap::{Parser, Subcommand};
use cloud_ledger::cli::{self, AppState};
use cloud_ledger::consensus::{ConsensusConfig, DEFAULT_DIFFICULTY, HALVING_INTERVAL};
use cloud_ledger::core::BLOCK_SIZE;
use cloud_ledger::node::NodeConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(version = "0.1.0")]
#[command(about = "Proof-of-work ledger node", long_about = None)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(short, long, default_value = ".ledger_data")]
    data_dir: PathBuf,

    /// Mining difficulty (target = MAX / difficulty)
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u64,

    /// Blocks between block reward halvings
    #[arg(long, default_value_t = HALVING_INTERVAL)]
    halving_interval: u32,

    /// Size limit in bytes for assembled blocks
    #[arg(long, default_value_t = BLOCK_SIZE)]
    max_block_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ledger with a fresh signing key
    Init {
        /// Delete any existing ledger first
        #[arg(long)]
        force: bool,
    },

    /// Mine new blocks
    Mine {
        /// Number of blocks to mine
        #[arg(short, long, default_value = "1")]
        count: u32,
    },

    /// Run the node until Ctrl+C
    Run,

    /// Show this node's address
    Address,

    /// Send coins to an address
    Send {
        /// Recipient's address (hex)
        #[arg(short, long)]
        to: String,

        /// Amount to send
        #[arg(short, long)]
        amount: u64,
    },

    /// Display ledger information
    Chain {
        #[command(subcommand)]
        action: Option<ChainCommands>,
    },

    /// Validate the ledger
    Validate,

    /// Show pool status
    Pool,
}

#[derive(Subcommand)]
enum ChainCommands {
    /// Show detailed info
    Info,

    /// List recent blocks
    Blocks {
        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = NodeConfig {
        data_dir: cli.data_dir,
        max_block_size: cli.max_block_size,
        consensus: ConsensusConfig {
            starting_difficulty: cli.difficulty,
            halving_interval: cli.halving_interval,
            ..Default::default()
        },
    };

    // Init runs before any state exists
    if let Commands::Init { force } = cli.command {
        return cli::cmd_init(config, force);
    }

    let mut state = AppState::new(config)?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Mine { count } => {
            cli::cmd_mine(&mut state, count)?;
        }

        Commands::Run => {
            cli::cmd_run(&state)?;
        }

        Commands::Address => {
            cli::cmd_address(&state)?;
        }

        Commands::Send { to, amount } => {
            cli::cmd_send(&mut state, &to, amount)?;
        }

        Commands::Chain { action } => match action {
            None | Some(ChainCommands::Info) => {
                cli::cmd_chain_info(&state)?;
            }
            Some(ChainCommands::Blocks { count }) => {
                cli::cmd_chain_blocks(&state, count)?;
            }
        },

        Commands::Validate => {
            cli::cmd_validate(&state)?;
        }

        Commands::Pool => {
            cli::cmd_pool(&state)?;
        }
    }

    Ok(())
}
