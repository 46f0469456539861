//! Ledger persistence layer
//!
//! Saves and loads the blockchain and the transaction pool as JSON files.

use crate::core::blockchain::BlockChain;
use crate::mining::pool::Pool;
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub blockchain_file: String,
    pub pool_file: String,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ledger_data"),
            blockchain_file: "blockchain.json".to_string(),
            pool_file: "pool.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// Ledger storage manager
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    fn blockchain_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.blockchain_file)
    }

    fn pool_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.pool_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.blockchain_file, index))
    }

    /// Save the blockchain to disk
    pub fn save(&self, chain: &BlockChain) -> Result<(), StorageError> {
        let path = self.blockchain_path();

        if self.config.backup_enabled && self.config.max_backups > 0 && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        write_json(&path, chain)?;
        info!("Saved {} blocks to {}", chain.len(), path.display());
        Ok(())
    }

    /// Load the blockchain from disk, rejecting chains that fail validation
    pub fn load(&self) -> Result<BlockChain, StorageError> {
        let path = self.blockchain_path();

        if !path.exists() {
            return Err(StorageError::InvalidData(
                "Blockchain file not found".to_string(),
            ));
        }

        let chain = read_chain(&path)?;
        info!("Loaded {} blocks from {}", chain.len(), path.display());
        Ok(chain)
    }

    /// Check if a saved blockchain exists
    pub fn exists(&self) -> bool {
        self.blockchain_path().exists()
    }

    /// Delete the saved blockchain and pool
    pub fn delete(&self) -> Result<(), StorageError> {
        for path in [self.blockchain_path(), self.pool_path()] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Save the pending transactions
    pub fn save_pool(&self, pool: &Pool) -> Result<(), StorageError> {
        write_json(&self.pool_path(), pool)?;
        debug!("Saved {} pooled transactions", pool.len());
        Ok(())
    }

    /// Load the pending transactions; a missing file yields an empty pool
    pub fn load_pool(&self) -> Result<Pool, StorageError> {
        let path = self.pool_path();
        if !path.exists() {
            return Ok(Pool::new());
        }

        let file = fs::File::open(&path)?;
        let pool: Pool = serde_json::from_reader(BufReader::new(file))?;
        debug!("Loaded {} pooled transactions", pool.len());
        Ok(pool)
    }

    /// Rotate backup files
    fn rotate_backups(&self) -> Result<(), StorageError> {
        let oldest = self.backup_path(self.config.max_backups - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (0..self.config.max_backups - 1).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        Ok(())
    }

    /// Restore from a backup
    pub fn restore_backup(&self, backup_index: usize) -> Result<BlockChain, StorageError> {
        let backup_path = self.backup_path(backup_index);

        if !backup_path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} not found",
                backup_index
            )));
        }

        read_chain(&backup_path)
    }

    /// List available backups
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let path = self.blockchain_path();

        let file_size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };

        Ok(StorageStats {
            file_size,
            backup_count: self.list_backups().len(),
            data_dir: self.config.data_dir.clone(),
        })
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub file_size: u64,
    pub backup_count: usize,
    pub data_dir: PathBuf,
}

/// Write `value` next to `path` and rename it into place
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    let mut writer = BufWriter::new(fs::File::create(&temp_path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_chain(path: &Path) -> Result<BlockChain, StorageError> {
    let file = fs::File::open(path)?;
    let chain: BlockChain = serde_json::from_reader(BufReader::new(file))?;

    chain.verify().map_err(|(block, code)| {
        StorageError::InvalidData(format!("block {} failed validation: {}", block, code))
    })?;
    Ok(chain)
}
