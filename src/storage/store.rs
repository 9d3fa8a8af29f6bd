// ChainStore - Persistent block storage using sled
//
// Blocks live in one tree keyed by big-endian index, so iteration order is
// chain order. Values are postcard-encoded blocks.

use crate::chain::Block;
use std::path::Path;
use thiserror::Error;

/// Tree holding the blocks
const BLOCKS_TREE: &[u8] = b"chain:blocks";

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("Stored blocks are not contiguous: expected index {expected}, found {found}")]
    Gap { expected: u64, found: u64 },
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of stored blocks
    pub block_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

/// Persistent store for the local chain
///
/// Uses sled for crash-safe, embedded storage.
/// Whole-chain replacement is applied as one atomic batch.
#[derive(Clone)]
pub struct ChainStore {
    db: sled::Db,
    blocks: sled::Tree,
}

impl ChainStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        let blocks = db.open_tree(BLOCKS_TREE)?;
        Ok(Self { db, blocks })
    }

    /// Check if no block is stored
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            block_count: self.blocks.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }

    /// Store one block at its index
    pub fn append_block(&self, block: &Block) -> Result<(), StoreError> {
        self.blocks.insert(block.index.to_be_bytes(), encode(block)?)?;
        Ok(())
    }

    /// Replace every stored block with `blocks`, atomically
    pub fn replace_chain(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for result in self.blocks.iter() {
            let (key, _) = result?;
            batch.remove(key);
        }
        for block in blocks {
            batch.insert(block.index.to_be_bytes().to_vec(), encode(block)?);
        }
        self.blocks.apply_batch(batch)?;
        Ok(())
    }

    /// Get a block by index
    pub fn get_block(&self, index: u64) -> Result<Option<Block>, StoreError> {
        match self.blocks.get(index.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load all blocks in index order; fails on a gap
    pub fn load_blocks(&self) -> Result<Vec<Block>, StoreError> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for result in self.blocks.iter() {
            let (_, value) = result?;
            let block = decode(&value)?;
            let expected = blocks.len() as u64;
            if block.index != expected {
                return Err(StoreError::Gap {
                    expected,
                    found: block.index,
                });
            }
            blocks.push(block);
        }
        Ok(blocks)
    }
}

fn encode(block: &Block) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(block).map_err(|e| StoreError::SerializationFailed(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Block, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
}
