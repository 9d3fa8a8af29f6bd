// Chain - Genesis-anchored block sequence
//
// Owns the validity rules, local mining and the fork-choice rule:
// a candidate chain replaces the local one only if it is fully valid
// and strictly longer. Equal length never replaces (first seen wins).

use crate::chain::block::Block;
use crate::chain::pow;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Reasons a block fails to extend its predecessor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid index: expected {expected}, got {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("invalid previous hash: expected {expected}, got {found}")]
    PreviousHashMismatch { expected: String, found: String },

    #[error("invalid hash: computed {computed}, stored {stored}")]
    HashMismatch { computed: String, stored: String },

    #[error("hash {hash} does not meet difficulty {difficulty}")]
    InsufficientDifficulty { hash: String, difficulty: u32 },

    #[error("first block is not the genesis block")]
    GenesisMismatch,

    #[error("chain is empty")]
    EmptyChain,
}

/// Errors from chain mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block rejected: {0}")]
    InvalidBlock(ValidationError),

    #[error("chain rejected at block {index}: {reason}")]
    InvalidChain { index: u64, reason: ValidationError },

    #[error("candidate chain ({candidate} blocks) is not longer than local chain ({local} blocks)")]
    NotLonger { candidate: usize, local: usize },
}

/// Check that `candidate` directly extends `predecessor`
pub fn validate_successor(
    candidate: &Block,
    predecessor: &Block,
    difficulty: u32,
) -> Result<(), ValidationError> {
    let expected = predecessor.index + 1;
    if candidate.index != expected {
        return Err(ValidationError::IndexMismatch {
            expected,
            found: candidate.index,
        });
    }

    if candidate.previous_hash != predecessor.hash {
        return Err(ValidationError::PreviousHashMismatch {
            expected: predecessor.hash.clone(),
            found: candidate.previous_hash.clone(),
        });
    }

    let computed = candidate.compute_hash();
    if computed != candidate.hash {
        return Err(ValidationError::HashMismatch {
            computed,
            stored: candidate.hash.clone(),
        });
    }

    if !pow::meets_difficulty(&candidate.hash, difficulty) {
        return Err(ValidationError::InsufficientDifficulty {
            hash: candidate.hash.clone(),
            difficulty,
        });
    }

    Ok(())
}

/// Boolean form of [`validate_successor`]; logs the rejection reason
pub fn is_valid_successor(candidate: &Block, predecessor: &Block, difficulty: u32) -> bool {
    match validate_successor(candidate, predecessor, difficulty) {
        Ok(()) => true,
        Err(reason) => {
            debug!(index = candidate.index, %reason, "invalid successor block");
            false
        }
    }
}

/// Validate a whole chain: exact genesis first, then every linked pair.
///
/// Stops at the first failure and reports the offending block index.
pub fn validate_chain(blocks: &[Block], difficulty: u32) -> Result<(), ChainError> {
    let first = blocks.first().ok_or(ChainError::InvalidChain {
        index: 0,
        reason: ValidationError::EmptyChain,
    })?;

    if !first.is_genesis() {
        return Err(ChainError::InvalidChain {
            index: first.index,
            reason: ValidationError::GenesisMismatch,
        });
    }

    for pair in blocks.windows(2) {
        validate_successor(&pair[1], &pair[0], difficulty).map_err(|reason| {
            ChainError::InvalidChain {
                index: pair[1].index,
                reason,
            }
        })?;
    }

    Ok(())
}

/// Boolean form of [`validate_chain`]; logs the rejection reason
pub fn is_valid_chain(blocks: &[Block], difficulty: u32) -> bool {
    match validate_chain(blocks, difficulty) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "invalid chain");
            false
        }
    }
}

/// The local chain
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    difficulty: u32,
}

impl Chain {
    /// Create a chain holding only the genesis block
    pub fn new(difficulty: u32) -> Self {
        debug!(difficulty, "initializing a new chain");
        Self {
            blocks: vec![Block::genesis()],
            difficulty,
        }
    }

    /// Rebuild a chain from previously stored blocks, validating all of them
    pub fn from_blocks(blocks: Vec<Block>, difficulty: u32) -> Result<Self, ChainError> {
        validate_chain(&blocks, difficulty)?;
        Ok(Self { blocks, difficulty })
    }

    /// All blocks, genesis first
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks including genesis
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain holds at least genesis
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Required leading zero hex characters
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// The current tip
    pub fn latest(&self) -> &Block {
        // blocks is never empty: construction seeds genesis and replace
        // only installs validated, non-empty chains
        &self.blocks[self.blocks.len() - 1]
    }

    /// Unmined successor of the current tip
    pub fn next_template(&self, data: impl Into<String>) -> Block {
        Block::successor_of(self.latest(), data)
    }

    /// Mine a successor of the current tip (blocking, unbounded).
    ///
    /// Does not append; hand the result to [`Chain::append`].
    pub fn mine(&self, data: impl Into<String>) -> Block {
        let template = self.next_template(data);
        debug!(index = template.index, difficulty = self.difficulty, "mining a new block");
        pow::mine(template, self.difficulty)
    }

    /// Append a block that directly extends the tip
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        validate_successor(&block, self.latest(), self.difficulty).map_err(|reason| {
            debug!(index = block.index, %reason, "rejected block");
            ChainError::InvalidBlock(reason)
        })?;

        info!(index = block.index, hash = %block.short_hash(), "block appended");
        self.blocks.push(block);
        Ok(())
    }

    /// Replace the local chain with a strictly longer valid one
    pub fn replace(&mut self, candidate: Vec<Block>) -> Result<(), ChainError> {
        if let Err(e) = validate_chain(&candidate, self.difficulty) {
            debug!(error = %e, "replacement chain is not valid, keeping local chain");
            return Err(e);
        }

        if candidate.len() <= self.blocks.len() {
            debug!(
                candidate = candidate.len(),
                local = self.blocks.len(),
                "replacement chain is not longer, keeping local chain"
            );
            return Err(ChainError::NotLonger {
                candidate: candidate.len(),
                local: self.blocks.len(),
            });
        }

        info!(
            from = self.blocks.len(),
            to = candidate.len(),
            "replacing local chain with received chain"
        );
        self.blocks = candidate;
        Ok(())
    }
}

/// The chain behind a single lock, shared by the miner and every session
#[derive(Clone, Debug)]
pub struct SharedChain {
    inner: Arc<RwLock<Chain>>,
}

impl SharedChain {
    /// Wrap a chain for sharing
    pub fn new(chain: Chain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    /// Acquire the read guard
    pub fn read(&self) -> RwLockReadGuard<'_, Chain> {
        // A panic while holding the guard cannot leave the chain half-mutated:
        // append and replace only touch `blocks` after validation succeeds.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the write guard
    pub fn write(&self) -> RwLockWriteGuard<'_, Chain> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of all blocks
    pub fn snapshot(&self) -> Vec<Block> {
        self.read().blocks().to_vec()
    }

    /// Copy of the tip
    pub fn latest(&self) -> Block {
        self.read().latest().clone()
    }

    /// Current length
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Always false: a chain holds at least genesis
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
