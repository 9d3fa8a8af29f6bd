// Miner - Proof-of-work off the async runtime
//
// Every accepted chain mutation advances the epoch. A job remembers the epoch
// it was built from and gives up as soon as it moves on.

use crate::chain::{pow, Block, SharedChain};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counter advanced on every append or replace
#[derive(Clone, Debug, Default)]
pub struct ChainEpoch(Arc<AtomicU64>);

impl ChainEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the chain as changed; returns the new epoch
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// A pending search for the next block
pub struct MiningJob {
    template: Block,
    difficulty: u32,
    epoch: ChainEpoch,
    started_at: u64,
}

impl MiningJob {
    /// Build a job on top of the current tip
    pub fn new(chain: &SharedChain, epoch: &ChainEpoch, data: impl Into<String>) -> Self {
        // Epoch first: a mutation landing after this read aborts the job
        let started_at = epoch.current();
        let (template, difficulty) = {
            let chain = chain.read();
            (chain.next_template(data), chain.difficulty())
        };

        Self {
            template,
            difficulty,
            epoch: epoch.clone(),
            started_at,
        }
    }

    /// Index the mined block will have
    pub fn index(&self) -> u64 {
        self.template.index
    }

    /// Search on the blocking pool; `None` if the chain moved on first
    pub async fn run(self) -> Option<Block> {
        let MiningJob {
            template,
            difficulty,
            epoch,
            started_at,
        } = self;
        let index = template.index;

        let result = tokio::task::spawn_blocking(move || {
            pow::mine_cancellable(template, difficulty, || epoch.current() != started_at)
        })
        .await;

        match result {
            Ok(Some(block)) => {
                debug!(index, nonce = block.nonce, hash = %block.short_hash(), "proof of work found");
                Some(block)
            }
            Ok(None) => {
                debug!(index, "chain changed, abandoning mining job");
                None
            }
            Err(e) => {
                warn!(index, error = %e, "mining task failed");
                None
            }
        }
    }
}
