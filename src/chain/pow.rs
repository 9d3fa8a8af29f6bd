// Proof-of-work - Difficulty predicate and nonce search

use crate::chain::block::Block;

/// Nonces tried between two checks of the abort predicate
pub const ABORT_CHECK_INTERVAL: u64 = 1024;

/// Count leading '0' characters of a hex hash
pub fn leading_zeros(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

/// Check whether a hash has at least `difficulty` leading zero hex characters
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zeros(hash) >= difficulty as usize
}

/// Search nonces from 0 upward until the hash meets `difficulty`.
///
/// The timestamp and every other field of `template` stay fixed for the search.
pub fn mine(template: Block, difficulty: u32) -> Block {
    let mut block = template;
    block.nonce = 0;
    loop {
        block.hash = block.compute_hash();
        if meets_difficulty(&block.hash, difficulty) {
            return block;
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
}

/// Same search as [`mine`], but gives up when `should_abort` returns true.
///
/// The predicate is polled every [`ABORT_CHECK_INTERVAL`] nonces.
pub fn mine_cancellable<F>(template: Block, difficulty: u32, should_abort: F) -> Option<Block>
where
    F: Fn() -> bool,
{
    let mut block = template;
    block.nonce = 0;
    loop {
        if block.nonce % ABORT_CHECK_INTERVAL == 0 && should_abort() {
            return None;
        }
        block.hash = block.compute_hash();
        if meets_difficulty(&block.hash, difficulty) {
            return Some(block);
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
}
