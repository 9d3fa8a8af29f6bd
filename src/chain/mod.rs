// Chain module - THE LEDGER
// Blocks, proof-of-work, validity rules and longest-valid-chain fork choice

mod block;
mod blockchain;
pub mod pow;

pub use block::{
    compute_hash, now_secs, Block, GENESIS_DATA, GENESIS_HASH, GENESIS_PREVIOUS_HASH,
    GENESIS_TIMESTAMP,
};
pub use blockchain::{
    is_valid_chain, is_valid_successor, validate_chain, validate_successor, Chain, ChainError,
    SharedChain, ValidationError,
};
pub use pow::meets_difficulty;
