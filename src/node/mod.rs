// Node module - THE RUNNING PEER
// Configuration, mining jobs, the single-writer dispatcher and the node handle

mod config;
mod connections;
mod dispatcher;
mod miner;
mod query;
mod runtime;

pub use config::{
    ConfigError, NodeConfig, DEFAULT_DIFFICULTY, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_PORT,
    MAX_DIFFICULTY,
};
pub use miner::{ChainEpoch, MiningJob};
pub use query::query;
pub use runtime::{Node, NodeError, NodeStats};
