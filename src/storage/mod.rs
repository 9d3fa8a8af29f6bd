// Storage module - PERSISTENCE
// Keeps the local chain on disk using sled

mod store;

pub use store::{ChainStore, StorageStats, StoreError};
