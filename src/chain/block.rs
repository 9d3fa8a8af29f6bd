// Block - Immutable ledger record with a content hash
//
// The hash covers index, previous hash, timestamp, payload and nonce,
// concatenated as text in that order and rendered as lowercase hex SHA-256.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Previous-hash sentinel carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Hash of the genesis block, shared by every node
pub const GENESIS_HASH: &str = "000dc75a315c77a1f9c98fb6247d03dd18ac52632d7dc6a9920261d8109b37cf";

/// Payload of the genesis block
pub const GENESIS_DATA: &str = "-- genesis block --";

/// Timestamp of the genesis block (seconds since epoch)
pub const GENESIS_TIMESTAMP: u64 = 1_506_816_000;

/// Compute the content hash of a block from its fields
pub fn compute_hash(index: u64, previous_hash: &str, timestamp: u64, data: &str, nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(data.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Current time in whole seconds since the Unix epoch
pub fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// A single block in the chain
///
/// Serialized with camelCase keys (`previousHash`) to match the wire format.
/// The stored `hash` is validated against the recomputed digest on every
/// chain check; it is never trusted as a cache.
///
/// `timestamp` is whole seconds. Peers that stamp fractional seconds send a
/// JSON float there, which fails to decode as a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub hash: String,
    pub data: String,
    pub nonce: u64,
    pub timestamp: u64,
}

impl Block {
    /// Create a block from explicit fields (no hashing performed)
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        hash: impl Into<String>,
        data: impl Into<String>,
        nonce: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            index,
            previous_hash: previous_hash.into(),
            hash: hash.into(),
            data: data.into(),
            nonce,
            timestamp,
        }
    }

    /// The fixed first block of every chain
    pub fn genesis() -> Self {
        Self::new(
            0,
            GENESIS_PREVIOUS_HASH,
            GENESIS_HASH,
            GENESIS_DATA,
            0,
            GENESIS_TIMESTAMP,
        )
    }

    /// Unmined successor of `previous`: nonce 0, timestamp now, hash filled in
    pub fn successor_of(previous: &Block, data: impl Into<String>) -> Self {
        let mut block = Self::new(
            previous.index + 1,
            previous.hash.clone(),
            String::new(),
            data,
            0,
            now_secs(),
        );
        block.hash = block.compute_hash();
        block
    }

    /// Check whether this is exactly the genesis block
    pub fn is_genesis(&self) -> bool {
        *self == Self::genesis()
    }

    /// Recompute the digest from this block's fields
    pub fn compute_hash(&self) -> String {
        compute_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.data,
            self.nonce,
        )
    }

    /// Check whether the stored hash matches the recomputed one
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Short form of the hash for log lines.
    ///
    /// Received blocks are logged before validation, so the hash may not be hex.
    pub fn short_hash(&self) -> &str {
        match self.hash.char_indices().nth(12) {
            Some((end, _)) => &self.hash[..end],
            None => &self.hash,
        }
    }
}
