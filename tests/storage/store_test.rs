// Store Tests
// Tests for on-disk chain persistence

use chainmesh::chain::{Block, Chain};
use chainmesh::storage::{ChainStore, StoreError};
use tempfile::TempDir;

fn build_chain(length: usize, label: &str) -> Chain {
    let mut chain = Chain::new(0);
    while chain.len() < length {
        let block = chain.mine(format!("{} {}", label, chain.len()));
        chain.append(block).unwrap();
    }
    chain
}

// ============================================================================
// BASIC OPERATIONS
// ============================================================================

#[test]
fn test_new_store_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = ChainStore::open(temp_dir.path()).unwrap();

    assert!(store.is_empty());
    assert_eq!(store.len(), 0);
    assert!(store.load_blocks().unwrap().is_empty());
    assert!(store.get_block(0).unwrap().is_none());
}

#[test]
fn test_append_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let store = ChainStore::open(temp_dir.path()).unwrap();
    let chain = build_chain(4, "a");

    for block in chain.blocks() {
        store.append_block(block).unwrap();
    }

    assert_eq!(store.load_blocks().unwrap(), chain.blocks().to_vec());
    assert_eq!(store.stats().block_count, 4);
}

// ============================================================================
// REPLACEMENT
// ============================================================================

#[test]
fn test_replace_chain_drops_old_blocks() {
    let temp_dir = TempDir::new().unwrap();
    let store = ChainStore::open(temp_dir.path()).unwrap();
    let old = build_chain(5, "old");
    let new = build_chain(3, "new");

    store.replace_chain(old.blocks()).unwrap();
    store.replace_chain(new.blocks()).unwrap();

    assert_eq!(store.len(), 3);
    assert_eq!(store.load_blocks().unwrap(), new.blocks().to_vec());
    assert!(store.get_block(4).unwrap().is_none());
}

#[test]
fn test_replace_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let chain = build_chain(3, "durable");

    {
        let store = ChainStore::open(temp_dir.path()).unwrap();
        store.replace_chain(chain.blocks()).unwrap();
        store.flush().unwrap();
    }

    let store = ChainStore::open(temp_dir.path()).unwrap();
    let restored = Chain::from_blocks(store.load_blocks().unwrap(), 0).unwrap();
    assert_eq!(restored.blocks(), chain.blocks());
}

// ============================================================================
// CORRUPTION
// ============================================================================

#[test]
fn test_gap_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let store = ChainStore::open(temp_dir.path()).unwrap();
    let chain = build_chain(3, "gap");

    store.append_block(&chain.blocks()[0]).unwrap();
    store.append_block(&chain.blocks()[2]).unwrap();

    assert!(matches!(
        store.load_blocks(),
        Err(StoreError::Gap {
            expected: 1,
            found: 2
        })
    ));
}

#[test]
fn test_get_block_by_index() {
    let temp_dir = TempDir::new().unwrap();
    let store = ChainStore::open(temp_dir.path()).unwrap();
    store.append_block(&Block::genesis()).unwrap();

    assert_eq!(store.get_block(0).unwrap(), Some(Block::genesis()));
}
