// Node Tests
// End-to-end tests: sessions, convergence, queries and persistence

use chainmesh::chain::Block;
use chainmesh::node::{query, ConfigError, Node, NodeConfig, NodeError};
use chainmesh::sync::Message;
use chainmesh::transport::PeerAddress;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn local_config(difficulty: u32) -> NodeConfig {
    NodeConfig::new()
        .with_bind_address("127.0.0.1")
        .with_port(0)
        .with_difficulty(difficulty)
        .with_connect_timeout(5)
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    condition()
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = Node::new(local_config(65));

    assert!(matches!(
        result,
        Err(NodeError::Config(ConfigError::Invalid(_)))
    ));
}

// ============================================================================
// LOCAL MINING
// ============================================================================

#[tokio::test]
async fn test_new_node_holds_genesis() {
    init_tracing();
    let node = Node::new(local_config(1)).unwrap();

    assert_eq!(node.blocks(), vec![Block::genesis()]);
    assert_eq!(node.latest_block(), Block::genesis());
    assert_eq!(node.peer_count(), 0);

    node.shutdown().await;
}

#[tokio::test]
async fn test_mine_appends_block() {
    init_tracing();
    let node = Node::new(local_config(1)).unwrap();

    let block = node.mine("first payload").await.unwrap().unwrap();

    assert_eq!(block.index, 1);
    assert_eq!(block.data, "first payload");
    assert!(block.hash.starts_with('0'));
    assert_eq!(node.latest_block(), block);

    let stats = node.stats();
    assert_eq!(stats.chain_length, 2);
    assert_eq!(stats.latest_hash, block.hash);

    node.shutdown().await;
}

#[tokio::test]
async fn test_mine_after_shutdown_fails() {
    let node = Node::new(local_config(0)).unwrap();
    node.shutdown().await;

    assert!(matches!(node.mine("late").await, Err(NodeError::ShutDown)));
}

// ============================================================================
// CONVERGENCE
// ============================================================================

#[tokio::test]
async fn test_joining_node_adopts_longer_chain() {
    init_tracing();
    let a = Node::new(local_config(1)).unwrap();
    let address = a.serve().await.unwrap();
    a.mine("a1").await.unwrap().unwrap();
    a.mine("a2").await.unwrap().unwrap();

    let b = Node::new(local_config(1)).unwrap();
    b.join(&address.host, address.port).await.unwrap();

    assert!(wait_until(|| b.blocks().len() == 3).await);
    assert_eq!(b.blocks(), a.blocks());
    assert!(wait_until(|| a.peer_count() == 1).await);
    assert_eq!(b.peer_count(), 1);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_mined_block_reaches_peer() {
    init_tracing();
    let a = Node::new(local_config(1)).unwrap();
    let address = a.serve().await.unwrap();
    let b = Node::new(local_config(1)).unwrap();
    b.join(&address.host, address.port).await.unwrap();
    assert!(wait_until(|| a.peer_count() == 1).await);

    let block = b.mine("from b").await.unwrap().unwrap();

    assert!(wait_until(|| a.latest_block() == block).await);
    assert!(a.stats().sync.blocks_appended >= 1);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_equal_length_fork_keeps_first_seen() {
    init_tracing();
    let a = Node::new(local_config(1)).unwrap();
    let b = Node::new(local_config(1)).unwrap();
    let a_block = a.mine("fork a").await.unwrap().unwrap();
    let b_block = b.mine("fork b").await.unwrap().unwrap();

    let address = a.serve().await.unwrap();
    b.join(&address.host, address.port).await.unwrap();
    assert!(wait_until(|| a.peer_count() == 1).await);
    sleep(Duration::from_millis(200)).await;

    assert_eq!(a.latest_block(), a_block);
    assert_eq!(b.latest_block(), b_block);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_peer_limit_refuses_extra_connections() {
    init_tracing();
    let a = Node::new(local_config(0).with_max_peers(1)).unwrap();
    let address = a.serve().await.unwrap();
    let b = Node::new(local_config(0)).unwrap();
    let c = Node::new(local_config(0)).unwrap();

    b.join(&address.host, address.port).await.unwrap();
    assert!(wait_until(|| a.peer_count() == 1).await);
    c.join(&address.host, address.port).await.unwrap();

    // The refused session closes and is forgotten on c's side
    assert!(wait_until(|| c.peer_count() == 0).await);
    assert_eq!(a.peer_count(), 1);

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

// ============================================================================
// QUERIES
// ============================================================================

#[tokio::test]
async fn test_query_blockchain() {
    init_tracing();
    let node = Node::new(local_config(1)).unwrap();
    let address = node.serve().await.unwrap();
    node.mine("queried").await.unwrap().unwrap();

    let reply = query(&address, Message::RequestBlockchain, WAIT).await.unwrap();

    assert_eq!(reply.message, Message::ReceiveBlockchain(node.blocks()));
    assert_eq!(reply.node.as_ref(), Some(node.node_id()));

    node.shutdown().await;
}

#[tokio::test]
async fn test_query_peers() {
    init_tracing();
    let node = Node::new(local_config(0)).unwrap();
    let address = node.serve().await.unwrap();

    let reply = query(&address, Message::RequestPeers, WAIT).await.unwrap();

    // The querying session itself is the one open peer
    assert_eq!(reply.message, Message::peers(1));

    node.shutdown().await;
}

#[tokio::test]
async fn test_query_without_reply_type() {
    let address = PeerAddress::tcp("127.0.0.1", 1);

    let result = query(&address, Message::peers(0), WAIT).await;

    assert!(matches!(result, Err(NodeError::NoReply(_))));
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_chain_survives_restart() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = local_config(1).with_data_dir(temp_dir.path());

    let mined = {
        let node = Node::new(config.clone()).unwrap();
        node.mine("one").await.unwrap().unwrap();
        node.mine("two").await.unwrap().unwrap();
        let blocks = node.blocks();
        node.shutdown().await;
        blocks
    };

    let node = Node::new(config).unwrap();
    assert_eq!(node.blocks(), mined);
    assert_eq!(node.stats().storage.map(|s| s.block_count), Some(3));

    node.shutdown().await;
}

#[tokio::test]
async fn test_adopted_chain_is_persisted() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let a = Node::new(local_config(0)).unwrap();
    let address = a.serve().await.unwrap();
    for i in 0..3 {
        a.mine(format!("a{}", i)).await.unwrap().unwrap();
    }

    let config = local_config(0).with_data_dir(temp_dir.path());
    {
        let b = Node::new(config.clone()).unwrap();
        b.join(&address.host, address.port).await.unwrap();
        assert!(wait_until(|| b.blocks().len() == 4).await);
        b.shutdown().await;
    }

    let restored = Node::new(config).unwrap();
    assert_eq!(restored.blocks(), a.blocks());

    restored.shutdown().await;
    a.shutdown().await;
}
