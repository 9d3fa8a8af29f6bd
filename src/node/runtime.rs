// Node - A running ledger participant
//
// Ties the chain, the dispatcher, the listener and outbound sessions together.
// The handle is cheap to clone; every clone drives the same node.

use crate::chain::{Block, Chain, ChainError, SharedChain};
use crate::node::config::{ConfigError, NodeConfig};
use crate::node::connections::Connections;
use crate::node::dispatcher::{Command, Dispatcher};
use crate::node::miner::{ChainEpoch, MiningJob};
use crate::storage::{ChainStore, StorageStats, StoreError};
use crate::sync::{NodeId, PeerError, PeerStats, ProtocolError, SyncStats, Synchronizer};
use crate::transport::{
    ConnectionId, Dialer, Direction, Listener, PeerAddress, TcpDialer, TcpListenerSocket,
    TransportError,
};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Node errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("{0} has no reply")]
    NoReply(String),

    #[error("Node is shut down")]
    ShutDown,
}

/// Snapshot of a node's state
#[derive(Clone, Debug)]
pub struct NodeStats {
    pub node_id: NodeId,
    pub chain_length: usize,
    pub latest_hash: String,
    pub difficulty: u32,
    pub sync: SyncStats,
    pub peers: PeerStats,
    pub storage: Option<StorageStats>,
}

/// Handle to a running node
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    config: NodeConfig,
    node_id: NodeId,
    chain: SharedChain,
    store: Option<ChainStore>,
    epoch: ChainEpoch,
    connections: Connections,
    commands: mpsc::Sender<Command>,
    sync_stats: Arc<Mutex<SyncStats>>,
    dialer: TcpDialer,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Create a node and start its dispatcher.
    ///
    /// Must be called inside a tokio runtime. With `data_dir` set, the stored
    /// chain is loaded and fully validated; an empty store is seeded with genesis.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;

        let (chain, store) = open_chain(&config)?;
        let chain = SharedChain::new(chain);
        let node_id = NodeId::generate();
        let epoch = ChainEpoch::new();
        let sync_stats = Arc::new(Mutex::new(SyncStats::default()));

        let (transport_tx, transport_rx) = mpsc::channel(config.event_buffer);
        let (command_tx, command_rx) = mpsc::channel(config.event_buffer);
        let connections = Connections::new(
            node_id.clone(),
            config.max_peers,
            config.max_message_bytes,
            transport_tx,
        );

        let dispatcher = Dispatcher {
            sync: Synchronizer::new(chain.clone()),
            connections: connections.clone(),
            store: store.clone(),
            epoch: epoch.clone(),
            stats: sync_stats.clone(),
        };
        let dispatcher_task = tokio::spawn(dispatcher.run(transport_rx, command_rx));

        info!(node = %node_id, length = chain.len(), difficulty = config.difficulty, "node started");

        Ok(Self {
            inner: Arc::new(NodeInner {
                dialer: TcpDialer::new(config.connect_timeout()),
                config,
                node_id,
                chain,
                store,
                epoch,
                connections,
                commands: command_tx,
                sync_stats,
                tasks: Mutex::new(vec![dispatcher_task]),
            }),
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// The shared chain (read access for embedders)
    pub fn chain(&self) -> &SharedChain {
        &self.inner.chain
    }

    /// Bind the configured address and accept peers in the background
    pub async fn serve(&self) -> Result<PeerAddress, NodeError> {
        let listener =
            TcpListenerSocket::bind(&self.inner.config.bind_address, self.inner.config.port)
                .await?;
        let address = listener.local_address()?;
        info!(address = %address, "listening for peers");

        let task = tokio::spawn(accept_loop(listener, self.inner.connections.clone()));
        self.tasks().push(task);
        Ok(address)
    }

    /// Dial a peer and bootstrap the session
    pub async fn join(&self, host: &str, port: u16) -> Result<ConnectionId, NodeError> {
        let address = PeerAddress::tcp(host, port);
        let stream = self.inner.dialer.dial(&address).await?;
        let connection_id = self
            .inner
            .connections
            .attach(stream, address, Direction::Outbound)?;
        Ok(connection_id)
    }

    /// Mine `data` on top of the current tip and announce it.
    ///
    /// `Ok(None)` when the chain changed under the search or the block lost
    /// the race for its index.
    pub async fn mine(&self, data: impl Into<String>) -> Result<Option<Block>, NodeError> {
        let job = MiningJob::new(&self.inner.chain, &self.inner.epoch, data);
        let index = job.index();

        let Some(block) = job.run().await else {
            info!(index, "mining abandoned, chain changed");
            return Ok(None);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Mined {
                block: block.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| NodeError::ShutDown)?;

        match reply_rx.await {
            Ok(true) => Ok(Some(block)),
            Ok(false) => {
                debug!(index, "mined block was superseded");
                Ok(None)
            }
            Err(_) => Err(NodeError::ShutDown),
        }
    }

    /// Copy of the whole chain
    pub fn blocks(&self) -> Vec<Block> {
        self.inner.chain.snapshot()
    }

    pub fn latest_block(&self) -> Block {
        self.inner.chain.latest()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.connections.peer_count()
    }

    pub fn stats(&self) -> NodeStats {
        let (chain_length, latest_hash, difficulty) = {
            let chain = self.inner.chain.read();
            (chain.len(), chain.latest().hash.clone(), chain.difficulty())
        };

        NodeStats {
            node_id: self.inner.node_id.clone(),
            chain_length,
            latest_hash,
            difficulty,
            sync: self
                .inner
                .sync_stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            peers: self.inner.connections.stats(),
            storage: self.inner.store.as_ref().map(ChainStore::stats),
        }
    }

    /// Stop the listener, every session and the dispatcher; flush storage
    pub async fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        self.inner.connections.close_all();
        for task in tasks {
            let _ = task.await;
        }

        if let Some(store) = &self.inner.store {
            if let Err(e) = store.flush() {
                warn!(error = %e, "failed to flush chain store");
            }
        }
        info!(node = %self.inner.node_id, "node stopped");
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_chain(config: &NodeConfig) -> Result<(Chain, Option<ChainStore>), NodeError> {
    let Some(dir) = &config.data_dir else {
        return Ok((Chain::new(config.difficulty), None));
    };

    let store = ChainStore::open(dir)?;
    if store.is_empty() {
        let chain = Chain::new(config.difficulty);
        store.replace_chain(chain.blocks())?;
        store.flush()?;
        info!(path = %dir.display(), "initialized chain store with genesis");
        return Ok((chain, Some(store)));
    }

    let chain = Chain::from_blocks(store.load_blocks()?, config.difficulty)?;
    info!(path = %dir.display(), length = chain.len(), "loaded chain from disk");
    Ok((chain, Some(store)))
}

async fn accept_loop<L: Listener>(mut listener: L, connections: Connections) {
    loop {
        match listener.accept().await {
            Ok((stream, address)) => {
                if let Err(e) = connections.attach(stream, address.clone(), Direction::Inbound) {
                    warn!(address = %address, error = %e, "refused inbound connection");
                }
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}
