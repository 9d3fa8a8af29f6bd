// Synchronizer - The gossip state machine
//
// Reacts to each inbound message against the shared chain and returns the
// events the caller must carry out (replies, broadcasts, persistence).
// The only state is the chain itself; the decision read and the mutation
// happen under one write guard so two updates never race on a stale tip.

use crate::chain::{Block, ChainError, SharedChain};
use crate::sync::protocol::{Message, PeerCount};
use tracing::{debug, info};

/// Events produced by the synchronizer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipEvent {
    /// Send to the peer the message came from
    Reply(Message),
    /// Send to every open peer
    Broadcast(Message),
    /// A block was appended to the local chain
    BlockAppended(Block),
    /// The local chain was replaced by a longer valid chain
    ChainReplaced(Vec<Block>),
}

/// Statistics about the synchronizer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub messages_processed: u64,
    pub blocks_appended: u64,
    pub blocks_rejected: u64,
    pub chains_replaced: u64,
    pub chains_rejected: u64,
    pub stale_ignored: u64,
    pub chain_requests: u64,
    pub unknown_messages: u64,
    pub last_reported_peers: Option<usize>,
}

/// Drives chain convergence from gossip
pub struct Synchronizer {
    chain: SharedChain,
    stats: SyncStats,
}

impl Synchronizer {
    /// Create a synchronizer over the shared chain
    pub fn new(chain: SharedChain) -> Self {
        Self {
            chain,
            stats: SyncStats::default(),
        }
    }

    /// Get the shared chain
    pub fn chain(&self) -> &SharedChain {
        &self.chain
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Process an incoming message.
    ///
    /// `peer_count` is the number of open sessions, reported on REQUEST_PEERS.
    pub fn process_message(&mut self, msg: Message, peer_count: usize) -> Vec<GossipEvent> {
        self.stats.messages_processed += 1;

        match msg {
            Message::RequestLatestBlock => {
                debug!("peer requested latest block");
                vec![GossipEvent::Reply(Message::ReceiveLatestBlock(
                    self.chain.latest(),
                ))]
            }

            Message::RequestBlockchain => {
                debug!("peer requested blockchain");
                vec![GossipEvent::Reply(Message::ReceiveBlockchain(
                    self.chain.snapshot(),
                ))]
            }

            Message::RequestPeers => {
                debug!("peer requested network details");
                vec![GossipEvent::Reply(Message::peers(peer_count))]
            }

            Message::ReceiveLatestBlock(block) => {
                debug!(index = block.index, hash = %block.short_hash(), "received latest block");
                self.sync_blocks(vec![block])
            }

            Message::ReceiveBlockchain(mut blocks) => {
                blocks.sort_by_key(|b| b.index);
                debug!(length = blocks.len(), "received blockchain");
                self.sync_blocks(blocks)
            }

            Message::ReceivePeers(PeerCount { nodes }) => {
                debug!(nodes, "peer reported network details");
                self.stats.last_reported_peers = Some(nodes);
                Vec::new()
            }

            Message::Unknown(tag) => {
                debug!(tag = %tag, "received unknown message type");
                self.stats.unknown_messages += 1;
                Vec::new()
            }
        }
    }

    /// Apply a received block set (one announced block, or a full chain)
    pub fn sync_blocks(&mut self, received: Vec<Block>) -> Vec<GossipEvent> {
        let Some(latest_received) = received.last() else {
            debug!("received empty block set, ignoring");
            return Vec::new();
        };

        let mut chain = self.chain.write();
        let latest_held = chain.latest();

        if latest_received.index <= latest_held.index {
            debug!(
                received = latest_received.index,
                held = latest_held.index,
                "received chain is not longer than local chain, nothing to do"
            );
            self.stats.stale_ignored += 1;
            return Vec::new();
        }

        debug!(
            received = latest_received.index,
            held = latest_held.index,
            "local chain possibly behind"
        );

        if latest_held.hash == latest_received.previous_hash {
            let block = latest_received.clone();
            return match chain.append(block.clone()) {
                Ok(()) => {
                    self.stats.blocks_appended += 1;
                    vec![
                        GossipEvent::BlockAppended(block.clone()),
                        GossipEvent::Broadcast(Message::ReceiveLatestBlock(block)),
                    ]
                }
                Err(_) => {
                    self.stats.blocks_rejected += 1;
                    Vec::new()
                }
            };
        }

        if received.len() == 1 {
            debug!("received block does not link to local tip, requesting full chain");
            self.stats.chain_requests += 1;
            return vec![GossipEvent::Broadcast(Message::RequestBlockchain)];
        }

        match chain.replace(received.clone()) {
            Ok(()) => {
                self.stats.chains_replaced += 1;
                let tip = chain.latest().clone();
                info!(length = chain.len(), tip = %tip.short_hash(), "adopted longer chain from peer");
                vec![
                    GossipEvent::ChainReplaced(received),
                    GossipEvent::Broadcast(Message::ReceiveLatestBlock(tip)),
                ]
            }
            Err(_) => {
                self.stats.chains_rejected += 1;
                Vec::new()
            }
        }
    }

    /// Append a locally mined block and announce it
    pub fn append_mined(&mut self, block: Block) -> Result<Vec<GossipEvent>, ChainError> {
        self.chain.write().append(block.clone())?;
        self.stats.blocks_appended += 1;
        info!(index = block.index, hash = %block.short_hash(), "a new block was successfully mined");

        Ok(vec![
            GossipEvent::BlockAppended(block.clone()),
            GossipEvent::Broadcast(Message::ReceiveLatestBlock(block)),
        ])
    }
}
