// Dispatcher - The single writer
//
// Owns the synchronizer. Session events and mined blocks are handled one at a
// time, so every chain mutation, its write-through and its broadcast happen in
// order.

use crate::chain::Block;
use crate::node::connections::Connections;
use crate::node::miner::ChainEpoch;
use crate::storage::ChainStore;
use crate::sync::{GossipEvent, SyncStats, Synchronizer};
use crate::transport::{ConnectionId, TransportEvent};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Requests from the node handle
pub(crate) enum Command {
    /// A locally mined block; the reply says whether it was appended
    Mined {
        block: Block,
        reply: oneshot::Sender<bool>,
    },
}

pub(crate) struct Dispatcher {
    pub(crate) sync: Synchronizer,
    pub(crate) connections: Connections,
    pub(crate) store: Option<ChainStore>,
    pub(crate) epoch: ChainEpoch,
    pub(crate) stats: Arc<Mutex<SyncStats>>,
}

impl Dispatcher {
    pub(crate) async fn run(
        mut self,
        mut transport: mpsc::Receiver<TransportEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        loop {
            tokio::select! {
                Some(event) = transport.recv() => self.handle_transport(event),
                Some(command) = commands.recv() => self.handle_command(command),
                else => break,
            }
            self.publish_stats();
        }
        debug!("dispatcher stopped");
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::MessageReceived {
                connection_id,
                envelope,
            } => {
                self.connections
                    .record_message(&connection_id, envelope.node.as_ref());
                debug!(peer = %connection_id, message = %envelope.message.tag(), "received message");

                let peer_count = self.connections.peer_count();
                let events = self.sync.process_message(envelope.message, peer_count);
                self.apply(Some(&connection_id), events);
            }
            TransportEvent::DecodeFailed {
                connection_id,
                error,
            } => {
                debug!(peer = %connection_id, error = %error, "ignored undecodable message");
            }
            TransportEvent::Disconnected {
                connection_id,
                reason,
            } => {
                if self.connections.detach(&connection_id).is_some() {
                    info!(peer = %connection_id, reason = %reason, "peer disconnected");
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Mined { block, reply } => {
                let accepted = match self.sync.append_mined(block) {
                    Ok(events) => {
                        self.apply(None, events);
                        true
                    }
                    Err(e) => {
                        debug!(error = %e, "mined block no longer extends the tip");
                        false
                    }
                };
                let _ = reply.send(accepted);
            }
        }
    }

    /// Carry out synchronizer events; persistence always precedes the broadcast
    fn apply(&mut self, origin: Option<&ConnectionId>, events: Vec<GossipEvent>) {
        for event in events {
            match event {
                GossipEvent::BlockAppended(block) => {
                    self.persist_block(&block);
                    self.epoch.advance();
                }
                GossipEvent::ChainReplaced(blocks) => {
                    self.persist_chain(&blocks);
                    self.epoch.advance();
                }
                GossipEvent::Reply(message) => match origin {
                    Some(connection_id) => self.connections.send(connection_id, message),
                    None => debug!(message = %message.tag(), "reply without a peer, dropping"),
                },
                GossipEvent::Broadcast(message) => self.connections.broadcast(message),
            }
        }
    }

    fn persist_block(&self, block: &Block) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.append_block(block).and_then(|_| store.flush()) {
            error!(index = block.index, error = %e, "failed to persist block");
        }
    }

    fn persist_chain(&self, blocks: &[Block]) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.replace_chain(blocks).and_then(|_| store.flush()) {
            error!(length = blocks.len(), error = %e, "failed to persist chain");
        }
    }

    fn publish_stats(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = self.sync.stats().clone();
    }
}
