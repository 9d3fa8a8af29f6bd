// Peer Management - Track open peer sessions
//
// Holds one entry per live connection: where it came from, which node is on
// the other side (once it has spoken), and the channel feeding its writer
// task. Unicast goes to one entry, broadcast to all of them.

use crate::sync::protocol::NodeId;
use crate::transport::{ConnectionId, Direction, PeerAddress};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;

/// Peer-related errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PeerError {
    #[error("Maximum number of peers reached ({0})")]
    MaxPeersReached(usize),

    #[error("Peer already registered")]
    AlreadyRegistered,

    #[error("Peer not found")]
    PeerNotFound,

    #[error("Peer session closed")]
    SessionClosed,
}

/// Statistics about the open peer set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub total_peers: usize,
    pub inbound_peers: usize,
    pub outbound_peers: usize,
    pub identified_peers: usize,
}

/// Information about an open session
#[derive(Clone, Debug)]
pub struct PeerInfo {
    /// Connection identifier
    connection_id: ConnectionId,
    /// Remote address
    address: PeerAddress,
    /// Who opened the connection
    direction: Direction,
    /// Node ID announced in the peer's envelopes, once seen
    node_id: Option<NodeId>,
    /// When the session was opened (unix timestamp ms)
    connected_at: u64,
    /// Last time we heard from this peer (unix timestamp ms)
    last_seen: u64,
    /// Messages received on this session
    messages_received: u64,
}

impl PeerInfo {
    /// Create info for a freshly opened session
    pub fn new(connection_id: ConnectionId, address: PeerAddress, direction: Direction) -> Self {
        let now = now_millis();
        Self {
            connection_id,
            address,
            direction,
            node_id: None,
            connected_at: now,
            last_seen: now,
            messages_received: 0,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Record an incoming message, learning the sender's node ID
    pub fn record_message(&mut self, node_id: Option<&NodeId>) {
        if let Some(id) = node_id {
            self.node_id = Some(id.clone());
        }
        self.messages_received = self.messages_received.saturating_add(1);
        self.last_seen = now_millis();
    }
}

struct PeerSession {
    info: PeerInfo,
    writer: mpsc::UnboundedSender<String>,
}

/// Registry of open peer sessions
pub struct PeerRegistry {
    max_peers: usize,
    peers: HashMap<ConnectionId, PeerSession>,
}

impl PeerRegistry {
    /// Create a registry accepting at most `max_peers` sessions
    pub fn new(max_peers: usize) -> Self {
        Self {
            max_peers,
            peers: HashMap::new(),
        }
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Get number of open sessions
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Check whether another session can be accepted
    pub fn has_capacity(&self) -> bool {
        self.peers.len() < self.max_peers
    }

    /// Register a session and the channel feeding its writer
    pub fn add_peer(
        &mut self,
        info: PeerInfo,
        writer: mpsc::UnboundedSender<String>,
    ) -> Result<(), PeerError> {
        if self.peers.contains_key(info.connection_id()) {
            return Err(PeerError::AlreadyRegistered);
        }
        if !self.has_capacity() {
            return Err(PeerError::MaxPeersReached(self.max_peers));
        }

        self.peers
            .insert(info.connection_id().clone(), PeerSession { info, writer });
        Ok(())
    }

    /// Remove a session; returns its info if it was registered
    pub fn remove_peer(&mut self, connection_id: &ConnectionId) -> Option<PeerInfo> {
        self.peers.remove(connection_id).map(|s| s.info)
    }

    /// Get a peer by connection ID
    pub fn get_peer(&self, connection_id: &ConnectionId) -> Option<&PeerInfo> {
        self.peers.get(connection_id).map(|s| &s.info)
    }

    /// Note an incoming message on a session
    pub fn record_message(&mut self, connection_id: &ConnectionId, node_id: Option<&NodeId>) {
        if let Some(session) = self.peers.get_mut(connection_id) {
            session.info.record_message(node_id);
        }
    }

    /// Queue a line for one peer
    pub fn send(&self, connection_id: &ConnectionId, line: &str) -> Result<(), PeerError> {
        let session = self
            .peers
            .get(connection_id)
            .ok_or(PeerError::PeerNotFound)?;

        session
            .writer
            .send(line.to_string())
            .map_err(|_| PeerError::SessionClosed)
    }

    /// Queue a line for every open peer; returns how many accepted it
    pub fn broadcast(&self, line: &str) -> usize {
        self.peers
            .values()
            .filter(|s| s.writer.send(line.to_string()).is_ok())
            .count()
    }

    /// Get statistics
    pub fn stats(&self) -> PeerStats {
        let mut stats = PeerStats {
            total_peers: self.peers.len(),
            ..PeerStats::default()
        };

        for session in self.peers.values() {
            match session.info.direction {
                Direction::Inbound => stats.inbound_peers += 1,
                Direction::Outbound => stats.outbound_peers += 1,
            }
            if session.info.node_id.is_some() {
                stats.identified_peers += 1;
            }
        }

        stats
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
