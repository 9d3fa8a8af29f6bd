// Connections - Session bookkeeping shared by the accept loop, join and the dispatcher
//
// Lock order is always registry, then session handles.

use crate::sync::{Envelope, Message, NodeId, PeerError, PeerInfo, PeerRegistry, PeerStats};
use crate::transport::{spawn_session, ConnectionId, Direction, PeerAddress, Session, TransportEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handle to the open sessions of one node
#[derive(Clone)]
pub(crate) struct Connections {
    node_id: NodeId,
    max_message_bytes: usize,
    registry: Arc<Mutex<PeerRegistry>>,
    sessions: Arc<Mutex<HashMap<ConnectionId, Session>>>,
    events: mpsc::Sender<TransportEvent>,
}

impl Connections {
    pub(crate) fn new(
        node_id: NodeId,
        max_peers: usize,
        max_message_bytes: usize,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            node_id,
            max_message_bytes,
            registry: Arc::new(Mutex::new(PeerRegistry::new(max_peers))),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    fn registry(&self) -> MutexGuard<'_, PeerRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session on `stream` and ask the peer for its tip.
    ///
    /// Refused when the peer set is full; the stream is dropped, closing it.
    pub(crate) fn attach<S>(
        &self,
        stream: S,
        address: PeerAddress,
        direction: Direction,
    ) -> Result<ConnectionId, PeerError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let connection_id = ConnectionId::generate();
        {
            let mut registry = self.registry();
            if !registry.has_capacity() {
                warn!(address = %address, "peer limit reached, refusing connection");
                return Err(PeerError::MaxPeersReached(registry.peer_count()));
            }

            let session = spawn_session(
                stream,
                connection_id.clone(),
                self.max_message_bytes,
                self.events.clone(),
            );
            let info = PeerInfo::new(connection_id.clone(), address.clone(), direction);
            if let Err(e) = registry.add_peer(info, session.writer.clone()) {
                session.abort();
                return Err(e);
            }
            self.sessions().insert(connection_id.clone(), session);
        }

        info!(peer = %connection_id, address = %address, ?direction, "peer connected");
        self.send(&connection_id, Message::RequestLatestBlock);
        Ok(connection_id)
    }

    /// Forget a closed session
    pub(crate) fn detach(&self, connection_id: &ConnectionId) -> Option<PeerInfo> {
        let info = self.registry().remove_peer(connection_id);
        if let Some(session) = self.sessions().remove(connection_id) {
            session.abort();
        }
        info
    }

    /// Abort every session
    pub(crate) fn close_all(&self) {
        let mut registry = self.registry();
        for (connection_id, session) in self.sessions().drain() {
            session.abort();
            registry.remove_peer(&connection_id);
        }
    }

    pub(crate) fn record_message(&self, connection_id: &ConnectionId, node: Option<&NodeId>) {
        self.registry().record_message(connection_id, node);
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.registry().peer_count()
    }

    pub(crate) fn stats(&self) -> PeerStats {
        self.registry().stats()
    }

    /// Send to one peer; failures are logged, the session cleans up on its own
    pub(crate) fn send(&self, connection_id: &ConnectionId, message: Message) {
        let Some(line) = self.encode(message) else {
            return;
        };
        if let Err(e) = self.registry().send(connection_id, &line) {
            debug!(peer = %connection_id, error = %e, "could not queue message");
        }
    }

    /// Send to every open peer
    pub(crate) fn broadcast(&self, message: Message) {
        let tag = message.tag().to_string();
        let Some(line) = self.encode(message) else {
            return;
        };
        let delivered = self.registry().broadcast(&line);
        debug!(message = %tag, peers = delivered, "broadcast");
    }

    fn encode(&self, message: Message) -> Option<String> {
        match Envelope::new(self.node_id.clone(), message).to_line() {
            Ok(line) => Some(line),
            Err(e) => {
                warn!(error = %e, "failed to encode message");
                None
            }
        }
    }
}
