// Transport Traits and Core Types
// Listening and dialing abstractions plus the events a session reports

use crate::sync::Envelope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

// ============================================================================
// PEER ADDRESS
// ============================================================================

/// A remote endpoint (host and port)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    /// Create a TCP address
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Parse `host:port`
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let (host, port) = text
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(text.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::InvalidAddress(text.to_string()))?;
        if host.is_empty() {
            return Err(TransportError::InvalidAddress(text.to_string()));
        }
        Ok(Self::tcp(host, port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<std::net::SocketAddr> for PeerAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::tcp(&addr.ip().to_string(), addr.port())
    }
}

// ============================================================================
// CONNECTION ID
// ============================================================================

/// Unique identifier for a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// Generate a new unique connection ID
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl PartialEq for ConnectionId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ConnectionId {}

impl Hash for ConnectionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Which side opened a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Accepted by our listener
    Inbound,
    /// Dialed by us
    Outbound,
}

// ============================================================================
// TRANSPORT EVENTS
// ============================================================================

/// Events emitted by peer sessions
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A decoded envelope arrived
    MessageReceived {
        connection_id: ConnectionId,
        envelope: Envelope,
    },

    /// A line could not be decoded; the session stays open
    DecodeFailed {
        connection_id: ConnectionId,
        error: String,
    },

    /// Session closed (remote close, I/O fault or protocol violation)
    Disconnected {
        connection_id: ConnectionId,
        reason: String,
    },
}

impl TransportEvent {
    /// The connection this event belongs to
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            Self::MessageReceived { connection_id, .. }
            | Self::DecodeFailed { connection_id, .. }
            | Self::Disconnected { connection_id, .. } => connection_id,
        }
    }
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Accept failed: {0}")]
    AcceptFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection closed")]
    Closed,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("IO error: {0}")]
    IoError(String),
}

impl TransportError {
    /// Check if the operation can be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailed(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

// ============================================================================
// SOCKET ABSTRACTIONS
// ============================================================================

/// A bound listening socket handing out inbound streams
#[async_trait]
pub trait Listener: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for the next inbound connection
    async fn accept(&mut self) -> Result<(Self::Stream, PeerAddress), TransportError>;

    /// The address actually bound
    fn local_address(&self) -> Result<PeerAddress, TransportError>;
}

/// Opens outbound streams
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Connect to a remote node
    async fn dial(&self, address: &PeerAddress) -> Result<Self::Stream, TransportError>;
}
