// Protocol - Message types for chain gossip
//
// One JSON envelope per line:
//   { "type": <tag>, "data": <type-dependent>, "node": <sender id> }
//
// - REQUEST_LATEST_BLOCK / REQUEST_BLOCKCHAIN / REQUEST_PEERS: no data
// - RECEIVE_LATEST_BLOCK: a single block
// - RECEIVE_BLOCKCHAIN:   an ordered list of blocks
// - RECEIVE_PEERS:        { "nodes": <peer count> }

use crate::chain::Block;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Process-unique identifier of a node, stamped on every outgoing envelope
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a random node ID (32 lowercase hex characters)
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap an identifier received from the wire
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The six known message tags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    RequestLatestBlock,
    ReceiveLatestBlock,
    RequestBlockchain,
    ReceiveBlockchain,
    RequestPeers,
    ReceivePeers,
}

impl MessageType {
    /// Wire tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::RequestLatestBlock => "REQUEST_LATEST_BLOCK",
            MessageType::ReceiveLatestBlock => "RECEIVE_LATEST_BLOCK",
            MessageType::RequestBlockchain => "REQUEST_BLOCKCHAIN",
            MessageType::ReceiveBlockchain => "RECEIVE_BLOCKCHAIN",
            MessageType::RequestPeers => "REQUEST_PEERS",
            MessageType::ReceivePeers => "RECEIVE_PEERS",
        }
    }

    /// Parse a wire tag; `None` for anything not in the protocol
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "REQUEST_LATEST_BLOCK" => Some(MessageType::RequestLatestBlock),
            "RECEIVE_LATEST_BLOCK" => Some(MessageType::ReceiveLatestBlock),
            "REQUEST_BLOCKCHAIN" => Some(MessageType::RequestBlockchain),
            "RECEIVE_BLOCKCHAIN" => Some(MessageType::ReceiveBlockchain),
            "REQUEST_PEERS" => Some(MessageType::RequestPeers),
            "RECEIVE_PEERS" => Some(MessageType::ReceivePeers),
            _ => None,
        }
    }

    /// The reply type a request expects, if this is a request
    pub fn expected_reply(&self) -> Option<MessageType> {
        match self {
            MessageType::RequestLatestBlock => Some(MessageType::ReceiveLatestBlock),
            MessageType::RequestBlockchain => Some(MessageType::ReceiveBlockchain),
            MessageType::RequestPeers => Some(MessageType::ReceivePeers),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Missing payload for {0}")]
    MissingPayload(MessageType),

    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: MessageType, reason: String },

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

/// Payload of RECEIVE_PEERS
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCount {
    pub nodes: usize,
}

/// A decoded gossip message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    RequestLatestBlock,
    ReceiveLatestBlock(Block),
    RequestBlockchain,
    ReceiveBlockchain(Vec<Block>),
    RequestPeers,
    ReceivePeers(PeerCount),
    /// A tag outside the protocol; kept so the caller can log and ignore it
    Unknown(String),
}

impl Message {
    /// Get the message type (`None` for unknown tags)
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Message::RequestLatestBlock => Some(MessageType::RequestLatestBlock),
            Message::ReceiveLatestBlock(_) => Some(MessageType::ReceiveLatestBlock),
            Message::RequestBlockchain => Some(MessageType::RequestBlockchain),
            Message::ReceiveBlockchain(_) => Some(MessageType::ReceiveBlockchain),
            Message::RequestPeers => Some(MessageType::RequestPeers),
            Message::ReceivePeers(_) => Some(MessageType::ReceivePeers),
            Message::Unknown(_) => None,
        }
    }

    /// Wire tag of this message
    pub fn tag(&self) -> &str {
        match self {
            Message::Unknown(tag) => tag,
            other => other.message_type().map(|t| t.as_str()).unwrap_or_default(),
        }
    }

    /// RECEIVE_PEERS for the given number of open sessions
    pub fn peers(nodes: usize) -> Self {
        Message::ReceivePeers(PeerCount { nodes })
    }
}

/// Raw shape of an envelope on the wire
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node: Option<NodeId>,
}

/// A message plus the identifier of the node that sent it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub message: Message,
    pub node: Option<NodeId>,
}

impl Envelope {
    /// Stamp a message with the sender's node ID
    pub fn new(node: NodeId, message: Message) -> Self {
        Self {
            message,
            node: Some(node),
        }
    }

    /// Serialize to a single JSON object (no trailing newline)
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let data = match &self.message {
            Message::ReceiveLatestBlock(block) => Some(to_value(block)?),
            Message::ReceiveBlockchain(blocks) => Some(to_value(blocks)?),
            Message::ReceivePeers(count) => Some(to_value(count)?),
            _ => None,
        };

        let wire = WireEnvelope {
            kind: self.message.tag().to_string(),
            data,
            node: self.node.clone(),
        };

        serde_json::to_string(&wire).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    /// Serialize as one newline-terminated line
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut line = self.encode()?;
        line.push('\n');
        Ok(line)
    }

    /// Decode one envelope; unknown tags decode to [`Message::Unknown`]
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope =
            serde_json::from_str(text.trim()).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let message = match MessageType::from_tag(&wire.kind) {
            Some(MessageType::RequestLatestBlock) => Message::RequestLatestBlock,
            Some(MessageType::RequestBlockchain) => Message::RequestBlockchain,
            Some(MessageType::RequestPeers) => Message::RequestPeers,
            Some(kind @ MessageType::ReceiveLatestBlock) => {
                Message::ReceiveLatestBlock(payload(kind, wire.data)?)
            }
            Some(kind @ MessageType::ReceiveBlockchain) => {
                Message::ReceiveBlockchain(payload(kind, wire.data)?)
            }
            Some(kind @ MessageType::ReceivePeers) => Message::ReceivePeers(payload(kind, wire.data)?),
            None => Message::Unknown(wire.kind),
        };

        Ok(Self {
            message,
            node: wire.node,
        })
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
}

fn payload<T: DeserializeOwned>(kind: MessageType, data: Option<Value>) -> Result<T, ProtocolError> {
    let data = data.ok_or(ProtocolError::MissingPayload(kind))?;
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}
