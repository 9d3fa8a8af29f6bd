// Sync module - HOW NODES CONVERGE
// Wire protocol, the gossip state machine, and the open peer set

mod gossip;
mod peer;
mod protocol;

pub use gossip::{GossipEvent, SyncStats, Synchronizer};
pub use peer::{PeerError, PeerInfo, PeerRegistry, PeerStats};
pub use protocol::{Envelope, Message, MessageType, NodeId, PeerCount, ProtocolError};
