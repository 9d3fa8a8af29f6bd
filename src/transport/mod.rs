// Transport module - THE WIRE
// Socket abstractions and the TCP session loop that frames envelopes as lines

mod tcp;
mod traits;

pub use traits::{
    // Socket abstractions
    Dialer, Listener,
    // Connection types
    ConnectionId, Direction, PeerAddress,
    // Events and errors
    TransportError, TransportEvent,
};

pub use tcp::{read_line_bounded, spawn_session, Session, TcpDialer, TcpListenerSocket};
