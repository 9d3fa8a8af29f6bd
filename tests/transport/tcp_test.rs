// TCP Transport Tests
// Tests for the TCP listener, dialer and session loop

use chainmesh::sync::{Envelope, Message, NodeId};
use chainmesh::transport::{
    spawn_session, ConnectionId, Dialer, Listener, PeerAddress, TcpDialer, TcpListenerSocket,
    TransportError, TransportEvent,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

// ============================================================================
// ADDRESSES
// ============================================================================

#[test]
fn test_peer_address_parse() {
    let address = PeerAddress::parse("localhost:3000").unwrap();

    assert_eq!(address, PeerAddress::tcp("localhost", 3000));
    assert_eq!(address.to_string(), "localhost:3000");
}

#[test]
fn test_peer_address_parse_rejects_invalid() {
    assert!(matches!(
        PeerAddress::parse("localhost"),
        Err(TransportError::InvalidAddress(_))
    ));
    assert!(PeerAddress::parse("localhost:port").is_err());
    assert!(PeerAddress::parse(":3000").is_err());
}

#[test]
fn test_connection_ids_are_unique() {
    let a = ConnectionId::generate();
    let b = ConnectionId::generate();

    assert_ne!(a, b);
    assert_eq!(a.to_string().len(), 16);
}

#[test]
fn test_retryable_errors() {
    assert!(TransportError::Timeout.is_retryable());
    assert!(TransportError::ConnectionFailed("refused".into()).is_retryable());
    assert!(!TransportError::Closed.is_retryable());
}

// ============================================================================
// LISTEN / DIAL
// ============================================================================

#[tokio::test]
async fn test_bind_random_port() {
    let listener = TcpListenerSocket::bind("127.0.0.1", 0).await.unwrap();
    let address = listener.local_address().unwrap();

    assert_eq!(address.host, "127.0.0.1");
    assert!(address.port > 0);
}

#[tokio::test]
async fn test_dial_refused() {
    let listener = TcpListenerSocket::bind("127.0.0.1", 0).await.unwrap();
    let address = listener.local_address().unwrap();
    drop(listener);

    let result = TcpDialer::new(Duration::from_secs(2)).dial(&address).await;

    assert!(result.is_err());
}

// ============================================================================
// SESSIONS
// ============================================================================

#[tokio::test]
async fn test_session_decodes_lines_and_reports_disconnect() {
    let mut listener = TcpListenerSocket::bind("127.0.0.1", 0).await.unwrap();
    let address = listener.local_address().unwrap();

    let client = tokio::spawn(async move {
        let mut stream = TcpDialer::default().dial(&address).await.unwrap();
        let line = Envelope::new(NodeId::from_string("client"), Message::RequestPeers)
            .to_line()
            .unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"{broken\n").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let (stream, _) = listener.accept().await.unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let id = ConnectionId::generate();
    let _session = spawn_session(stream, id.clone(), 1024, tx);

    match next_event(&mut rx).await {
        TransportEvent::MessageReceived {
            connection_id,
            envelope,
        } => {
            assert_eq!(connection_id, id);
            assert_eq!(envelope.message, Message::RequestPeers);
            assert_eq!(envelope.node, Some(NodeId::from_string("client")));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::DecodeFailed { .. }
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Disconnected { .. }
    ));

    client.await.unwrap();
}

#[tokio::test]
async fn test_session_writes_queued_lines() {
    let mut listener = TcpListenerSocket::bind("127.0.0.1", 0).await.unwrap();
    let address = listener.local_address().unwrap();

    let client = tokio::spawn(async move {
        let stream = TcpDialer::default().dial(&address).await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    });

    let (stream, _) = listener.accept().await.unwrap();
    let (tx, _rx) = mpsc::channel(16);
    let session = spawn_session(stream, ConnectionId::generate(), 1024, tx);
    session.writer.send("queued\n".to_string()).unwrap();

    let line = timeout(WAIT, client).await.unwrap().unwrap();
    assert_eq!(line, "queued\n");
}

#[tokio::test]
async fn test_oversized_line_closes_session() {
    let mut listener = TcpListenerSocket::bind("127.0.0.1", 0).await.unwrap();
    let address = listener.local_address().unwrap();

    let client = tokio::spawn(async move {
        let mut stream = TcpDialer::default().dial(&address).await.unwrap();
        let oversized = format!("{}\n", "x".repeat(256));
        let _ = stream.write_all(oversized.as_bytes()).await;
        stream
    });

    let (stream, _) = listener.accept().await.unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let _session = spawn_session(stream, ConnectionId::generate(), 64, tx);

    match next_event(&mut rx).await {
        TransportEvent::Disconnected { reason, .. } => {
            assert!(reason.contains("too large"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    drop(client.await.unwrap());
}
