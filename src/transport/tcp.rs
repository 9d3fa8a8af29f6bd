// TCP Transport Implementation
// Listening/dialing over TCP and the per-session read and write loops
//
// Framing is one JSON envelope per '\n'-terminated line. Each session runs a
// reader task (decode, report events) and a writer task (drain the outbound
// channel); dropping the outbound sender ends the writer.

use crate::sync::Envelope;
use crate::transport::{ConnectionId, Dialer, Listener, PeerAddress, TransportError, TransportEvent};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

// ============================================================================
// LISTENER
// ============================================================================

/// A bound TCP listener; accepted streams have TCP_NODELAY set
pub struct TcpListenerSocket {
    listener: TcpListener,
}

impl TcpListenerSocket {
    /// Bind to `address:port` (port 0 picks a free port)
    pub async fn bind(address: &str, port: u16) -> Result<Self, TransportError> {
        let bind_addr = format!("{}:{}", address, port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }
}

#[async_trait]
impl Listener for TcpListenerSocket {
    type Stream = TcpStream;

    async fn accept(&mut self) -> Result<(TcpStream, PeerAddress), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;
        stream.set_nodelay(true).ok();
        Ok((stream, addr.into()))
    }

    fn local_address(&self) -> Result<PeerAddress, TransportError> {
        Ok(self.listener.local_addr()?.into())
    }
}

// ============================================================================
// DIALER
// ============================================================================

/// Opens TCP connections with a connect timeout
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, address: &PeerAddress) -> Result<TcpStream, TransportError> {
        let addr_str = address.to_string();
        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr_str))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

// ============================================================================
// SESSIONS
// ============================================================================

/// Handles of a running session
pub struct Session {
    pub connection_id: ConnectionId,
    /// Outbound lines; dropping every clone closes the write side
    pub writer: mpsc::UnboundedSender<String>,
    pub reader_task: JoinHandle<()>,
    pub writer_task: JoinHandle<()>,
}

impl Session {
    /// Stop both tasks
    pub fn abort(&self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// Split a stream into reader and writer tasks.
///
/// Decoded envelopes, decode failures and the final disconnect are reported
/// on `events`. A line longer than `max_message_bytes` ends the session.
pub fn spawn_session<S>(
    stream: S,
    connection_id: ConnectionId,
    max_message_bytes: usize,
    events: mpsc::Sender<TransportEvent>,
) -> Session
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (write_tx, write_rx) = mpsc::unbounded_channel::<String>();

    let reader_task = tokio::spawn(read_loop(
        reader,
        connection_id.clone(),
        max_message_bytes,
        events,
    ));
    let writer_task = tokio::spawn(write_loop(writer, connection_id.clone(), write_rx));

    Session {
        connection_id,
        writer: write_tx,
        reader_task,
        writer_task,
    }
}

/// Read one line of at most `limit` bytes (newline excluded).
///
/// Returns `Ok(None)` on a clean close.
pub async fn read_line_bounded<R>(
    reader: &mut BufReader<R>,
    line: &mut String,
    limit: usize,
) -> Result<Option<()>, TransportError>
where
    R: AsyncRead + Unpin,
{
    line.clear();
    let cap = limit.saturating_add(1) as u64;
    let n = reader.take(cap).read_line(line).await?;

    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') && n > limit {
        return Err(TransportError::MessageTooLarge { size: n, limit });
    }
    Ok(Some(()))
}

async fn read_loop<R>(
    reader: R,
    connection_id: ConnectionId,
    limit: usize,
    events: mpsc::Sender<TransportEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let reason = loop {
        match read_line_bounded(&mut reader, &mut line, limit).await {
            Ok(None) => break "Connection closed".to_string(),
            Ok(Some(())) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }

                let event = match Envelope::decode(text) {
                    Ok(envelope) => TransportEvent::MessageReceived {
                        connection_id: connection_id.clone(),
                        envelope,
                    },
                    Err(e) => {
                        warn!(peer = %connection_id, error = %e, "dropping undecodable message");
                        TransportEvent::DecodeFailed {
                            connection_id: connection_id.clone(),
                            error: e.to_string(),
                        }
                    }
                };

                if events.send(event).await.is_err() {
                    // Receiver gone: the node is shutting down
                    return;
                }
            }
            Err(e) => {
                warn!(peer = %connection_id, error = %e, "session read failed");
                break e.to_string();
            }
        }
    };

    debug!(peer = %connection_id, reason = %reason, "session reader finished");
    let _ = events
        .send(TransportEvent::Disconnected {
            connection_id,
            reason,
        })
        .await;
}

async fn write_loop<W>(mut writer: W, connection_id: ConnectionId, mut lines: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(peer = %connection_id, error = %e, "session write failed");
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}
