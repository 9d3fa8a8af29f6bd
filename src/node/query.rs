// One-shot query against a running node

use crate::node::config::DEFAULT_MAX_MESSAGE_BYTES;
use crate::node::runtime::NodeError;
use crate::sync::{Envelope, Message, MessageType, NodeId};
use crate::transport::{read_line_bounded, Dialer, PeerAddress, TcpDialer, TransportError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};
use tracing::debug;

/// Send one request to `address` and wait for its reply.
///
/// Unrelated traffic (such as the remote's own REQUEST_LATEST_BLOCK) is
/// skipped. `timeout` bounds both the connect and the wait for the reply.
pub async fn query(
    address: &PeerAddress,
    message: Message,
    timeout: Duration,
) -> Result<Envelope, NodeError> {
    let expected = message
        .message_type()
        .and_then(|kind| kind.expected_reply())
        .ok_or_else(|| NodeError::NoReply(message.tag().to_string()))?;

    let stream = TcpDialer::new(timeout).dial(address).await?;
    let (reader, mut writer) = tokio::io::split(stream);

    let line = Envelope::new(NodeId::generate(), message).to_line()?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(TransportError::from)?;
    writer.flush().await.map_err(TransportError::from)?;

    let mut reader = BufReader::new(reader);
    let reply = tokio::time::timeout(timeout, read_reply(&mut reader, expected))
        .await
        .map_err(|_| TransportError::Timeout)??;

    let _ = writer.shutdown().await;
    Ok(reply)
}

async fn read_reply<R>(reader: &mut BufReader<R>, expected: MessageType) -> Result<Envelope, NodeError>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        if read_line_bounded(reader, &mut line, DEFAULT_MAX_MESSAGE_BYTES)
            .await?
            .is_none()
        {
            return Err(TransportError::Closed.into());
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match Envelope::decode(text) {
            Ok(envelope) if envelope.message.message_type() == Some(expected) => {
                return Ok(envelope)
            }
            Ok(envelope) => {
                debug!(message = %envelope.message.tag(), "skipping unrelated message");
            }
            Err(e) => {
                debug!(error = %e, "skipping undecodable message");
            }
        }
    }
}
