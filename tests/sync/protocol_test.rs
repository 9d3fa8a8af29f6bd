// Protocol Tests
// Tests for the line-delimited JSON envelope

use chainmesh::chain::Block;
use chainmesh::sync::{Envelope, Message, MessageType, NodeId, PeerCount, ProtocolError};

fn envelope(message: Message) -> Envelope {
    Envelope::new(NodeId::from_string("node-a"), message)
}

// ============================================================================
// MESSAGE TYPES
// ============================================================================

#[test]
fn test_message_type_tags() {
    let tags = [
        (MessageType::RequestLatestBlock, "REQUEST_LATEST_BLOCK"),
        (MessageType::ReceiveLatestBlock, "RECEIVE_LATEST_BLOCK"),
        (MessageType::RequestBlockchain, "REQUEST_BLOCKCHAIN"),
        (MessageType::ReceiveBlockchain, "RECEIVE_BLOCKCHAIN"),
        (MessageType::RequestPeers, "REQUEST_PEERS"),
        (MessageType::ReceivePeers, "RECEIVE_PEERS"),
    ];

    for (kind, tag) in tags {
        assert_eq!(kind.as_str(), tag);
        assert_eq!(MessageType::from_tag(tag), Some(kind));
    }
    assert_eq!(MessageType::from_tag("request_latest_block"), None);
}

#[test]
fn test_expected_replies() {
    assert_eq!(
        MessageType::RequestBlockchain.expected_reply(),
        Some(MessageType::ReceiveBlockchain)
    );
    assert_eq!(
        MessageType::RequestPeers.expected_reply(),
        Some(MessageType::ReceivePeers)
    );
    assert_eq!(MessageType::ReceiveLatestBlock.expected_reply(), None);
}

// ============================================================================
// ENCODING
// ============================================================================

#[test]
fn test_line_is_newline_terminated_single_line() {
    let line = envelope(Message::ReceiveBlockchain(vec![Block::genesis()]))
        .to_line()
        .unwrap();

    assert!(line.ends_with('\n'));
    assert_eq!(line.matches('\n').count(), 1);
}

#[test]
fn test_receive_peers_payload_shape() {
    let text = envelope(Message::peers(3)).encode().unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(json["type"], "RECEIVE_PEERS");
    assert_eq!(json["data"]["nodes"], 3);
    assert_eq!(json["node"], "node-a");
}

#[test]
fn test_receive_blockchain_payload_is_array() {
    let text = envelope(Message::ReceiveBlockchain(vec![Block::genesis()]))
        .encode()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert!(json["data"].is_array());
    assert_eq!(json["data"][0]["data"], "-- genesis block --");
}

// ============================================================================
// DECODING
// ============================================================================

#[test]
fn test_decode_foreign_latest_block() {
    let text = r#"{"type":"RECEIVE_LATEST_BLOCK","data":{"index":0,"previousHash":"0","timestamp":1506816000,"data":"-- genesis block --","hash":"000dc75a315c77a1f9c98fb6247d03dd18ac52632d7dc6a9920261d8109b37cf","nonce":0}}"#;
    let decoded = Envelope::decode(text).unwrap();

    assert_eq!(decoded.message, Message::ReceiveLatestBlock(Block::genesis()));
    assert!(decoded.node.is_none());
}

#[test]
fn test_decode_keeps_sender_node() {
    let decoded = Envelope::decode(r#"{"type":"REQUEST_PEERS","node":"n9"}"#).unwrap();

    assert_eq!(decoded.message, Message::RequestPeers);
    assert_eq!(decoded.node, Some(NodeId::from_string("n9")));
}

#[test]
fn test_decode_round_trip_peers() {
    let original = envelope(Message::ReceivePeers(PeerCount { nodes: 7 }));

    assert_eq!(Envelope::decode(&original.encode().unwrap()).unwrap(), original);
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(matches!(
        Envelope::decode("not json"),
        Err(ProtocolError::Malformed(_))
    ));
    assert!(matches!(
        Envelope::decode(r#"{"data":1}"#),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_decode_missing_payload() {
    assert!(matches!(
        Envelope::decode(r#"{"type":"RECEIVE_LATEST_BLOCK"}"#),
        Err(ProtocolError::MissingPayload(MessageType::ReceiveLatestBlock))
    ));
}

#[test]
fn test_decode_invalid_payload() {
    assert!(matches!(
        Envelope::decode(r#"{"type":"RECEIVE_BLOCKCHAIN","data":{"index":0}}"#),
        Err(ProtocolError::InvalidPayload { .. })
    ));
}

#[test]
fn test_unknown_type_decodes() {
    let decoded = Envelope::decode(r#"{"type":"HELLO"}"#).unwrap();

    assert_eq!(decoded.message, Message::Unknown("HELLO".to_string()));
    assert_eq!(decoded.message.tag(), "HELLO");
    assert_eq!(decoded.message.message_type(), None);
}

#[test]
fn test_fractional_timestamp_is_invalid_payload() {
    let text = r#"{"type":"RECEIVE_LATEST_BLOCK","data":{"index":1,"previousHash":"0","timestamp":1506816000.5,"data":"x","hash":"00","nonce":0}}"#;

    assert!(matches!(
        Envelope::decode(text),
        Err(ProtocolError::InvalidPayload {
            kind: MessageType::ReceiveLatestBlock,
            ..
        })
    ));
}
