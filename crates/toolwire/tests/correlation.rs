//! Client-side correlation and session tests against a scripted peer.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

use toolwire::{
    Channel, ClientCapabilities, ClientConfig, McpClient, McpError, Phase, ServerCapabilities,
    MCP_VERSION,
};

// ─────────────────────── helpers ───────────────────────

/// The far end of an in-memory pipe, driven by hand.
struct FakePeer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakePeer {
    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("peer timed out waiting for a frame")
            .unwrap()
            .expect("client closed the channel");
        serde_json::from_str(&line).unwrap()
    }

    async fn send_raw(&mut self, frame: &str) {
        self.writer.write_all(frame.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn reply(&mut self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    async fn accept_handshake(&mut self, version: &str) {
        let init = self.recv().await;
        assert_eq!(init["method"], "initialize");
        assert_eq!(init["params"]["protocolVersion"], MCP_VERSION);
        self.reply(
            &init,
            json!({
                "protocolVersion": version,
                "capabilities": {},
                "serverInfo": {"name": "fake-server", "version": "0.0.1"}
            }),
        )
        .await;
        let initialized = self.recv().await;
        assert_eq!(initialized["method"], "initialized");
        assert!(initialized.get("id").is_none());
    }
}

fn config() -> ClientConfig {
    ClientConfig::default().with_call_timeout(Duration::from_secs(5))
}

fn connected_pair() -> (McpClient, FakePeer) {
    let (client_side, peer_side) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(client_side);
    let client = McpClient::open(Channel::from_streams(reader, writer), config());

    let (peer_reader, peer_writer) = tokio::io::split(peer_side);
    let peer = FakePeer {
        lines: BufReader::new(peer_reader).lines(),
        writer: peer_writer,
    };
    (client, peer)
}

async fn ready_pair() -> (McpClient, FakePeer) {
    let (client, mut peer) = connected_pair();
    let (result, _) = tokio::join!(
        client.handshake(ClientCapabilities::default()),
        peer.accept_handshake(MCP_VERSION)
    );
    result.unwrap();
    (client, peer)
}

// ═══════════════════════════════════════════════════════
// HANDSHAKE
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_call_before_handshake_is_not_ready() {
    let (client, _peer) = connected_pair();
    let err = client
        .call_tool("get_weather", json!({"city": "Mumbai"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::NotReady(_)), "got {err}");
    assert_eq!(client.phase().await, Phase::Uninitialized);
}

#[tokio::test]
async fn test_handshake_records_server() {
    let (client, _peer) = ready_pair().await;
    assert_eq!(client.phase().await, Phase::Ready);

    let session = client.session().await;
    assert_eq!(session.protocol_version(), Some(MCP_VERSION));
    assert_eq!(session.peer_info().map(|i| i.name.as_str()), Some("fake-server"));

    let server = client.server().await.unwrap();
    assert_eq!(server.capabilities, ServerCapabilities::default());
}

#[tokio::test]
async fn test_handshake_twice_is_already_initialized() {
    let (client, _peer) = ready_pair().await;
    let err = client
        .handshake(ClientCapabilities::default())
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::AlreadyInitialized));
    assert_eq!(client.phase().await, Phase::Ready);
}

#[tokio::test]
async fn test_error_response_to_initialize_is_rejected() {
    let (client, mut peer) = connected_pair();
    let peer_side = async {
        let init = peer.recv().await;
        peer.send(json!({
            "jsonrpc": "2.0",
            "id": init["id"],
            "error": {"code": -32602, "message": "bad client info"}
        }))
        .await;
    };
    let (result, _) = tokio::join!(client.handshake(ClientCapabilities::default()), peer_side);

    let err = result.unwrap_err();
    assert!(matches!(err, McpError::HandshakeRejected(ref r) if r.contains("bad client info")));
    assert_eq!(client.phase().await, Phase::Closed);
}

#[tokio::test]
async fn test_unsupported_version_is_rejected() {
    let (client, mut peer) = connected_pair();
    let peer_side = async {
        let init = peer.recv().await;
        peer.reply(
            &init,
            json!({"protocolVersion": "1999-01-01", "capabilities": {}}),
        )
        .await;
    };
    let (result, _) = tokio::join!(client.handshake(ClientCapabilities::default()), peer_side);

    assert!(matches!(result, Err(McpError::HandshakeRejected(ref r)) if r.contains("1999-01-01")));
    let err = client.call("tools/list", None, None).await.unwrap_err();
    assert!(matches!(err, McpError::SessionClosed));
}

#[tokio::test]
async fn test_ping_allowed_before_handshake() {
    let (client, mut peer) = connected_pair();
    let peer_side = async {
        let ping = peer.recv().await;
        assert_eq!(ping["method"], "ping");
        peer.reply(&ping, json!({})).await;
    };
    let (result, _) = tokio::join!(client.ping(), peer_side);
    result.unwrap();
    assert_eq!(client.phase().await, Phase::Uninitialized);
}

// ═══════════════════════════════════════════════════════
// CORRELATION
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_tool_call_result() {
    let (client, mut peer) = ready_pair().await;
    let peer_side = async {
        let call = peer.recv().await;
        assert_eq!(call["method"], "tools/call");
        assert_eq!(call["params"]["name"], "get_weather");
        assert_eq!(call["params"]["arguments"]["city"], "Mumbai");
        peer.reply(
            &call,
            json!({
                "content": [{"type": "text", "text": "{\"location\":\"Mumbai, India\"}"}],
                "structuredContent": {"location": "Mumbai, India"}
            }),
        )
        .await;
    };
    let (result, _) = tokio::join!(
        client.call_tool("get_weather", json!({"city": "Mumbai"}), None),
        peer_side
    );
    let result = result.unwrap();
    assert!(!result.is_error());
    assert!(result.payload()["location"]
        .as_str()
        .unwrap()
        .contains("Mumbai"));
}

#[tokio::test]
async fn test_responses_in_reverse_order() {
    let (client, mut peer) = ready_pair().await;
    let peer_side = async {
        let first = peer.recv().await;
        let second = peer.recv().await;
        assert_ne!(first["id"], second["id"]);
        peer.reply(&second, json!({"method": second["method"]})).await;
        peer.reply(&first, json!({"method": first["method"]})).await;
    };
    let (a, b, _) = tokio::join!(
        client.call("alpha", None, None),
        client.call("beta", None, None),
        peer_side
    );
    assert_eq!(a.unwrap()["method"], "alpha");
    assert_eq!(b.unwrap()["method"], "beta");
}

#[tokio::test]
async fn test_call_timeout_discards_late_response() {
    let (client, mut peer) = ready_pair().await;

    let slow = async {
        client
            .call("slow", None, Some(Duration::from_millis(100)))
            .await
    };
    let peer_side = async {
        let request = peer.recv().await;
        assert_eq!(request["method"], "slow");
        request
    };
    let (outcome, slow_request) = tokio::join!(slow, peer_side);
    match outcome {
        Err(McpError::CallTimeout { method, timeout }) => {
            assert_eq!(method, "slow");
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected CallTimeout, got {other:?}"),
    }

    // The late answer is dropped and the session keeps working.
    peer.reply(&slow_request, json!({"late": true})).await;
    let peer_side = async {
        let request = peer.recv().await;
        peer.reply(&request, json!({"late": false})).await;
    };
    let (next, _) = tokio::join!(client.call("fast", None, None), peer_side);
    assert_eq!(next.unwrap(), json!({"late": false}));
    assert_eq!(client.phase().await, Phase::Ready);
}

#[tokio::test]
async fn test_timeout_leaves_other_call_in_flight() {
    let (client, mut peer) = ready_pair().await;

    let short = client.call("slow", None, Some(Duration::from_millis(100)));
    let long = client.call("steady", None, Some(Duration::from_secs(5)));
    let peer_side = async {
        let first = peer.recv().await;
        let second = peer.recv().await;
        let (slow, steady) = if first["method"] == "slow" {
            (first, second)
        } else {
            (second, first)
        };
        assert_eq!(steady["method"], "steady");

        // Answer only after the short call has given up.
        tokio::time::sleep(Duration::from_millis(300)).await;
        peer.reply(&steady, json!({"steady": true})).await;
        peer.reply(&slow, json!({"late": true})).await;
    };
    let (short, long, _) = tokio::join!(short, long, peer_side);

    assert!(
        matches!(short, Err(McpError::CallTimeout { ref method, .. }) if method == "slow"),
        "got {short:?}"
    );
    assert_eq!(long.unwrap(), json!({"steady": true}));
    assert_eq!(client.pending_count().await, 0);
    assert_eq!(client.phase().await, Phase::Ready);
}

#[tokio::test]
async fn test_remote_error_keeps_code() {
    let (client, mut peer) = ready_pair().await;
    let peer_side = async {
        let call = peer.recv().await;
        peer.send(json!({
            "jsonrpc": "2.0",
            "id": call["id"],
            "error": {"code": -32803, "message": "Tool not found: nope"}
        }))
        .await;
    };
    let (result, _) = tokio::join!(client.call_tool("nope", json!({}), None), peer_side);
    match result {
        Err(McpError::RemoteError { code, message, .. }) => {
            assert_eq!(code, -32803);
            assert_eq!(message, "Tool not found: nope");
        }
        other => panic!("expected RemoteError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_and_unmatched_frames_are_dropped() {
    let (client, mut peer) = ready_pair().await;
    let peer_side = async {
        let call = peer.recv().await;
        peer.send_raw("Downloading weather data...").await;
        peer.send_raw(r#"{"jsonrpc":"1.0","id":1,"result":{}}"#).await;
        peer.send(json!({"jsonrpc": "2.0", "id": 9999, "result": {"stray": true}}))
            .await;
        peer.reply(&call, json!({"ok": true})).await;
    };
    let (result, _) = tokio::join!(client.call("tools/list", None, None), peer_side);
    assert_eq!(result.unwrap(), json!({"ok": true}));
    assert_eq!(client.phase().await, Phase::Ready);
}

#[tokio::test]
async fn test_server_ping_is_answered() {
    let (client, mut peer) = connected_pair();

    // Allowed before the handshake as well.
    peer.send(json!({"jsonrpc": "2.0", "id": "early", "method": "ping"}))
        .await;
    assert_eq!(
        peer.recv().await,
        json!({"jsonrpc": "2.0", "id": "early", "result": {}})
    );

    let (result, _) = tokio::join!(
        client.handshake(ClientCapabilities::default()),
        peer.accept_handshake(MCP_VERSION)
    );
    result.unwrap();

    peer.send(json!({"jsonrpc": "2.0", "id": 99, "method": "ping"}))
        .await;
    assert_eq!(
        peer.recv().await,
        json!({"jsonrpc": "2.0", "id": 99, "result": {}})
    );

    // Anything else the client has no answer for.
    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 100,
        "method": "sampling/createMessage",
        "params": {}
    }))
    .await;
    let reply = peer.recv().await;
    assert_eq!(reply["id"], 100);
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn test_notifications_reach_handler() {
    let (client, mut peer) = ready_pair().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client
        .on_notification(move |n| {
            let _ = tx.send(n);
        })
        .await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "method": "notifications/message",
        "params": {"level": "info", "data": "warming up"}
    }))
    .await;

    let note = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(note.method, "notifications/message");
    assert_eq!(note.params.unwrap()["data"], "warming up");
}

// ═══════════════════════════════════════════════════════
// CLOSURE
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_peer_gone_fails_pending_then_session_closed() {
    let (client, mut peer) = ready_pair().await;
    let peer_side = async move {
        let call = peer.recv().await;
        assert_eq!(call["method"], "tools/call");
        drop(peer);
    };
    let (result, _) = tokio::join!(
        client.call_tool("get_weather", json!({"city": "Pune"}), None),
        peer_side
    );
    assert!(matches!(result, Err(McpError::ChannelClosed)), "got {result:?}");

    let err = client
        .call_tool("get_weather", json!({"city": "Pune"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::SessionClosed));
    assert_eq!(client.phase().await, Phase::Closed);
}

#[tokio::test]
async fn test_disconnect_closes_session() {
    let (client, mut peer) = ready_pair().await;
    client.disconnect().await;
    client.disconnect().await;

    assert_eq!(client.phase().await, Phase::Closed);
    let next = tokio::time::timeout(Duration::from_secs(5), peer.lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert!(next.is_none(), "peer should see end of stream");
    assert!(matches!(client.ping().await, Err(McpError::SessionClosed)));
}
