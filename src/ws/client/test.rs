use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    task::Poll,
    time::Duration,
};

use base64::Engine as _;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::Instant,
};
use tokio_tungstenite::tungstenite;

use super::*;
use crate::ws::{
    message::{MessageId, NormalizedMessage},
    packet::{ConnAck, Packet, PacketStreamError, Receive, ReceiveAck},
};

/// Client side of an in-memory transport, `outgoing` is dropped on close
#[derive(Debug)]
struct MockTransport {
    incoming: UnboundedReceiver<Result<Packet, PacketStreamError>>,
    outgoing: Option<UnboundedSender<Packet>>,
    encode_fails: Arc<AtomicBool>,
}

impl Stream for MockTransport {
    type Item = Result<Packet, PacketStreamError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.incoming.poll_recv(cx)
    }
}

impl Sink<Packet> for MockTransport {
    type Error = PacketStreamError;

    fn poll_ready(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: std::pin::Pin<&mut Self>, item: Packet) -> Result<(), Self::Error> {
        if self.encode_fails.load(Ordering::SeqCst) {
            return Err(PacketStreamError::EncodePacketFailed {
                type_name: item.type_name().to_string(),
                source: serde_json::from_str::<()>("x").unwrap_err(),
            });
        }

        let gone = || PacketStreamError::PeerClosed {
            reason: "mock peer gone".to_string(),
        };
        self.outgoing
            .as_ref()
            .ok_or_else(gone)?
            .send(item)
            .map_err(|_| gone())
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.outgoing = None;
        Poll::Ready(Ok(()))
    }
}

/// Gateway side of a mock transport
#[derive(Debug)]
struct Peer {
    to_client: Option<UnboundedSender<Result<Packet, PacketStreamError>>>,
    from_client: UnboundedReceiver<Packet>,
    encode_fails: Arc<AtomicBool>,
}

impl Peer {
    /// make client side sends fail with a non-fatal encode error
    fn fail_encoding(&self, fail: bool) {
        self.encode_fails.store(fail, Ordering::SeqCst);
    }

    fn push(&self, item: Result<Packet, PacketStreamError>) {
        self.to_client
            .as_ref()
            .expect("peer already closed")
            .send(item)
            .unwrap();
    }

    fn send(&self, packet: Packet) {
        self.push(Ok(packet));
    }

    /// send a raw frame through the codec, like the websocket sink does
    fn send_frame(&self, frame: serde_json::Value) {
        let data = serde_json::to_vec(&frame).unwrap();
        self.push(Packet::decode(&data).map_err(|source| PacketStreamError::ParsePacketFailed { source }));
    }

    fn ack(&self, reason_code: i64) {
        self.send(Packet::ConnAck(ConnAck {
            time_diff: 0,
            reason_code,
        }));
    }

    async fn next(&mut self) -> Option<Packet> {
        self.from_client.recv().await
    }

    /// simulate socket close from gateway side
    fn close(&mut self) {
        self.to_client = None;
    }
}

fn pair() -> (MockTransport, Peer) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    let encode_fails = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            incoming,
            outgoing: Some(outgoing),
            encode_fails: encode_fails.clone(),
        },
        Peer {
            to_client: Some(to_client),
            from_client,
            encode_fails,
        },
    )
}

#[derive(Debug, Default)]
struct ConnectorInner {
    queued: VecDeque<MockTransport>,
    reject_all: Option<i64>,
    rejected_peers: Vec<Peer>,
    connects: Vec<Instant>,
}

#[derive(Debug, Clone, Default)]
struct MockConnector {
    inner: Arc<Mutex<ConnectorInner>>,
}

impl MockConnector {
    fn rejecting(reason_code: i64) -> Self {
        let connector = Self::default();
        connector.inner.lock().unwrap().reject_all = Some(reason_code);
        connector
    }

    /// next connect will get this transport
    fn push(&self) -> Peer {
        let (transport, peer) = pair();
        self.inner.lock().unwrap().queued.push_back(transport);
        peer
    }

    fn connects(&self) -> Vec<Instant> {
        self.inner.lock().unwrap().connects.clone()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, gateway: &GatewayUrl) -> Result<MockTransport, ConnectGatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connects.push(Instant::now());

        if let Some(reason_code) = inner.reject_all {
            let (transport, peer) = pair();
            peer.ack(reason_code);
            inner.rejected_peers.push(peer);
            return Ok(transport);
        }

        inner.queued.pop_front().ok_or_else(|| ConnectGatewayError {
            url: gateway.to_string(),
            source: tungstenite::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )),
        })
    }
}

#[derive(Debug)]
enum Event {
    Message(NormalizedMessage),
    Connected,
    Disconnected,
    Error { fatal: bool, text: String },
}

struct Recorder(mpsc::UnboundedSender<Event>);

impl Handler for Recorder {
    fn on_message(&self, message: NormalizedMessage) {
        let _ = self.0.send(Event::Message(message));
    }

    fn on_connected(&self) {
        let _ = self.0.send(Event::Connected);
    }

    fn on_disconnected(&self) {
        let _ = self.0.send(Event::Disconnected);
    }

    fn on_error(&self, error: &ClientError) {
        let _ = self.0.send(Event::Error {
            fatal: error.is_fatal(),
            text: error.to_string(),
        });
    }
}

fn options() -> ConnectOptions {
    ConnectOptions::new("ws://gateway.test/ws".parse().unwrap(), "robot", "im-token")
}

fn client(
    connector: MockConnector,
    options: ConnectOptions,
) -> (
    Client<MockConnector>,
    mpsc::UnboundedReceiver<Event>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Client::with_connector(options, connector, Recorder(tx)),
        rx,
    )
}

fn text_payload(content: &str) -> String {
    base64::engine::general_purpose::STANDARD
        .encode(serde_json::json!({"type": 1, "content": content}).to_string())
}

fn receive(id: i64, seq: u64, payload: String) -> Packet {
    Packet::Receive(Receive {
        setting: 0,
        msg_key: format!("key-{}", id),
        from_uid: "u1".to_string(),
        channel_id: None,
        channel_type: None,
        message_id: MessageId::Number(id),
        message_seq: seq,
        timestamp: 1700000000,
        payload,
    })
}

/// connect a client to a fresh mock peer and finish the handshake
async fn connected() -> (
    Client<MockConnector>,
    MockConnector,
    Peer,
    mpsc::UnboundedReceiver<Event>,
) {
    let connector = MockConnector::default();
    let mut peer = connector.push();
    let (mut client, mut events) = client(connector.clone(), options());

    client.connect();

    let connect = peer.next().await.unwrap().into_connect().unwrap();
    assert_eq!(connect.uid, "robot");
    assert_eq!(connect.token, "im-token");
    assert_eq!(client.state(), ConnectionState::AwaitingAck);

    peer.ack(0);
    assert!(matches!(events.recv().await, Some(Event::Connected)));
    assert_eq!(client.state(), ConnectionState::Connected);

    (client, connector, peer, events)
}

#[tokio::test]
async fn test_receive_is_acked_and_delivered() {
    let (mut client, _connector, mut peer, mut events) = connected().await;

    peer.send(receive(42, 1, text_payload("hi")));

    assert_eq!(
        peer.next().await.unwrap(),
        Packet::ReceiveAck(ReceiveAck {
            message_id: MessageId::Number(42),
            message_seq: 1,
        })
    );

    match events.recv().await.unwrap() {
        Event::Message(msg) => {
            assert_eq!(msg.message_id, MessageId::Number(42));
            assert_eq!(msg.message_seq, 1);
            assert_eq!(msg.from_uid, "u1");
            assert_eq!(msg.channel_id, "u1");
            assert_eq!(msg.payload.content(), Some("hi"));
        }
        other => panic!("expect message event, got {:?}", other),
    }

    client.disconnect().await;
}

#[tokio::test]
async fn test_undecodable_payload_is_acked_but_not_delivered() {
    let (mut client, _connector, mut peer, mut events) = connected().await;

    peer.send(receive(43, 2, "not base64 at all!".to_string()));
    peer.send(receive(44, 3, text_payload("after")));

    let ack = peer.next().await.unwrap().into_receive_ack().unwrap();
    assert_eq!(ack.message_id, MessageId::Number(43));
    let ack = peer.next().await.unwrap().into_receive_ack().unwrap();
    assert_eq!(ack.message_id, MessageId::Number(44));

    match events.recv().await.unwrap() {
        Event::Message(msg) => assert_eq!(msg.message_id, MessageId::Number(44)),
        other => panic!("expect message event, got {:?}", other),
    }

    client.disconnect().await;
}

#[tokio::test]
async fn test_receive_without_payload_is_acked_but_not_delivered() {
    let (mut client, _connector, mut peer, mut events) = connected().await;

    peer.send_frame(serde_json::json!({
        "type": 5, "message_id": 42, "message_seq": 1, "from_uid": "u1", "payload": null,
    }));
    peer.send_frame(serde_json::json!({
        "type": 5, "message_id": 43, "message_seq": 2, "from_uid": "u1",
    }));
    peer.send_frame(serde_json::json!({
        "type": 5, "message_id": 44, "message_seq": 3, "payload": text_payload("no sender"),
    }));
    peer.send(receive(45, 4, text_payload("after")));

    for (id, seq) in [(42, 1), (43, 2), (44, 3), (45, 4)] {
        assert_eq!(
            peer.next().await.unwrap(),
            Packet::ReceiveAck(ReceiveAck {
                message_id: MessageId::Number(id),
                message_seq: seq,
            })
        );
    }

    // only the sender-less one still has a decodable payload
    match events.recv().await.unwrap() {
        Event::Message(msg) => assert_eq!(msg.message_id, MessageId::Number(44)),
        other => panic!("expect message event, got {:?}", other),
    }
    match events.recv().await.unwrap() {
        Event::Message(msg) => assert_eq!(msg.message_id, MessageId::Number(45)),
        other => panic!("expect message event, got {:?}", other),
    }
    assert!(events.try_recv().is_err());

    client.disconnect().await;
}

#[tokio::test]
async fn test_corrupt_frame_does_not_break_connection() {
    let (mut client, _connector, mut peer, mut events) = connected().await;

    peer.push(Err(PacketStreamError::NotDataFrame));
    peer.send(Packet::Pong);
    peer.send(receive(1, 1, text_payload("still here")));

    assert!(peer.next().await.unwrap().into_receive_ack().is_ok());
    assert!(matches!(events.recv().await, Some(Event::Message(_))));
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sends_ping_every_interval() {
    let (mut client, _connector, mut peer, _events) = connected().await;
    let start = Instant::now();

    let early = tokio::time::timeout(Duration::from_secs(29), peer.next()).await;
    assert!(early.is_err(), "no ping expected before interval");

    assert_eq!(peer.next().await, Some(Packet::Ping));
    assert_eq!(start.elapsed(), Duration::from_secs(30));

    // pong is not needed for liveness
    assert_eq!(peer.next().await, Some(Packet::Ping));
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_ping_encode_failure_keeps_connection() {
    let (mut client, connector, mut peer, mut events) = connected().await;
    let start = Instant::now();

    peer.fail_encoding(true);
    let missed = tokio::time::timeout(Duration::from_secs(31), peer.next()).await;
    assert!(missed.is_err(), "ping should not reach the gateway");
    assert_eq!(client.state(), ConnectionState::Connected);

    peer.fail_encoding(false);
    assert_eq!(peer.next().await, Some(Packet::Ping));
    assert_eq!(start.elapsed(), Duration::from_secs(60));

    assert_eq!(connector.connects().len(), 1);
    assert!(events.try_recv().is_err());

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_handshake_gives_up_after_max_attempts() {
    let connector = MockConnector::rejecting(1);
    let (mut client, mut events) = client(connector.clone(), options());

    client.connect();

    let mut errors = 0;
    loop {
        match events.recv().await.unwrap() {
            Event::Error { fatal: true, text } => {
                assert!(text.contains("max reconnect attempts"), "{}", text);
                break;
            }
            Event::Error { fatal: false, text } => {
                assert!(text.contains("reason code 1"), "{}", text);
                errors += 1;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    let connects = connector.connects();
    assert_eq!(errors, 21);
    assert_eq!(connects.len(), 21);

    let config = ReconnectConfig::default();
    for (n, pair) in connects.windows(2).enumerate() {
        assert_eq!(
            pair[1] - pair[0],
            config.delay_for_attempt(n as u32),
            "delay before attempt {}",
            n + 1
        );
    }

    // no more attempts after giving up
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.connects().len(), 21);
    assert!(events.try_recv().is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_refused_retries_with_backoff() {
    let connector = MockConnector::default();
    let mut options = options();
    options.reconnect.max_attempts = 2;
    let (mut client, mut events) = client(connector.clone(), options);

    client.connect();

    let mut fatal = 0;
    let mut errors = 0;
    while let Some(event) = events.recv().await {
        match event {
            Event::Error { fatal: true, .. } => {
                fatal += 1;
                break;
            }
            Event::Error { fatal: false, text } => {
                assert!(text.contains("connect ws gateway failed"), "{}", text);
                errors += 1;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert_eq!(errors, 3);
    assert_eq!(fatal, 1);

    let connects = connector.connects();
    assert_eq!(connects.len(), 3);
    assert_eq!(connects[1] - connects[0], Duration::from_secs(1));
    assert_eq!(connects[2] - connects[1], Duration::from_secs(2));

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout_is_retried() {
    let connector = MockConnector::default();
    let mut silent = connector.push();
    let mut peer = connector.push();
    let (mut client, mut events) = client(connector.clone(), options());

    client.connect();

    assert!(silent.next().await.unwrap().as_connect().is_some());
    match events.recv().await.unwrap() {
        Event::Error { fatal: false, text } => assert!(text.contains("timeout"), "{}", text),
        other => panic!("unexpected event {:?}", other),
    }

    assert!(peer.next().await.unwrap().as_connect().is_some());
    peer.ack(0);
    assert!(matches!(events.recv().await, Some(Event::Connected)));

    let connects = connector.connects();
    assert_eq!(
        connects[1] - connects[0],
        DEFAULT_HANDSHAKE_TIMEOUT + DEFAULT_RECONNECT_BASE_DELAY
    );

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_connection_lost_reconnects() {
    let (mut client, connector, mut peer, mut events) = connected().await;
    let mut next_peer = connector.push();

    peer.close();

    assert!(matches!(events.recv().await, Some(Event::Disconnected)));
    match events.recv().await.unwrap() {
        Event::Error { fatal: false, text } => assert!(text.contains("closed"), "{}", text),
        other => panic!("unexpected event {:?}", other),
    }

    assert!(next_peer.next().await.unwrap().as_connect().is_some());
    next_peer.ack(0);
    assert!(matches!(events.recv().await, Some(Event::Connected)));

    let connects = connector.connects();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1] - connects[0], Duration::from_secs(1));

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_never_reconnects() {
    let (mut client, connector, mut peer, mut events) = connected().await;

    client.disconnect().await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(events.recv().await, Some(Event::Disconnected)));

    // transport was closed by client
    assert_eq!(peer.next().await, None);

    // late close from gateway side
    peer.close();
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(connector.connects().len(), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let connector = MockConnector::default();
    let (mut client, mut events) = client(connector.clone(), options());

    client.connect();
    assert!(matches!(
        events.recv().await,
        Some(Event::Error { fatal: false, .. })
    ));

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.connects().len(), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_connect_twice_runs_one_driver() {
    let connector = MockConnector::default();
    let mut peer = connector.push();
    let (mut client, mut events) = client(connector.clone(), options());

    client.connect();
    client.connect();

    assert!(peer.next().await.unwrap().as_connect().is_some());
    peer.ack(0);
    assert!(matches!(events.recv().await, Some(Event::Connected)));
    assert_eq!(connector.connects().len(), 1);

    client.disconnect().await;
    client.disconnect().await;
}

#[tokio::test]
async fn test_websocket_end_to_end() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let connect: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(connect["type"], 1);
        assert_eq!(connect["uid"], "robot");

        ws.send(tungstenite::Message::Text(
            r#"{"type":2,"time_diff":0,"reason_code":0}"#.to_string(),
        ))
        .await
        .unwrap();

        let recv = serde_json::json!({
            "type": 5,
            "setting": 0,
            "msg_key": "k",
            "from_uid": "u1",
            "message_id": 42,
            "message_seq": 1,
            "timestamp": 1700000000,
            "payload": text_payload("hi"),
        });
        ws.send(tungstenite::Message::Text(recv.to_string()))
            .await
            .unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let ack: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(
            ack,
            serde_json::json!({"type": 6, "message_id": 42, "message_seq": 1})
        );

        // wait client close
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
        }
    });

    let options = ConnectOptions::new(
        format!("ws://{}/", addr).parse().unwrap(),
        "robot",
        "im-token",
    );
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut client = Client::new(options, Recorder(tx));

    client.connect();

    assert!(matches!(events.recv().await, Some(Event::Connected)));
    match events.recv().await.unwrap() {
        Event::Message(msg) => assert_eq!(msg.payload.content(), Some("hi")),
        other => panic!("expect message event, got {:?}", other),
    }

    client.disconnect().await;
    server.await.unwrap();
}
