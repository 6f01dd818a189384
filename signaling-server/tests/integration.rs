use std::net::TcpListener;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gant_meet_protocol::{IceCandidate, PeerId, RoomId, SessionDescription, SignalMessage, Target};
use gant_meet_signaling_server::relay::{Relay, RelaySettings};
use gant_meet_signaling_server::router::{self, ServerState};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const QUIET_PERIOD: Duration = Duration::from_millis(200);

struct Client {
    id: PeerId,
    socket: Socket,
}

impl Client {
    async fn connect(port: u16) -> Self {
        let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .expect("relay is not reachable");
        let id = match next_message(&mut socket).await {
            Some(SignalMessage::Welcome { peer_id }) => peer_id,
            other => panic!("expected welcome, got {other:?}"),
        };
        Self { id, socket }
    }

    async fn send(&mut self, message: &SignalMessage) {
        self.socket
            .send(Message::Text(message.encode().unwrap()))
            .await
            .unwrap();
    }

    async fn join(&mut self, room: &str) {
        self.send(&SignalMessage::Join {
            room_id: RoomId::parse(room).unwrap(),
            secret: None,
        })
        .await;
    }

    async fn receive(&mut self) -> Option<SignalMessage> {
        tokio::time::timeout(QUIET_PERIOD, next_message(&mut self.socket))
            .await
            .ok()
            .flatten()
    }
}

async fn next_message(socket: &mut Socket) -> Option<SignalMessage> {
    while let Some(frame) = socket.next().await {
        match frame.ok()? {
            Message::Text(text) => return Some(SignalMessage::decode(&text).unwrap()),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

fn start_relay(settings: RelaySettings) -> (Relay, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let relay = Relay::new(settings);
    let routing = router::create(ServerState::new(relay.clone()));
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(routing.into_make_service());
    tokio::spawn(server);

    (relay, port)
}

#[tokio::test]
async fn negotiation_messages_are_routed_between_room_members() {
    let (_relay, port) = start_relay(RelaySettings::default());
    let mut x = Client::connect(port).await;
    let mut y = Client::connect(port).await;

    x.join("room-42").await;
    assert_eq!(x.receive().await, None);
    y.join("room-42").await;
    assert_eq!(y.receive().await, Some(SignalMessage::OtherUser { peer_id: x.id }));

    y.send(&SignalMessage::Offer {
        target: Target::Peer(x.id),
        caller: None,
        sdp: SessionDescription::offer("v=0 offer-y"),
        tracks: Vec::new(),
        renegotiate: false,
    })
    .await;
    match x.receive().await {
        Some(SignalMessage::Offer { caller, sdp, .. }) => {
            assert_eq!(caller, Some(y.id));
            assert_eq!(sdp, SessionDescription::offer("v=0 offer-y"));
        }
        other => panic!("expected offer, got {other:?}"),
    }

    x.send(&SignalMessage::Answer {
        target: y.id,
        caller: None,
        sdp: SessionDescription::answer("v=0 answer-x"),
        tracks: Vec::new(),
    })
    .await;
    assert!(matches!(
        y.receive().await,
        Some(SignalMessage::Answer { caller: Some(caller), .. }) if caller == x.id
    ));

    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 2130706431 10.0.0.2 5000 typ host".to_owned(),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
    };
    y.send(&SignalMessage::IceCandidate {
        target: x.id,
        sender: None,
        candidate: candidate.clone(),
    })
    .await;
    assert_eq!(
        x.receive().await,
        Some(SignalMessage::IceCandidate {
            target: x.id,
            sender: Some(y.id),
            candidate,
        })
    );
}

#[tokio::test]
async fn third_peer_is_admitted_without_notification() {
    let (relay, port) = start_relay(RelaySettings::default());
    let mut x = Client::connect(port).await;
    let mut y = Client::connect(port).await;
    let mut z = Client::connect(port).await;

    x.join("room-42").await;
    assert_eq!(x.receive().await, None);
    y.join("room-42").await;
    assert!(matches!(y.receive().await, Some(SignalMessage::OtherUser { .. })));
    z.join("room-42").await;

    assert_eq!(z.receive().await, None);
    let members = relay.room_members(&RoomId::parse("room-42").unwrap()).await;
    assert_eq!(members.len(), 3);
    assert!(members.contains(&z.id));
}

#[tokio::test]
async fn disconnected_peer_leaves_its_room() {
    let (relay, port) = start_relay(RelaySettings::default());
    let mut x = Client::connect(port).await;
    let mut y = Client::connect(port).await;
    x.join("room-42").await;
    assert_eq!(x.receive().await, None);

    x.socket.close(None).await.unwrap();
    assert_eq!(y.receive().await, None);

    assert!(relay
        .room_members(&RoomId::parse("room-42").unwrap())
        .await
        .is_empty());
    y.join("room-42").await;
    assert_eq!(y.receive().await, None);
}

#[tokio::test]
async fn malformed_frames_do_not_close_the_connection() {
    let (_relay, port) = start_relay(RelaySettings::default());
    let mut x = Client::connect(port).await;
    let mut y = Client::connect(port).await;

    x.socket
        .send(Message::Text(r#"{"type":"teleport"}"#.to_owned()))
        .await
        .unwrap();
    x.join("room-42").await;
    assert_eq!(x.receive().await, None);
    y.join("room-42").await;

    assert_eq!(y.receive().await, Some(SignalMessage::OtherUser { peer_id: x.id }));
}
