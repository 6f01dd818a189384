use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use gant_meet_protocol::{PeerId, RoomId, SignalMessage, Target};
use log::{debug, info, warn};
use tokio::sync::{mpsc, RwLock};

use crate::registry::RoomRegistry;

/// Queue of messages waiting to be written to one peer's socket.
pub type Outbox = mpsc::UnboundedSender<SignalMessage>;
pub type Connections = Arc<RwLock<HashMap<PeerId, Outbox>>>;

/// Admission rules applied on `join`.
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    /// Shared secret a joining peer has to present, `None` admits everybody
    pub access_secret: Option<String>,
    /// Largest room allowed, `None` means no limit
    pub room_capacity: Option<usize>,
}

/// Routes signaling messages between peers sharing a room.
///
/// Holds no call state, only who is connected and which room each peer is in.
/// Cheap to clone, all clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct Relay {
    connections: Connections,
    rooms: Arc<RwLock<RoomRegistry>>,
    settings: Arc<RelaySettings>,
}

impl Relay {
    #[must_use]
    pub fn new(settings: RelaySettings) -> Self {
        Self::with_registry(settings, RoomRegistry::new())
    }

    #[must_use]
    pub fn with_registry(settings: RelaySettings, registry: RoomRegistry) -> Self {
        Self {
            connections: Connections::default(),
            rooms: Arc::new(RwLock::new(registry)),
            settings: Arc::new(settings),
        }
    }

    /// Register a new connection and greet it with its identifier.
    pub async fn connect(&self, outbox: Outbox) -> PeerId {
        let peer_id = PeerId::random();
        if outbox.send(SignalMessage::Welcome { peer_id }).is_err() {
            warn!("peer {peer_id} went away before it was greeted");
        }
        self.connections.write().await.insert(peer_id, outbox);
        peer_id
    }

    /// Forget a connection and drop it from its room.
    /// Remaining members are not told, they notice through their own connectivity checks.
    pub async fn disconnect(&self, peer_id: PeerId) {
        if let Some(room_id) = self.rooms.write().await.disconnect(peer_id) {
            info!("peer {peer_id} left room {room_id} by disconnecting");
        }
        self.connections.write().await.remove(&peer_id);
    }

    pub async fn room_members(&self, room_id: &RoomId) -> Vec<PeerId> {
        self.rooms.read().await.members(room_id).collect()
    }

    /// Handle one message received from `sender`.
    ///
    /// # Errors
    /// Fails for messages a client must not send or broadcasts into a room the sender is not in.
    /// Nothing is reported back to the sender in either case.
    pub async fn handle(&self, sender: PeerId, message: SignalMessage) -> crate::Result<()> {
        debug!("message received from peer {sender}: {}", message.kind());
        match message {
            SignalMessage::Join { room_id, secret } => self.join(sender, room_id, secret).await,
            SignalMessage::Leave { room_id } => {
                if self.rooms.write().await.leave(sender, &room_id) {
                    info!("peer {sender} left room {room_id}");
                }
                Ok(())
            }
            SignalMessage::Offer {
                target: Target::Room(ref room_id),
                ..
            } => {
                let room_id = room_id.clone();
                self.broadcast(sender, &room_id, message.stamped(sender))
                    .await
            }
            SignalMessage::Offer {
                target: Target::Peer(target),
                ..
            }
            | SignalMessage::Answer { target, .. }
            | SignalMessage::IceCandidate { target, .. }
            | SignalMessage::VideoSource { target, .. } => {
                let kind = message.kind();
                if !self.deliver(target, message.stamped(sender)).await {
                    debug!("dropped {kind} from {sender}, peer {target} is not connected");
                }
                Ok(())
            }
            SignalMessage::ChatMessage { ref room_id, .. }
            | SignalMessage::Draw { ref room_id, .. }
            | SignalMessage::ClearBoard { ref room_id, .. } => {
                let room_id = room_id.clone();
                self.broadcast(sender, &room_id, message.stamped(sender))
                    .await
            }
            SignalMessage::Welcome { .. }
            | SignalMessage::OtherUser { .. }
            | SignalMessage::Error { .. } => {
                bail!("peer {sender} sent relay-only message {}", message.kind())
            }
        }
    }

    async fn join(
        &self,
        sender: PeerId,
        room_id: RoomId,
        secret: Option<String>,
    ) -> crate::Result<()> {
        if let Some(expected) = self.settings.access_secret.as_deref() {
            if secret.as_deref() != Some(expected) {
                warn!("peer {sender} presented a wrong secret for room {room_id}");
                self.reject(sender, "access denied: wrong secret").await;
                return Ok(());
            }
        }

        let outcome = {
            let mut rooms = self.rooms.write().await;
            if let Some(capacity) = self.settings.room_capacity {
                if !rooms.is_member(sender, &room_id) && rooms.member_count(&room_id) >= capacity
                {
                    drop(rooms);
                    warn!("peer {sender} refused, room {room_id} is full");
                    self.reject(sender, &format!("room {room_id} is full")).await;
                    return Ok(());
                }
            }
            rooms.join(sender, room_id.clone())
        };

        if let Some(previous) = outcome.left {
            info!("peer {sender} moved from room {previous} to {room_id}");
        }
        info!(
            "peer {sender} joined room {room_id} ({} members)",
            outcome.members
        );

        if let Some(occupant) = outcome.occupant {
            let notification = SignalMessage::OtherUser { peer_id: occupant };
            if !self.deliver(sender, notification).await {
                return Err(anyhow!("peer {sender} disconnected while joining {room_id}"));
            }
        }
        Ok(())
    }

    async fn reject(&self, peer_id: PeerId, reason: &str) {
        let message = SignalMessage::Error {
            message: reason.to_owned(),
        };
        self.deliver(peer_id, message).await;
    }

    async fn deliver(&self, target: PeerId, message: SignalMessage) -> bool {
        self.connections
            .read()
            .await
            .get(&target)
            .map_or(false, |outbox| outbox.send(message).is_ok())
    }

    async fn broadcast(
        &self,
        sender: PeerId,
        room_id: &RoomId,
        message: SignalMessage,
    ) -> crate::Result<()> {
        let recipients: Vec<PeerId> = {
            let rooms = self.rooms.read().await;
            if !rooms.is_member(sender, room_id) {
                bail!(
                    "peer {sender} broadcast {} into room {room_id} it is not a member of",
                    message.kind()
                );
            }
            rooms
                .members(room_id)
                .filter(|member| *member != sender)
                .collect()
        };

        let connections = self.connections.read().await;
        for recipient in recipients {
            if let Some(outbox) = connections.get(&recipient) {
                if outbox.send(message.clone()).is_err() {
                    debug!("peer {recipient} is going away, skipped {}", message.kind());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use gant_meet_protocol::{IceCandidate, SessionDescription};
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    struct TestPeer {
        id: PeerId,
        inbox: UnboundedReceiver<SignalMessage>,
    }

    impl TestPeer {
        async fn connect(relay: &Relay) -> Self {
            let (outbox, mut inbox) = mpsc::unbounded_channel();
            let id = relay.connect(outbox).await;
            assert_eq!(
                inbox.recv().await,
                Some(SignalMessage::Welcome { peer_id: id })
            );
            Self { id, inbox }
        }

        fn received(&mut self) -> Vec<SignalMessage> {
            let mut messages = Vec::new();
            while let Ok(message) = self.inbox.try_recv() {
                messages.push(message);
            }
            messages
        }
    }

    fn room(name: &str) -> RoomId {
        RoomId::parse(name).unwrap()
    }

    fn join(name: &str) -> SignalMessage {
        SignalMessage::Join {
            room_id: room(name),
            secret: None,
        }
    }

    fn candidate(target: PeerId) -> SignalMessage {
        SignalMessage::IceCandidate {
            target,
            sender: None,
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".to_owned(),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
            },
        }
    }

    #[tokio::test]
    async fn second_peer_is_told_about_the_first() {
        let relay = Relay::default();
        let mut x = TestPeer::connect(&relay).await;
        let mut y = TestPeer::connect(&relay).await;

        relay.handle(x.id, join("room-42")).await.unwrap();
        relay.handle(y.id, join("room-42")).await.unwrap();

        assert!(x.received().is_empty());
        assert_eq!(y.received(), vec![SignalMessage::OtherUser { peer_id: x.id }]);
    }

    #[tokio::test]
    async fn offer_is_forwarded_with_stamped_caller() {
        let relay = Relay::default();
        let mut x = TestPeer::connect(&relay).await;
        let y = TestPeer::connect(&relay).await;
        let offer = SignalMessage::Offer {
            target: Target::Peer(x.id),
            caller: Some(PeerId::random()),
            sdp: SessionDescription::offer("v=0"),
            tracks: Vec::new(),
            renegotiate: false,
        };

        relay.handle(y.id, offer).await.unwrap();

        match x.received().as_slice() {
            [SignalMessage::Offer { caller, sdp, .. }] => {
                assert_eq!(*caller, Some(y.id));
                assert_eq!(sdp.sdp, "v=0");
            }
            other => panic!("unexpected messages {other:?}"),
        }
    }

    #[tokio::test]
    async fn room_offer_reaches_every_other_member() {
        let relay = Relay::default();
        let mut x = TestPeer::connect(&relay).await;
        let mut y = TestPeer::connect(&relay).await;
        let mut z = TestPeer::connect(&relay).await;
        let mut outsider = TestPeer::connect(&relay).await;
        for peer in [&x, &y, &z] {
            relay.handle(peer.id, join("room-42")).await.unwrap();
        }
        y.received();
        let offer = SignalMessage::Offer {
            target: Target::Room(room("room-42")),
            caller: None,
            sdp: SessionDescription::offer("v=0"),
            tracks: Vec::new(),
            renegotiate: false,
        };

        relay.handle(x.id, offer.clone()).await.unwrap();

        for peer in [&mut y, &mut z] {
            assert!(matches!(
                peer.received().as_slice(),
                [SignalMessage::Offer { caller: Some(caller), target: Target::Room(_), .. }] if *caller == x.id
            ));
        }
        assert!(x.received().is_empty());

        assert!(relay.handle(outsider.id, offer).await.is_err());
        assert!(y.received().is_empty());
        assert!(z.received().is_empty());
        assert!(outsider.received().is_empty());
    }

    #[tokio::test]
    async fn messages_for_disconnected_peers_are_dropped() {
        let relay = Relay::default();
        let x = TestPeer::connect(&relay).await;
        let gone = TestPeer::connect(&relay).await;
        relay.disconnect(gone.id).await;

        assert!(relay.handle(x.id, candidate(gone.id)).await.is_ok());
        assert!(relay.handle(x.id, candidate(PeerId::random())).await.is_ok());
    }

    #[tokio::test]
    async fn broadcast_reaches_other_members_only() {
        let relay = Relay::default();
        let mut x = TestPeer::connect(&relay).await;
        let mut y = TestPeer::connect(&relay).await;
        let mut outsider = TestPeer::connect(&relay).await;
        relay.handle(x.id, join("room-42")).await.unwrap();
        relay.handle(y.id, join("room-42")).await.unwrap();
        relay.handle(outsider.id, join("elsewhere")).await.unwrap();
        y.received();

        let draw = SignalMessage::Draw {
            room_id: room("room-42"),
            sender: None,
            data: json!({ "x": 1, "y": 2 }),
        };
        relay.handle(x.id, draw).await.unwrap();

        assert!(x.received().is_empty());
        assert!(outsider.received().is_empty());
        assert!(matches!(
            y.received().as_slice(),
            [SignalMessage::Draw { sender: Some(sender), .. }] if *sender == x.id
        ));
    }

    #[tokio::test]
    async fn broadcast_into_foreign_room_is_refused() {
        let relay = Relay::default();
        let x = TestPeer::connect(&relay).await;
        let mut y = TestPeer::connect(&relay).await;
        relay.handle(y.id, join("room-42")).await.unwrap();

        let chat = SignalMessage::ChatMessage {
            room_id: room("room-42"),
            sender: None,
            text: "hi".to_owned(),
        };

        assert!(relay.handle(x.id, chat).await.is_err());
        assert!(y.received().is_empty());
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let relay = Relay::new(RelaySettings {
            access_secret: Some("aula".to_owned()),
            room_capacity: None,
        });
        let mut x = TestPeer::connect(&relay).await;

        relay.handle(x.id, join("room-42")).await.unwrap();
        relay
            .handle(
                x.id,
                SignalMessage::Join {
                    room_id: room("room-42"),
                    secret: Some("aula".to_owned()),
                },
            )
            .await
            .unwrap();

        assert!(matches!(x.received().as_slice(), [SignalMessage::Error { .. }]));
        assert_eq!(relay.room_members(&room("room-42")).await, vec![x.id]);
    }

    #[tokio::test]
    async fn full_room_is_rejected_when_capacity_is_set() {
        let relay = Relay::new(RelaySettings {
            access_secret: None,
            room_capacity: Some(2),
        });
        let x = TestPeer::connect(&relay).await;
        let y = TestPeer::connect(&relay).await;
        let mut z = TestPeer::connect(&relay).await;
        relay.handle(x.id, join("room-42")).await.unwrap();
        relay.handle(y.id, join("room-42")).await.unwrap();

        relay.handle(z.id, join("room-42")).await.unwrap();

        assert!(matches!(z.received().as_slice(), [SignalMessage::Error { .. }]));
        assert_eq!(relay.room_members(&room("room-42")).await.len(), 2);
    }

    #[tokio::test]
    async fn disconnect_removes_membership() {
        let relay = Relay::default();
        let x = TestPeer::connect(&relay).await;
        let mut y = TestPeer::connect(&relay).await;
        relay.handle(x.id, join("room-42")).await.unwrap();
        relay.disconnect(x.id).await;

        relay.handle(y.id, join("room-42")).await.unwrap();

        assert!(y.received().is_empty());
        assert_eq!(relay.room_members(&room("room-42")).await, vec![y.id]);
    }

    #[tokio::test]
    async fn relay_only_messages_from_clients_are_refused() {
        let relay = Relay::default();
        let x = TestPeer::connect(&relay).await;

        let result = relay
            .handle(x.id, SignalMessage::OtherUser { peer_id: x.id })
            .await;

        assert!(result.is_err());
    }
}
