#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use gant_meet::loopback::{
    LoopbackDevices, LoopbackFactory, LoopbackNetwork, LoopbackRelay, LoopbackSignaling,
    TransportStats,
};
use gant_meet::{
    CallConfig, CallEvent, Command, Input, InputReceiver, PeerConnectionManager, PeerId, RoomId,
    ScreenShareMode, SignalMessage,
};

pub type Manager = PeerConnectionManager<LoopbackFactory, LoopbackDevices, LoopbackSignaling>;

pub const ROOM: &str = "standup";

pub struct Peer {
    pub id: PeerId,
    pub manager: Manager,
    pub inputs: InputReceiver,
    pub devices: LoopbackDevices,
    pub signaling: LoopbackSignaling,
    events: Rc<RefCell<Vec<CallEvent>>>,
    pub errors: Vec<String>,
}

impl Peer {
    pub fn events(&self) -> Vec<CallEvent> {
        self.events.borrow().clone()
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.signaling.history()
    }

    pub fn offers(&self) -> Vec<SignalMessage> {
        self.sent()
            .into_iter()
            .filter(|message| matches!(message, SignalMessage::Offer { .. }))
            .collect()
    }
}

/// A relay, a network and any number of peers, all in memory.
#[derive(Default)]
pub struct Meeting {
    pub network: LoopbackNetwork,
    pub relay: LoopbackRelay,
    pub peers: Vec<Peer>,
}

impl Meeting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new peer to the relay. It does not join the room until told to start a call.
    pub fn add_peer(&mut self, mode: ScreenShareMode) -> PeerId {
        let id = PeerId::random();
        let devices = LoopbackDevices::new();
        let signaling = LoopbackSignaling::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&events);
        let config = CallConfig::new(RoomId::parse(ROOM).unwrap()).with_screen_share(mode);
        let (manager, inputs) = PeerConnectionManager::new(
            config,
            self.network.factory(id),
            devices.clone(),
            signaling.clone(),
            move |event| recorded.borrow_mut().push(event),
        );
        manager
            .inputs()
            .unbounded_send(Input::Signal(SignalMessage::Welcome { peer_id: id }))
            .unwrap();
        self.peers.push(Peer {
            id,
            manager,
            inputs,
            devices,
            signaling,
            events,
            errors: Vec::new(),
        });
        id
    }

    pub fn peer(&self, id: PeerId) -> &Peer {
        self.peers.iter().find(|peer| peer.id == id).unwrap()
    }

    pub fn peer_mut(&mut self, id: PeerId) -> &mut Peer {
        self.peers.iter_mut().find(|peer| peer.id == id).unwrap()
    }

    /// Run a command right away and return its result.
    pub async fn command(&mut self, id: PeerId, command: Command) -> gant_meet::Result<()> {
        self.peer_mut(id)
            .manager
            .dispatch(Input::Command(command))
            .await
    }

    /// Take everything peers sent and route it, without delivering.
    pub fn route(&mut self) -> Vec<(PeerId, SignalMessage)> {
        let outboxes: Vec<_> = self
            .peers
            .iter()
            .map(|peer| (peer.id, peer.signaling.clone()))
            .collect();
        let mut routed = Vec::new();
        for (from, signaling) in outboxes {
            for message in signaling.take() {
                routed.extend(self.relay.route(from, message));
            }
        }
        routed
    }

    pub fn deliver(&self, to: PeerId, message: SignalMessage) {
        if let Some(peer) = self.peers.iter().find(|peer| peer.id == to) {
            peer.manager
                .inputs()
                .unbounded_send(Input::Signal(message))
                .unwrap();
        }
    }

    /// Drain every peer's input queue. Returns whether anything was processed.
    pub async fn process(&mut self) -> bool {
        let mut progressed = false;
        for peer in &mut self.peers {
            while let Ok(Some(input)) = peer.inputs.try_next() {
                progressed = true;
                if let Err(err) = peer.manager.dispatch(input).await {
                    peer.errors.push(err.to_string());
                }
            }
        }
        progressed
    }

    /// Route and process until nothing moves anymore.
    pub async fn pump(&mut self) {
        loop {
            let processed = self.process().await;
            let routed = self.route();
            if !processed && routed.is_empty() {
                break;
            }
            for (to, message) in routed {
                self.deliver(to, message);
            }
        }
    }

    pub fn stats(&self, local: PeerId, remote: PeerId) -> TransportStats {
        self.network.stats(local, remote).unwrap()
    }

    /// Two peers in the room: the occupant starts first, the joiner second.
    pub async fn pair(mode: ScreenShareMode) -> (Self, PeerId, PeerId) {
        let mut meeting = Self::new();
        let occupant = meeting.add_peer(mode);
        let joiner = meeting.add_peer(mode);
        meeting.pump().await;
        meeting.command(occupant, Command::StartCall).await.unwrap();
        meeting.pump().await;
        meeting.command(joiner, Command::StartCall).await.unwrap();
        meeting.pump().await;
        (meeting, occupant, joiner)
    }
}
