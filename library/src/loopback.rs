/*!
In-memory platform used to drive calls without a browser.

Transports created from the same [`LoopbackNetwork`] talk to each other through a fake `SDP`
that only lists tracks, and connect once both sides exchanged descriptions and candidates.
[`LoopbackRelay`] routes signaling the same way the relay server does.
*/

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use gant_meet_protocol::{
    IceCandidate, MediaId, PeerId, RoomId, SdpType, SessionDescription, SignalMessage, Target,
    TrackId, TrackKind,
};
use log::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{TrackEndedSink, TransportEventSink};
use crate::manager::SignalSender;
use crate::media::{LocalTrack, MediaDevices};
use crate::transport::{
    IceConnectionState, PeerTransport, PeerTransportFactory, RemoteTrack, RtpSender, SenderId,
    TransportEvent,
};

pub const CAMERA_LABEL: &str = "Loopback camera";
pub const MICROPHONE_LABEL: &str = "Loopback microphone";
pub const SCREEN_LABEL: &str = "Loopback screen";

#[derive(Debug)]
struct TrackInner {
    id: TrackId,
    kind: TrackKind,
    label: String,
    live: Cell<bool>,
    ended: Option<TrackEndedSink>,
}

#[derive(Debug, Clone)]
pub struct LoopbackTrack(Rc<TrackInner>);

impl LoopbackTrack {
    #[must_use]
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self::build(kind, label.into(), None)
    }

    fn build(kind: TrackKind, label: String, ended: Option<TrackEndedSink>) -> Self {
        Self(Rc::new(TrackInner {
            id: TrackId::new(Uuid::new_v4().to_string()),
            kind,
            label,
            live: Cell::new(true),
            ended,
        }))
    }

    /// End the capture the way a browser does when the user revokes it.
    pub fn end(&self) {
        if self.0.live.replace(false) {
            if let Some(sink) = &self.0.ended {
                sink.track_ended(self.id());
            }
        }
    }
}

impl LocalTrack for LoopbackTrack {
    fn id(&self) -> TrackId {
        self.0.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.0.kind
    }

    fn label(&self) -> String {
        self.0.label.clone()
    }

    fn stop(&self) {
        self.0.live.set(false);
    }

    fn is_live(&self) -> bool {
        self.0.live.get()
    }
}

#[derive(Debug, Default)]
struct DevicesState {
    camera_denied: bool,
    screen_cancelled: bool,
    issued: Vec<LoopbackTrack>,
}

/// Capture devices that always work unless told otherwise. Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct LoopbackDevices {
    state: Rc<RefCell<DevicesState>>,
}

impl LoopbackDevices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse camera and microphone from now on.
    pub fn deny_camera(&self) {
        self.state.borrow_mut().camera_denied = true;
    }

    /// Dismiss the screen picker from now on.
    pub fn cancel_screen_picker(&self) {
        self.state.borrow_mut().screen_cancelled = true;
    }

    /// Every track handed out so far.
    #[must_use]
    pub fn issued(&self) -> Vec<LoopbackTrack> {
        self.state.borrow().issued.clone()
    }

    /// Press the browser's "stop sharing" button. Returns whether a capture was running.
    pub fn stop_sharing_from_browser(&self) -> bool {
        let screen = self
            .state
            .borrow()
            .issued
            .iter()
            .rev()
            .find(|track| track.label() == SCREEN_LABEL && track.is_live())
            .cloned();
        screen.map_or(false, |screen| {
            screen.end();
            true
        })
    }
}

#[async_trait(?Send)]
impl MediaDevices for LoopbackDevices {
    type Track = LoopbackTrack;

    async fn camera_and_microphone(&self) -> Result<Vec<LoopbackTrack>> {
        let mut state = self.state.borrow_mut();
        if state.camera_denied {
            return Err(Error::MediaAccessDenied(
                "NotAllowedError: Permission denied".to_owned(),
            ));
        }
        let tracks = vec![
            LoopbackTrack::new(TrackKind::Video, CAMERA_LABEL),
            LoopbackTrack::new(TrackKind::Audio, MICROPHONE_LABEL),
        ];
        state.issued.extend(tracks.iter().cloned());
        Ok(tracks)
    }

    async fn screen(&self, ended: TrackEndedSink) -> Result<LoopbackTrack> {
        let mut state = self.state.borrow_mut();
        if state.screen_cancelled {
            return Err(Error::NoSourceSelected);
        }
        let track = LoopbackTrack::build(TrackKind::Video, SCREEN_LABEL.to_owned(), Some(ended));
        state.issued.push(track.clone());
        Ok(track)
    }
}

/// Snapshot of one transport, for assertions.
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Distinguishes transports created for the same pair of peers
    pub generation: u64,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub applied_candidates: Vec<IceCandidate>,
    /// Candidates offered before any remote description existed
    pub premature_candidates: usize,
    pub inbound: Vec<RemoteTrack>,
    pub offers_created: usize,
    pub connected: bool,
    pub closed: bool,
}

#[derive(Debug)]
struct SenderSlot {
    kind: TrackKind,
    track: Option<LoopbackTrack>,
    /// Part of an applied local description
    negotiated: bool,
}

/// Media section `n` is always sent by sender slot `n`.
fn slot_mid(index: usize) -> MediaId {
    MediaId::new(index.to_string())
}

#[derive(Debug)]
struct Endpoint {
    local: PeerId,
    remote: PeerId,
    sink: TransportEventSink,
    senders: Vec<SenderSlot>,
    /// Local ids given to inbound tracks, one per remote media section
    received: HashMap<MediaId, TrackId>,
    candidate_sent: bool,
    stats: TransportStats,
}

impl Endpoint {
    fn ready(&self) -> bool {
        self.stats.local_description.is_some()
            && self.stats.remote_description.is_some()
            && !self.stats.applied_candidates.is_empty()
            && !self.stats.connected
            && !self.stats.closed
    }
}

type Outgoing = Vec<(TransportEventSink, TransportEvent)>;

#[derive(Debug, Default)]
struct NetworkState {
    next_generation: u64,
    endpoints: HashMap<u64, Endpoint>,
    latest: HashMap<(PeerId, PeerId), u64>,
}

impl NetworkState {
    fn endpoint(&mut self, generation: u64) -> anyhow::Result<&mut Endpoint> {
        self.endpoints
            .get_mut(&generation)
            .ok_or_else(|| anyhow!("unknown loopback transport {generation}"))
    }

    fn counterpart(&self, generation: u64) -> Option<u64> {
        let endpoint = self.endpoints.get(&generation)?;
        self.latest.get(&(endpoint.remote, endpoint.local)).copied()
    }

    fn check_connected(&mut self, generation: u64) -> Outgoing {
        let Some(other) = self.counterpart(generation) else {
            return Vec::new();
        };
        let both_ready = matches!(
            (self.endpoints.get(&generation), self.endpoints.get(&other)),
            (Some(a), Some(b)) if a.ready() && b.ready()
        );
        if !both_ready {
            return Vec::new();
        }
        let mut outgoing = Vec::new();
        for id in [generation, other] {
            if let Some(endpoint) = self.endpoints.get_mut(&id) {
                endpoint.stats.connected = true;
                outgoing.push((
                    endpoint.sink.clone(),
                    TransportEvent::IceConnectionStateChanged(IceConnectionState::Connected),
                ));
            }
        }
        outgoing
    }
}

fn deliver(outgoing: Outgoing) {
    for (sink, event) in outgoing {
        sink.emit(event);
    }
}

/// Shared medium for loopback transports. Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl LoopbackNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for transports owned by `local`.
    #[must_use]
    pub fn factory(&self, local: PeerId) -> LoopbackFactory {
        LoopbackFactory {
            network: self.clone(),
            local,
        }
    }

    /// State of the newest transport `local` created towards `remote`.
    #[must_use]
    pub fn stats(&self, local: PeerId, remote: PeerId) -> Option<TransportStats> {
        let state = self.state.borrow();
        let generation = state.latest.get(&(local, remote))?;
        state
            .endpoints
            .get(generation)
            .map(|endpoint| endpoint.stats.clone())
    }

    /// Break connectivity between two peers, both sides see their ICE agent fail.
    pub fn fail(&self, a: PeerId, b: PeerId) {
        let outgoing: Outgoing = {
            let state = self.state.borrow();
            [(a, b), (b, a)]
                .iter()
                .filter_map(|pair| state.latest.get(pair))
                .filter_map(|generation| state.endpoints.get(generation))
                .map(|endpoint| {
                    (
                        endpoint.sink.clone(),
                        TransportEvent::IceConnectionStateChanged(IceConnectionState::Failed),
                    )
                })
                .collect()
        };
        deliver(outgoing);
    }
}

#[derive(Debug, Clone)]
pub struct LoopbackFactory {
    network: LoopbackNetwork,
    local: PeerId,
}

impl PeerTransportFactory for LoopbackFactory {
    type Track = LoopbackTrack;
    type Transport = LoopbackTransport;

    fn create(
        &self,
        remote: &PeerId,
        events: TransportEventSink,
    ) -> anyhow::Result<LoopbackTransport> {
        let mut state = self.network.state.borrow_mut();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.endpoints.insert(
            generation,
            Endpoint {
                local: self.local,
                remote: *remote,
                sink: events,
                senders: Vec::new(),
                received: HashMap::new(),
                candidate_sent: false,
                stats: TransportStats {
                    generation,
                    ..TransportStats::default()
                },
            },
        );
        state.latest.insert((self.local, *remote), generation);
        debug!("loopback transport {generation} created for {} -> {remote}", self.local);
        Ok(LoopbackTransport {
            network: self.network.clone(),
            generation,
        })
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    generation: u64,
}

fn render_sdp(generation: u64, senders: &[SenderSlot]) -> String {
    let mut sdp = format!("v=0\r\no=- {generation} 2 IN IP4 127.0.0.1\r\ns=-\r\n");
    for (index, slot) in senders.iter().enumerate() {
        if let Some(track) = &slot.track {
            sdp.push_str(&format!(
                "m={} 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:{}\r\na=msid:loopback-{generation} {}\r\na=x-label:{}\r\n",
                slot.kind,
                slot_mid(index),
                track.id(),
                track.label()
            ));
        }
    }
    sdp
}

/// Media section of a fake `SDP`. The sender's track id is not kept, receivers pick their own.
#[derive(Debug, Clone, Eq, PartialEq)]
struct MediaSection {
    mid: MediaId,
    kind: TrackKind,
    label: String,
}

fn parse_sdp(sdp: &str) -> anyhow::Result<Vec<MediaSection>> {
    if !sdp.starts_with("v=0") {
        bail!("InvalidAccessError: failed to parse session description");
    }
    let mut sections = Vec::new();
    let mut kind = None;
    let mut mid = None;
    for line in sdp.lines() {
        if let Some(media) = line.strip_prefix("m=") {
            kind = match media.split(' ').next() {
                Some("audio") => Some(TrackKind::Audio),
                Some("video") => Some(TrackKind::Video),
                _ => bail!("unsupported media section: {line}"),
            };
            mid = None;
        } else if let Some(value) = line.strip_prefix("a=mid:") {
            mid = Some(MediaId::new(value));
        } else if let Some(label) = line.strip_prefix("a=x-label:") {
            match (kind, mid.take()) {
                (Some(kind), Some(mid)) => sections.push(MediaSection {
                    mid,
                    kind,
                    label: label.to_owned(),
                }),
                _ => bail!("media section without kind or mid"),
            }
        }
    }
    Ok(sections)
}

impl LoopbackTransport {
    fn with_endpoint<R>(&self, f: impl FnOnce(&mut Endpoint) -> anyhow::Result<R>) -> anyhow::Result<R> {
        let mut state = self.network.state.borrow_mut();
        let endpoint = state.endpoint(self.generation)?;
        if endpoint.stats.closed {
            bail!("InvalidStateError: connection is closed");
        }
        f(endpoint)
    }
}

#[async_trait(?Send)]
impl PeerTransport for LoopbackTransport {
    type Track = LoopbackTrack;

    async fn create_offer(&self) -> anyhow::Result<SessionDescription> {
        let generation = self.generation;
        self.with_endpoint(|endpoint| {
            endpoint.stats.offers_created += 1;
            Ok(SessionDescription::offer(render_sdp(generation, &endpoint.senders)))
        })
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        let generation = self.generation;
        self.with_endpoint(|endpoint| match endpoint.stats.remote_description {
            Some(SessionDescription {
                sdp_type: SdpType::Offer,
                ..
            }) => Ok(SessionDescription::answer(render_sdp(generation, &endpoint.senders))),
            _ => bail!("InvalidStateError: no remote offer to answer"),
        })
    }

    async fn set_local_description(&self, description: &SessionDescription) -> anyhow::Result<()> {
        let generation = self.generation;
        let outgoing = self.with_endpoint(|endpoint| {
            endpoint.stats.local_description = Some(description.clone());
            for slot in &mut endpoint.senders {
                slot.negotiated = true;
            }
            if endpoint.candidate_sent {
                return Ok(Vec::new());
            }
            endpoint.candidate_sent = true;
            let candidate = IceCandidate {
                candidate: format!(
                    "candidate:{generation} 1 udp 2130706431 127.0.0.1 {} typ host",
                    40_000 + generation
                ),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
            };
            Ok(vec![(
                endpoint.sink.clone(),
                TransportEvent::LocalCandidate(candidate),
            )])
        })?;
        deliver(outgoing);
        let connected = self.network.state.borrow_mut().check_connected(generation);
        deliver(connected);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> anyhow::Result<()> {
        let sections = parse_sdp(&description.sdp)?;
        let outgoing = self.with_endpoint(|endpoint| {
            let tracks: Vec<RemoteTrack> = sections
                .into_iter()
                .map(|section| {
                    let id = endpoint
                        .received
                        .entry(section.mid.clone())
                        .or_insert_with(|| TrackId::new(Uuid::new_v4().to_string()))
                        .clone();
                    RemoteTrack {
                        id,
                        mid: Some(section.mid),
                        kind: section.kind,
                        label: section.label,
                    }
                })
                .collect();
            let added = tracks
                .iter()
                .filter(|track| !endpoint.stats.inbound.iter().any(|known| known.id == track.id))
                .map(|track| {
                    (
                        endpoint.sink.clone(),
                        TransportEvent::RemoteTrack(track.clone()),
                    )
                })
                .collect::<Outgoing>();
            endpoint.stats.inbound = tracks;
            endpoint.stats.remote_description = Some(description.clone());
            Ok(added)
        })?;
        deliver(outgoing);
        let connected = self
            .network
            .state
            .borrow_mut()
            .check_connected(self.generation);
        deliver(connected);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> anyhow::Result<()> {
        self.with_endpoint(|endpoint| {
            if endpoint.stats.remote_description.is_none() {
                endpoint.stats.premature_candidates += 1;
                bail!("InvalidStateError: the remote description was null");
            }
            endpoint.stats.applied_candidates.push(candidate.clone());
            Ok(())
        })?;
        let connected = self
            .network
            .state
            .borrow_mut()
            .check_connected(self.generation);
        deliver(connected);
        Ok(())
    }

    fn add_track(&self, track: &LoopbackTrack) -> anyhow::Result<SenderId> {
        self.with_endpoint(|endpoint| {
            endpoint.senders.push(SenderSlot {
                kind: track.kind(),
                track: Some(track.clone()),
                negotiated: false,
            });
            Ok(SenderId::new(endpoint.senders.len() - 1))
        })
    }

    fn remove_track(&self, sender: SenderId) -> anyhow::Result<()> {
        self.with_endpoint(|endpoint| {
            let slot = endpoint
                .senders
                .get_mut(sender.index())
                .ok_or_else(|| anyhow!("unknown sender {}", sender.index()))?;
            slot.track = None;
            Ok(())
        })
    }

    fn senders(&self) -> Vec<RtpSender> {
        self.network
            .state
            .borrow()
            .endpoints
            .get(&self.generation)
            .map(|endpoint| {
                endpoint
                    .senders
                    .iter()
                    .enumerate()
                    .map(|(index, slot)| RtpSender {
                        id: SenderId::new(index),
                        track: slot.track.as_ref().map(LocalTrack::id),
                        kind: slot.kind,
                        mid: slot.negotiated.then(|| slot_mid(index)),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn receiving(&self) -> Vec<RemoteTrack> {
        self.network
            .state
            .borrow()
            .endpoints
            .get(&self.generation)
            .map(|endpoint| endpoint.stats.inbound.clone())
            .unwrap_or_default()
    }

    async fn replace_track(&self, sender: SenderId, track: &LoopbackTrack) -> anyhow::Result<()> {
        let mid = slot_mid(sender.index());
        self.with_endpoint(|endpoint| {
            let slot = endpoint
                .senders
                .get_mut(sender.index())
                .ok_or_else(|| anyhow!("unknown sender {}", sender.index()))?;
            if slot.kind != track.kind() {
                bail!("TypeError: cannot replace {} track with {}", slot.kind, track.kind());
            }
            slot.track = Some(track.clone());
            Ok(())
        })?;

        let mut state = self.network.state.borrow_mut();
        if let Some(other) = state.counterpart(self.generation) {
            if let Some(inbound) = state
                .endpoints
                .get_mut(&other)
                .and_then(|endpoint| {
                    endpoint
                        .stats
                        .inbound
                        .iter_mut()
                        .find(|inbound| inbound.mid.as_ref() == Some(&mid))
                })
            {
                inbound.label = track.label();
            }
        }
        Ok(())
    }

    fn close(&self) {
        let outgoing = {
            let mut state = self.network.state.borrow_mut();
            let other = state.counterpart(self.generation);
            match state.endpoints.get_mut(&self.generation) {
                Some(endpoint) if !endpoint.stats.closed => endpoint.stats.closed = true,
                _ => return,
            }
            other
                .and_then(|other| state.endpoints.get(&other))
                .filter(|endpoint| !endpoint.stats.closed)
                .map(|endpoint| {
                    (
                        endpoint.sink.clone(),
                        TransportEvent::IceConnectionStateChanged(IceConnectionState::Disconnected),
                    )
                })
        };
        deliver(outgoing.into_iter().collect());
    }
}

/// Signal sender that keeps every message for inspection. Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct LoopbackSignaling {
    outbox: Rc<RefCell<VecDeque<SignalMessage>>>,
    history: Rc<RefCell<Vec<SignalMessage>>>,
}

impl LoopbackSignaling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent since the last call.
    pub fn take(&self) -> Vec<SignalMessage> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    /// Every message ever sent.
    #[must_use]
    pub fn history(&self) -> Vec<SignalMessage> {
        self.history.borrow().clone()
    }
}

impl SignalSender for LoopbackSignaling {
    fn send(&self, message: SignalMessage) -> Result<()> {
        self.history.borrow_mut().push(message.clone());
        self.outbox.borrow_mut().push_back(message);
        Ok(())
    }
}

/// Routes messages between peers with the same rules as the relay server.
#[derive(Debug, Default)]
pub struct LoopbackRelay {
    rooms: HashMap<RoomId, Vec<PeerId>>,
    memberships: HashMap<PeerId, RoomId>,
}

impl LoopbackRelay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn leave(&mut self, peer_id: PeerId) {
        if let Some(room_id) = self.memberships.remove(&peer_id) {
            if let Some(members) = self.rooms.get_mut(&room_id) {
                members.retain(|member| *member != peer_id);
                if members.is_empty() {
                    self.rooms.remove(&room_id);
                }
            }
        }
    }

    fn others(&self, from: PeerId, room_id: &RoomId) -> Vec<PeerId> {
        if self.memberships.get(&from) != Some(room_id) {
            return Vec::new();
        }
        self.rooms
            .get(room_id)
            .map(|members| members.iter().copied().filter(|m| *m != from).collect())
            .unwrap_or_default()
    }

    /// Recipients of `message` sent by `from`, each with the copy it should receive.
    pub fn route(&mut self, from: PeerId, message: SignalMessage) -> Vec<(PeerId, SignalMessage)> {
        let recipients = match message {
            SignalMessage::Join { ref room_id, .. } => {
                if self.memberships.get(&from) != Some(room_id) {
                    self.leave(from);
                }
                let members = self.rooms.entry(room_id.clone()).or_default();
                let mut others = members.iter().filter(|member| **member != from);
                let occupant = match (others.next(), others.next()) {
                    (Some(occupant), None) => Some(*occupant),
                    _ => None,
                };
                if !members.contains(&from) {
                    members.push(from);
                }
                self.memberships.insert(from, room_id.clone());
                return occupant
                    .map(|peer_id| (from, SignalMessage::OtherUser { peer_id }))
                    .into_iter()
                    .collect();
            }
            SignalMessage::Leave { ref room_id } => {
                if self.memberships.get(&from) == Some(room_id) {
                    self.leave(from);
                }
                return Vec::new();
            }
            SignalMessage::Offer {
                target: Target::Peer(target),
                ..
            }
            | SignalMessage::Answer { target, .. }
            | SignalMessage::IceCandidate { target, .. }
            | SignalMessage::VideoSource { target, .. } => vec![target],
            SignalMessage::Offer {
                target: Target::Room(ref room_id),
                ..
            }
            | SignalMessage::ChatMessage { ref room_id, .. }
            | SignalMessage::Draw { ref room_id, .. }
            | SignalMessage::ClearBoard { ref room_id, .. } => self.others(from, room_id),
            SignalMessage::Welcome { .. }
            | SignalMessage::OtherUser { .. }
            | SignalMessage::Error { .. } => return Vec::new(),
        };
        let message = message.stamped(from);
        recipients
            .into_iter()
            .map(|peer_id| (peer_id, message.clone()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relay_notifies_only_the_second_peer() {
        let room = RoomId::parse("loopback").unwrap();
        let (a, b, c) = (PeerId::random(), PeerId::random(), PeerId::random());
        let join = SignalMessage::Join {
            room_id: room.clone(),
            secret: None,
        };
        let mut relay = LoopbackRelay::new();

        assert!(relay.route(a, join.clone()).is_empty());
        assert_eq!(
            relay.route(b, join.clone()),
            vec![(b, SignalMessage::OtherUser { peer_id: a })]
        );
        assert!(relay.route(c, join).is_empty());

        let chat = relay.route(
            a,
            SignalMessage::ChatMessage {
                room_id: room,
                sender: None,
                text: "hi".to_owned(),
            },
        );
        assert_eq!(chat.len(), 2);
        assert!(chat.iter().all(|(_, message)| matches!(
            message,
            SignalMessage::ChatMessage { sender: Some(sender), .. } if *sender == a
        )));
    }

    #[test]
    fn rejoining_the_same_room_announces_the_occupant_again() {
        let room = RoomId::parse("loopback").unwrap();
        let (a, b) = (PeerId::random(), PeerId::random());
        let join = SignalMessage::Join {
            room_id: room.clone(),
            secret: None,
        };
        let mut relay = LoopbackRelay::new();
        relay.route(a, join.clone());
        relay.route(b, join.clone());

        assert_eq!(
            relay.route(b, join.clone()),
            vec![(b, SignalMessage::OtherUser { peer_id: a })]
        );
        assert_eq!(
            relay.route(a, join),
            vec![(a, SignalMessage::OtherUser { peer_id: b })]
        );
        assert_eq!(relay.rooms.get(&room).map(Vec::len), Some(2));
    }

    #[test]
    fn fake_sdp_lists_media_sections() {
        let camera = LoopbackTrack::new(TrackKind::Video, CAMERA_LABEL);
        let slots = vec![
            SenderSlot {
                kind: TrackKind::Audio,
                track: None,
                negotiated: true,
            },
            SenderSlot {
                kind: TrackKind::Video,
                track: Some(camera.clone()),
                negotiated: true,
            },
        ];
        let sdp = render_sdp(3, &slots);
        assert!(sdp.contains(camera.id().as_str()));
        assert_eq!(
            parse_sdp(&sdp).unwrap(),
            vec![MediaSection {
                mid: MediaId::new("1"),
                kind: TrackKind::Video,
                label: CAMERA_LABEL.to_owned(),
            }]
        );
        assert!(parse_sdp("not sdp").is_err());
    }
}
