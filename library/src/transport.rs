use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use gant_meet_protocol::{IceCandidate, MediaId, PeerId, SessionDescription, TrackId, TrackKind};

use crate::constants::DEFAULT_STUN_SERVER;
use crate::events::TransportEventSink;
use crate::media::LocalTrack;

/// Specifies what kind of peer connection to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionType {
    /// Within local network
    Local,
    /// Setup with STUN server, WAN capabilities but can fail
    Stun { urls: String },
    /// Setup with STUN and TURN servers, will fallback to TURN if needed, most stable connection
    StunAndTurn {
        stun_urls: String,
        turn_urls: String,
        username: String,
        credential: String,
    },
}

impl Default for ConnectionType {
    fn default() -> Self {
        Self::Stun {
            urls: DEFAULT_STUN_SERVER.to_owned(),
        }
    }
}

/// Identifies one connection object for the lifetime of a manager.
/// Events tagged with an id that is no longer current belong to a torn down transport.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub const fn new(inner: u64) -> Self {
        Self(inner)
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connectivity as reported by the transport's ICE agent.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Track received from the remote side.
///
/// `id` is assigned by the receiving end and generally differs from the sender's track id,
/// `mid` is the one both ends agree on.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RemoteTrack {
    pub id: TrackId,
    pub mid: Option<MediaId>,
    pub kind: TrackKind,
    pub label: String,
}

/// Asynchronous notifications a transport raises on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local candidate was gathered and should be sent to the remote peer
    LocalCandidate(IceCandidate),
    /// The remote side started sending a track
    RemoteTrack(RemoteTrack),
    IceConnectionStateChanged(IceConnectionState),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SenderId(usize);

impl SenderId {
    #[must_use]
    pub const fn new(inner: usize) -> Self {
        Self(inner)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Outbound slot of a transport and the track it currently carries.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RtpSender {
    pub id: SenderId,
    pub track: Option<TrackId>,
    pub kind: TrackKind,
    /// Known once a local description including the sender has been applied
    pub mid: Option<MediaId>,
}

/// Peer-to-peer media transport, the browser's `RTCPeerConnection` in practice.
///
/// Every async method completes only once the underlying operation did,
/// so callers can rely on ordering between them.
#[async_trait(?Send)]
pub trait PeerTransport {
    type Track: LocalTrack;

    async fn create_offer(&self) -> anyhow::Result<SessionDescription>;
    async fn create_answer(&self) -> anyhow::Result<SessionDescription>;
    async fn set_local_description(&self, description: &SessionDescription) -> anyhow::Result<()>;
    async fn set_remote_description(&self, description: &SessionDescription)
        -> anyhow::Result<()>;
    /// Must only be called once a remote description has been applied.
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> anyhow::Result<()>;
    fn add_track(&self, track: &Self::Track) -> anyhow::Result<SenderId>;
    fn remove_track(&self, sender: SenderId) -> anyhow::Result<()>;
    fn senders(&self) -> Vec<RtpSender>;
    /// Tracks the remote side currently sends according to the negotiated session.
    fn receiving(&self) -> Vec<RemoteTrack>;
    /// Swap the track a sender carries without renegotiating.
    async fn replace_track(&self, sender: SenderId, track: &Self::Track) -> anyhow::Result<()>;
    fn close(&self);
}

/// Creates one transport per remote peer.
pub trait PeerTransportFactory {
    type Track: LocalTrack;
    type Transport: PeerTransport<Track = Self::Track>;

    /// # Errors
    /// Fails if the platform refuses to create a connection, e.g. because of a bad ICE configuration.
    fn create(&self, remote: &PeerId, events: TransportEventSink)
        -> anyhow::Result<Self::Transport>;
}
