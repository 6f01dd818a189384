use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use gant_meet_protocol::{PeerId, SignalMessage, TrackId, TrackPurpose};
use log::debug;
use serde_json::Value;

use crate::transport::{ConnectionId, RemoteTrack, TransportEvent};

/// Lifecycle of the call as the user sees it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CallState {
    /// No media held, not in a room
    Idle,
    /// Waiting for camera and microphone
    Starting,
    /// Media held and room joined
    Active,
}

/// Negotiation state of the connection to the remote peer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    /// No connection object exists
    Idle,
    /// Descriptions are being exchanged
    Negotiating,
    /// ICE connectivity established, media flowing
    Connected,
    /// Connection torn down after the remote side went away
    Closed,
}

/// User-initiated operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartCall,
    EndCall,
    StartScreenShare,
    StopScreenShare,
    ToggleScreenShare,
    SendChat(String),
    Draw(Value),
    ClearBoard,
}

/// Everything a manager reacts to, processed strictly one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Signal(SignalMessage),
    Transport(ConnectionId, TransportEvent),
    /// A local track stopped on its own, e.g. via the browser's "stop sharing" button
    TrackEnded(TrackId),
    Command(Command),
}

pub type InputSender = UnboundedSender<Input>;
pub type InputReceiver = UnboundedReceiver<Input>;

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    CallStateChanged(CallState),
    ConnectionStateChanged(ConnectionState),
    MediaAccessDenied(String),
    ScreenShareFailed(String),
    ScreenShareChanged(bool),
    RemoteTrack {
        peer_id: PeerId,
        track: RemoteTrack,
        purpose: TrackPurpose,
    },
    /// The remote peer stopped sending a track, it will not receive data again
    RemoteTrackRemoved {
        peer_id: PeerId,
        track_id: TrackId,
    },
    /// The remote peer switched what its video slot shows
    RemoteVideoSource {
        peer_id: PeerId,
        track_id: TrackId,
        purpose: TrackPurpose,
    },
    NegotiationFailed {
        peer_id: PeerId,
        reason: String,
    },
    ChatMessage {
        sender: Option<PeerId>,
        text: String,
    },
    Draw {
        sender: Option<PeerId>,
        data: Value,
    },
    ClearBoard {
        sender: Option<PeerId>,
    },
    RelayError(String),
}

/// Handed to a transport so it can report events for its own connection object.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    connection: ConnectionId,
    inputs: InputSender,
}

impl TransportEventSink {
    #[must_use]
    pub const fn new(connection: ConnectionId, inputs: InputSender) -> Self {
        Self { connection, inputs }
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn emit(&self, event: TransportEvent) {
        if self
            .inputs
            .unbounded_send(Input::Transport(self.connection, event))
            .is_err()
        {
            debug!("manager is gone, dropped event of connection {}", self.connection);
        }
    }
}

/// Handed to media devices so a track that ends by itself is noticed.
#[derive(Debug, Clone)]
pub struct TrackEndedSink {
    inputs: InputSender,
}

impl TrackEndedSink {
    #[must_use]
    pub const fn new(inputs: InputSender) -> Self {
        Self { inputs }
    }

    pub fn track_ended(&self, track_id: TrackId) {
        if self.inputs.unbounded_send(Input::TrackEnded(track_id)).is_err() {
            debug!("manager is gone, dropped track end notification");
        }
    }
}
