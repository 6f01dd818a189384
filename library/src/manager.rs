/*!
The call state machine.

The peer that joins a room second always sends the offer, the occupant only answers.
Every signaling message, transport event and user command goes through [`PeerConnectionManager::dispatch`],
one at a time, so an offer can never race with its own candidates.
*/

use std::collections::HashMap;

use futures::channel::mpsc;
use futures::StreamExt;
use gant_meet_protocol::{
    IceCandidate, MediaId, PeerId, RoomId, SessionDescription, SignalMessage, Target,
    TrackDescriptor, TrackId, TrackPurpose,
};
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::candidates::CandidateBuffer;
use crate::error::{Error, Result};
use crate::events::{
    CallEvent, CallState, Command, ConnectionState, Input, InputReceiver, InputSender,
    TrackEndedSink, TransportEventSink,
};
use crate::media::{swap_outbound_video, LocalTrack, MediaDevices, MediaTrackController, ScreenShareMode};
use crate::peer::{CandidateOutcome, PeerConnection, Role};
use crate::transport::{ConnectionId, PeerTransportFactory, TransportEvent};

/// Outbound half of the signaling channel.
pub trait SignalSender {
    /// # Errors
    /// Fails if the message could not be handed to the socket.
    fn send(&self, message: SignalMessage) -> Result<()>;
}

/// Per-call settings.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub room_id: RoomId,
    /// Sent with the join, only needed when the relay requires one
    pub secret: Option<String>,
    pub screen_share: ScreenShareMode,
}

impl CallConfig {
    #[must_use]
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            secret: None,
            screen_share: ScreenShareMode::default(),
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    #[must_use]
    pub const fn with_screen_share(mut self, mode: ScreenShareMode) -> Self {
        self.screen_share = mode;
        self
    }
}

/// Owns local media and at most one connection to a remote peer.
pub struct PeerConnectionManager<F, D, S>
where
    F: PeerTransportFactory,
    D: MediaDevices<Track = F::Track>,
    S: SignalSender,
{
    config: CallConfig,
    factory: F,
    devices: D,
    signaling: S,
    inputs: InputSender,
    local_id: Option<PeerId>,
    call_state: CallState,
    media: MediaTrackController<F::Track>,
    connection: Option<PeerConnection<F::Transport>>,
    early_candidates: HashMap<PeerId, CandidateBuffer>,
    next_connection: u64,
    reported_state: ConnectionState,
    on_event: Box<dyn FnMut(CallEvent)>,
}

impl<F, D, S> PeerConnectionManager<F, D, S>
where
    F: PeerTransportFactory,
    D: MediaDevices<Track = F::Track>,
    S: SignalSender,
{
    /// Create a manager together with the receiving end of its input queue.
    /// Everything read from the receiver must be passed to [`Self::dispatch`] in order.
    pub fn new(
        config: CallConfig,
        factory: F,
        devices: D,
        signaling: S,
        on_event: impl FnMut(CallEvent) + 'static,
    ) -> (Self, InputReceiver) {
        let (inputs, receiver) = mpsc::unbounded();
        let manager = Self {
            config,
            factory,
            devices,
            signaling,
            inputs,
            local_id: None,
            call_state: CallState::Idle,
            media: MediaTrackController::new(),
            connection: None,
            early_candidates: HashMap::new(),
            next_connection: 0,
            reported_state: ConnectionState::Idle,
            on_event: Box::new(on_event),
        };
        (manager, receiver)
    }

    /// Process inputs until the queue closes.
    pub async fn run(mut self, mut inputs: InputReceiver) {
        while let Some(input) = inputs.next().await {
            if let Err(err) = self.dispatch(input).await {
                warn!("{err}");
            }
        }
    }

    /// # Errors
    /// Errors of user commands are returned, failed negotiations are reported as [`CallEvent`]s.
    pub async fn dispatch(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Signal(message) => self.handle_signal(message).await,
            Input::Transport(connection, event) => {
                self.handle_transport_event(connection, event);
                Ok(())
            }
            Input::TrackEnded(track_id) => self.handle_track_ended(&track_id).await,
            Input::Command(command) => self.handle_command(command).await,
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::StartCall => self.start_call().await,
            Command::EndCall => {
                self.end_call();
                Ok(())
            }
            Command::StartScreenShare => self.start_screen_share().await,
            Command::StopScreenShare => self.stop_screen_share().await,
            Command::ToggleScreenShare => {
                if self.media.is_sharing_screen() {
                    self.stop_screen_share().await
                } else {
                    self.start_screen_share().await
                }
            }
            Command::SendChat(text) => self.send_chat(text),
            Command::Draw(data) => self.draw(data),
            Command::ClearBoard => self.clear_board(),
        }
    }

    /// Acquire camera and microphone, then join the room.
    ///
    /// # Errors
    /// [`Error::MediaAccessDenied`] if media cannot be acquired. Nothing is held and no room is joined then.
    pub async fn start_call(&mut self) -> Result<()> {
        if self.call_state != CallState::Idle {
            debug!("call already started");
            return Ok(());
        }
        self.set_call_state(CallState::Starting);

        let acquired = self
            .media
            .acquire_camera_and_mic(&self.devices)
            .await
            .map(|_| ());
        if let Err(err) = acquired {
            warn!("cannot start call: {err}");
            self.media.release_all();
            self.set_call_state(CallState::Idle);
            if let Error::MediaAccessDenied(ref reason) = err {
                self.emit(CallEvent::MediaAccessDenied(reason.clone()));
            }
            return Err(err);
        }

        let join = SignalMessage::Join {
            room_id: self.config.room_id.clone(),
            secret: self.config.secret.clone(),
        };
        if let Err(err) = self.signaling.send(join) {
            self.media.release_all();
            self.set_call_state(CallState::Idle);
            return Err(err);
        }
        info!("joining room {}", self.config.room_id);
        self.set_call_state(CallState::Active);
        Ok(())
    }

    /// Release every local track, close the connection and leave the room.
    /// Calling it again, or without a call, does nothing.
    pub fn end_call(&mut self) {
        let was_in_call = self.call_state != CallState::Idle;
        self.media.release_all();
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.early_candidates.clear();
        if was_in_call {
            let leave = SignalMessage::Leave {
                room_id: self.config.room_id.clone(),
            };
            if let Err(err) = self.signaling.send(leave) {
                warn!("could not announce leaving: {err}");
            }
            info!("left room {}", self.config.room_id);
        }
        self.set_call_state(CallState::Idle);
        self.sync_connection_state();
    }

    /// # Errors
    /// [`Error::NotInCall`] outside a call, device errors if no screen could be captured.
    pub async fn start_screen_share(&mut self) -> Result<()> {
        self.require_call()?;
        if self.media.is_sharing_screen() {
            return Ok(());
        }
        let ended = TrackEndedSink::new(self.inputs.clone());
        let screen = match self.media.acquire_screen_share(&self.devices, ended).await {
            Ok(screen) => screen,
            Err(err) => {
                warn!("screen share failed: {err}");
                self.emit(CallEvent::ScreenShareFailed(err.to_string()));
                return Err(err);
            }
        };

        let published = match self.config.screen_share {
            ScreenShareMode::ReplaceCamera => self.swap_video(&screen, TrackPurpose::Screen).await,
            ScreenShareMode::AddTrack => self.add_screen_track(&screen).await,
        };
        if let Err(err) = published {
            warn!("screen could not be sent: {err}");
            self.media.release_screen();
            self.emit(CallEvent::ScreenShareFailed(err.to_string()));
            return Err(err);
        }
        self.emit(CallEvent::ScreenShareChanged(true));
        Ok(())
    }

    /// Stop the screen capture and go back to the camera. Does nothing if no screen is shared.
    ///
    /// # Errors
    /// Fails if the transport refuses to switch back.
    pub async fn stop_screen_share(&mut self) -> Result<()> {
        let Some(screen) = self.media.release_screen() else {
            return Ok(());
        };
        self.emit(CallEvent::ScreenShareChanged(false));
        if self.call_state != CallState::Active {
            return Ok(());
        }
        match self.config.screen_share {
            ScreenShareMode::ReplaceCamera => {
                if let Some(camera) = self.media.camera_video().cloned() {
                    self.swap_video(&camera, TrackPurpose::Camera).await?;
                }
            }
            ScreenShareMode::AddTrack => {
                let detached = match self.open_connection_mut() {
                    Some(connection) => connection.detach(&screen.id())?,
                    None => false,
                };
                if detached {
                    self.send_offer(true).await?;
                }
            }
        }
        Ok(())
    }

    /// # Errors
    /// [`Error::NotInCall`] outside a call.
    pub fn send_chat(&mut self, text: String) -> Result<()> {
        self.require_call()?;
        self.signaling.send(SignalMessage::ChatMessage {
            room_id: self.config.room_id.clone(),
            sender: self.local_id,
            text,
        })
    }

    /// # Errors
    /// [`Error::NotInCall`] outside a call.
    pub fn draw(&mut self, data: Value) -> Result<()> {
        self.require_call()?;
        self.signaling.send(SignalMessage::Draw {
            room_id: self.config.room_id.clone(),
            sender: self.local_id,
            data,
        })
    }

    /// # Errors
    /// [`Error::NotInCall`] outside a call.
    pub fn clear_board(&mut self) -> Result<()> {
        self.require_call()?;
        self.signaling.send(SignalMessage::ClearBoard {
            room_id: self.config.room_id.clone(),
            sender: self.local_id,
        })
    }

    async fn handle_signal(&mut self, message: SignalMessage) -> Result<()> {
        debug!("received {}", message.kind());
        match message {
            SignalMessage::Welcome { peer_id } => {
                info!("relay assigned id {peer_id}");
                self.local_id = Some(peer_id);
            }
            SignalMessage::OtherUser { peer_id } => self.call_peer(peer_id).await?,
            SignalMessage::Offer {
                caller: Some(caller),
                sdp,
                tracks,
                renegotiate,
                ..
            } => self.handle_offer(caller, &sdp, &tracks, renegotiate).await?,
            SignalMessage::Answer {
                caller: Some(caller),
                sdp,
                tracks,
                ..
            } => self.handle_answer(caller, &sdp, &tracks).await,
            SignalMessage::IceCandidate {
                sender: Some(sender),
                candidate,
                ..
            } => self.handle_remote_candidate(sender, candidate).await,
            SignalMessage::VideoSource {
                sender: Some(sender),
                mid,
                purpose,
                ..
            } => self.handle_video_source(sender, mid, purpose),
            SignalMessage::ChatMessage { sender, text, .. } => {
                self.emit(CallEvent::ChatMessage { sender, text });
            }
            SignalMessage::Draw { sender, data, .. } => self.emit(CallEvent::Draw { sender, data }),
            SignalMessage::ClearBoard { sender, .. } => self.emit(CallEvent::ClearBoard { sender }),
            SignalMessage::Error { message } => {
                warn!("relay reported: {message}");
                self.emit(CallEvent::RelayError(message));
            }
            message @ (SignalMessage::Offer { .. }
            | SignalMessage::Answer { .. }
            | SignalMessage::IceCandidate { .. }
            | SignalMessage::VideoSource { .. }) => {
                warn!("dropping {} without author", message.kind());
            }
            message @ (SignalMessage::Join { .. } | SignalMessage::Leave { .. }) => {
                warn!("dropping {} meant for the relay", message.kind());
            }
        }
        Ok(())
    }

    /// Another peer sits in the room we just joined, so we are the caller.
    async fn call_peer(&mut self, remote: PeerId) -> Result<()> {
        if self.call_state != CallState::Active {
            debug!("not in a call, ignoring occupant {remote}");
            return Ok(());
        }
        if self.local_id == Some(remote) {
            warn!("relay asked us to call ourselves");
            return Ok(());
        }
        info!("calling {remote}");
        self.open_connection(remote, Role::Caller)?;
        if let Err(err) = self.attach_local_media() {
            self.abandon(remote, &err);
            return Ok(());
        }
        self.send_offer(false).await
    }

    async fn handle_offer(
        &mut self,
        caller: PeerId,
        sdp: &SessionDescription,
        tracks: &[TrackDescriptor],
        renegotiate: bool,
    ) -> Result<()> {
        if self.call_state != CallState::Active {
            debug!("not in a call, ignoring offer from {caller}");
            return Ok(());
        }
        let in_place = renegotiate
            && self.connection.as_ref().map_or(false, |connection| {
                connection.remote() == caller
                    && connection.state() != ConnectionState::Closed
                    && connection.has_remote_description()
            });
        if in_place {
            debug!("renegotiating with {caller}");
        } else {
            info!("answering {caller}");
            self.open_connection(caller, Role::Callee)?;
        }

        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        connection.describe_remote_tracks(tracks);
        if let Err(err) = connection.apply_remote_description(sdp).await {
            self.abandon(caller, &err);
            return Ok(());
        }
        if !in_place {
            if let Err(err) = self.attach_local_media() {
                self.abandon(caller, &err);
                return Ok(());
            }
        }

        let screen = self.media.screen().map(LocalTrack::id);
        let Some(answering) = self.connection.as_mut() else {
            return Ok(());
        };
        let answer = match answering.create_answer().await {
            Ok(answer) => answer,
            Err(err) => {
                self.abandon(caller, &err);
                return Ok(());
            }
        };
        let tracks = answering.local_descriptors(screen.as_ref());
        self.signaling.send(SignalMessage::Answer {
            target: caller,
            caller: self.local_id,
            sdp: answer,
            tracks,
        })?;
        self.forget_removed_tracks();
        Ok(())
    }

    async fn handle_answer(
        &mut self,
        caller: PeerId,
        sdp: &SessionDescription,
        tracks: &[TrackDescriptor],
    ) {
        let Some(connection) = self.open_connection_mut().filter(|connection| {
            connection.remote() == caller && connection.is_awaiting_answer()
        }) else {
            warn!("unexpected answer from {caller}");
            return;
        };
        connection.describe_remote_tracks(tracks);
        if let Err(err) = connection.apply_remote_description(sdp).await {
            self.abandon(caller, &err);
            return;
        }
        self.forget_removed_tracks();
    }

    async fn handle_remote_candidate(&mut self, sender: PeerId, candidate: IceCandidate) {
        // Offers travel ahead of their candidates, so these belong to the closed session.
        let dead_session = self.connection.as_ref().map_or(false, |connection| {
            connection.remote() == sender && connection.state() == ConnectionState::Closed
        });
        if dead_session {
            debug!("dropping candidate from {sender} for a closed connection");
            return;
        }
        if let Some(connection) = self
            .open_connection_mut()
            .filter(|connection| connection.remote() == sender)
        {
            match connection.add_remote_candidate(candidate).await {
                Ok(CandidateOutcome::Applied) => debug!("applied candidate from {sender}"),
                Ok(CandidateOutcome::Buffered(waiting)) => {
                    debug!("buffered candidate from {sender}, {waiting} waiting");
                }
                Ok(CandidateOutcome::Dropped) => {}
                Err(err) => warn!("candidate from {sender} rejected: {err}"),
            }
            return;
        }

        if self.call_state != CallState::Active {
            debug!("not in a call, dropping candidate from {sender}");
            return;
        }
        let buffer = self.early_candidates.entry(sender).or_default();
        if buffer.push(candidate) {
            debug!("candidate from {sender} arrived before its offer, {} waiting", buffer.len());
        } else {
            warn!("too many early candidates from {sender}, dropping");
        }
    }

    fn handle_video_source(&mut self, sender: PeerId, mid: MediaId, purpose: TrackPurpose) {
        let Some(connection) = self
            .connection
            .as_mut()
            .filter(|connection| connection.remote() == sender)
        else {
            warn!("video source update from unknown peer {sender}");
            return;
        };
        let Some(track_id) = connection.set_remote_purpose(mid.clone(), purpose) else {
            debug!("nothing received in section {mid} from {sender} yet, remembered {purpose:?}");
            return;
        };
        self.emit(CallEvent::RemoteVideoSource {
            peer_id: sender,
            track_id,
            purpose,
        });
    }

    /// Report inbound tracks a completed negotiation removed.
    fn forget_removed_tracks(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let remote = connection.remote();
        for track in connection.sync_remote_tracks() {
            info!("{remote} stopped sending {} track {}", track.kind, track.id);
            self.emit(CallEvent::RemoteTrackRemoved {
                peer_id: remote,
                track_id: track.id,
            });
        }
    }

    fn handle_transport_event(&mut self, id: ConnectionId, event: TransportEvent) {
        let local_id = self.local_id;
        let Some(connection) = self
            .open_connection_mut()
            .filter(|connection| connection.id() == id)
        else {
            debug!("ignoring event of stale connection {id}");
            return;
        };
        let remote = connection.remote();
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let message = SignalMessage::IceCandidate {
                    target: remote,
                    sender: local_id,
                    candidate,
                };
                if let Err(err) = self.signaling.send(message) {
                    warn!("could not send candidate to {remote}: {err}");
                }
            }
            TransportEvent::RemoteTrack(track) => {
                let purpose = connection.on_remote_track(track.clone());
                info!("receiving {} track {} from {remote} as {purpose:?}", track.kind, track.id);
                self.emit(CallEvent::RemoteTrack {
                    peer_id: remote,
                    track,
                    purpose,
                });
            }
            TransportEvent::IceConnectionStateChanged(ice) => {
                debug!("connection {id} ice state {ice:?}");
                if connection.on_ice_state(ice) == Some(ConnectionState::Closed) {
                    info!("connection to {remote} lost, keeping local media");
                }
                self.sync_connection_state();
            }
        }
    }

    async fn handle_track_ended(&mut self, track_id: &TrackId) -> Result<()> {
        let is_screen = self
            .media
            .screen()
            .map_or(false, |screen| screen.id() == *track_id);
        if is_screen {
            info!("screen capture ended by the browser");
            self.stop_screen_share().await
        } else {
            debug!("local track {track_id} ended");
            Ok(())
        }
    }

    /// Create a fresh connection object to `remote`, closing whatever existed before.
    fn open_connection(&mut self, remote: PeerId, role: Role) -> Result<()> {
        if let Some(mut previous) = self.connection.take() {
            info!("replacing connection {} to {}", previous.id(), previous.remote());
            previous.close();
        }
        self.next_connection += 1;
        let id = ConnectionId::new(self.next_connection);
        let transport = self
            .factory
            .create(&remote, TransportEventSink::new(id, self.inputs.clone()))?;
        let mut connection = PeerConnection::new(id, remote, role, transport);
        if let Some(early) = self.early_candidates.remove(&remote) {
            debug!("connection {id} adopts {} early candidates", early.len());
            connection.adopt_candidates(early);
        }
        self.early_candidates.clear();
        self.connection = Some(connection);
        self.sync_connection_state();
        Ok(())
    }

    fn open_connection_mut(&mut self) -> Option<&mut PeerConnection<F::Transport>> {
        self.connection
            .as_mut()
            .filter(|connection| connection.state() != ConnectionState::Closed)
    }

    fn attach_local_media(&mut self) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::NotInCall);
        };
        for track in self.media.outbound_tracks(self.config.screen_share) {
            connection.attach(&track)?;
        }
        Ok(())
    }

    async fn send_offer(&mut self, renegotiate: bool) -> Result<()> {
        let screen = self.media.screen().map(LocalTrack::id);
        let Some(connection) = self.open_connection_mut() else {
            return Ok(());
        };
        let remote = connection.remote();
        match connection.create_offer().await {
            Ok(sdp) => {
                let tracks = connection.local_descriptors(screen.as_ref());
                self.signaling.send(SignalMessage::Offer {
                    target: Target::Peer(remote),
                    caller: self.local_id,
                    sdp,
                    tracks,
                    renegotiate,
                })
            }
            Err(err) => {
                self.abandon(remote, &err);
                Ok(())
            }
        }
    }

    /// Put `track` into the outbound video slot and tell the remote what it now shows.
    /// Without an open connection there is nothing to do, the next one picks the track up on its own.
    async fn swap_video(&mut self, track: &F::Track, purpose: TrackPurpose) -> Result<()> {
        let local_id = self.local_id;
        let Some(connection) = self.open_connection_mut() else {
            return Ok(());
        };
        let remote = connection.remote();
        let Some(sender) = swap_outbound_video(connection.transport(), track).await? else {
            warn!("connection to {remote} sends no video");
            return Ok(());
        };
        let Some(mid) = sender.mid else {
            debug!("video sender to {remote} not negotiated yet, the next offer describes it");
            return Ok(());
        };
        self.signaling.send(SignalMessage::VideoSource {
            target: remote,
            sender: local_id,
            mid,
            purpose,
        })
    }

    async fn add_screen_track(&mut self, screen: &F::Track) -> Result<()> {
        let Some(connection) = self.open_connection_mut() else {
            return Ok(());
        };
        connection.attach(screen)?;
        self.send_offer(true).await
    }

    fn abandon(&mut self, remote: PeerId, err: &Error) {
        error!("negotiation with {remote} abandoned: {err}");
        if let Some(connection) = self.connection.as_mut() {
            if connection.remote() == remote {
                connection.close();
            }
        }
        self.sync_connection_state();
        self.emit(CallEvent::NegotiationFailed {
            peer_id: remote,
            reason: err.to_string(),
        });
    }

    fn require_call(&self) -> Result<()> {
        if self.call_state == CallState::Active {
            Ok(())
        } else {
            Err(Error::NotInCall)
        }
    }

    fn set_call_state(&mut self, state: CallState) {
        if self.call_state != state {
            debug!("call state {:?} -> {state:?}", self.call_state);
            self.call_state = state;
            self.emit(CallEvent::CallStateChanged(state));
        }
    }

    fn sync_connection_state(&mut self) {
        let state = self.connection_state();
        if self.reported_state != state {
            info!("connection state {:?} -> {state:?}", self.reported_state);
            self.reported_state = state;
            self.emit(CallEvent::ConnectionStateChanged(state));
        }
    }

    fn emit(&mut self, event: CallEvent) {
        (self.on_event)(event);
    }

    pub const fn call_state(&self) -> CallState {
        self.call_state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Idle, PeerConnection::state)
    }

    pub const fn connection(&self) -> Option<&PeerConnection<F::Transport>> {
        self.connection.as_ref()
    }

    pub const fn local_id(&self) -> Option<PeerId> {
        self.local_id
    }

    pub const fn media(&self) -> &MediaTrackController<F::Track> {
        &self.media
    }

    pub const fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Sender feeding this manager's input queue.
    pub fn inputs(&self) -> InputSender {
        self.inputs.clone()
    }
}

impl<F, D, S> Drop for PeerConnectionManager<F, D, S>
where
    F: PeerTransportFactory,
    D: MediaDevices<Track = F::Track>,
    S: SignalSender,
{
    fn drop(&mut self) {
        self.media.release_all();
        if let Some(connection) = self.connection.as_mut() {
            connection.close();
        }
    }
}
