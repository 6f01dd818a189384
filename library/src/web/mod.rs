/*!
Browser implementation of the platform traits, plus [`CallSession`] tying them to a signaling socket.

```ignore
use gant_meet::web::{init_logging, CallSession};
use gant_meet::{CallConfig, ConnectionType, RoomId};

init_logging(log::Level::Debug);
let room_id = RoomId::parse("standup")?;
let call = CallSession::start(
    "ws://127.0.0.1:9001/ws",
    CallConfig::new(room_id),
    ConnectionType::default(),
    |event| log::info!("{event:?}"),
)?;
call.start_call()?;
```
*/

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::anyhow;
use async_trait::async_trait;
use gant_meet_protocol::{
    IceCandidate, MediaId, PeerId, SdpType, SessionDescription, SignalMessage, TrackId, TrackKind,
};
use js_sys::{Array, Object, Reflect};
use log::{debug, info};
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    DomException, MediaStream, MediaStreamConstraints, MediaStreamTrack, MediaStreamTrackState,
    RtcConfiguration, RtcIceCandidateInit, RtcPeerConnection, RtcRtpSender, RtcRtpTransceiver,
    RtcRtpTransceiverDirection, RtcSdpType, RtcSessionDescriptionInit, WebSocket,
};

use crate::error::{Error, Result};
use crate::events::{CallEvent, Command, Input, InputSender, TrackEndedSink, TransportEventSink};
use crate::manager::{CallConfig, PeerConnectionManager, SignalSender};
use crate::media::{LocalTrack, MediaDevices};
use crate::transport::{
    ConnectionType, PeerTransport, PeerTransportFactory, RemoteTrack, RtpSender, SenderId,
};

mod callbacks;

type ReceivedTracks = Rc<RefCell<HashMap<TrackId, MediaStreamTrack>>>;

/// Install browser logging and, if enabled, the panic hook. Call once at startup.
pub fn init_logging(level: log::Level) {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(level));
}

fn js_error(context: &str, error: &JsValue) -> anyhow::Error {
    anyhow!("{context}: {error:?}")
}

pub(crate) fn track_kind(track: &MediaStreamTrack) -> TrackKind {
    if track.kind() == "audio" {
        TrackKind::Audio
    } else {
        TrackKind::Video
    }
}

/// Capture track together with the stream it came from.
#[derive(Debug, Clone)]
pub struct WebTrack {
    track: MediaStreamTrack,
    stream: MediaStream,
}

impl WebTrack {
    #[must_use]
    pub const fn track(&self) -> &MediaStreamTrack {
        &self.track
    }

    #[must_use]
    pub const fn stream(&self) -> &MediaStream {
        &self.stream
    }
}

impl LocalTrack for WebTrack {
    fn id(&self) -> TrackId {
        TrackId::new(self.track.id())
    }

    fn kind(&self) -> TrackKind {
        track_kind(&self.track)
    }

    fn label(&self) -> String {
        self.track.label()
    }

    fn stop(&self) {
        self.track.stop();
    }

    fn is_live(&self) -> bool {
        self.track.ready_state() == MediaStreamTrackState::Live
    }
}

fn media_error(error: &JsValue) -> Error {
    let reason = error.dyn_ref::<DomException>().map_or_else(
        || format!("{error:?}"),
        |exception| format!("{}: {}", exception.name(), exception.message()),
    );
    Error::MediaAccessDenied(reason)
}

fn stream_tracks(stream: &MediaStream) -> Vec<WebTrack> {
    stream
        .get_tracks()
        .iter()
        .filter_map(|track| track.dyn_into::<MediaStreamTrack>().ok())
        .map(|track| WebTrack {
            track,
            stream: stream.clone(),
        })
        .collect()
}

/// `navigator.mediaDevices`.
#[derive(Debug, Clone, Default)]
pub struct WebMediaDevices {
    local: Rc<RefCell<Option<MediaStream>>>,
}

impl WebMediaDevices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn devices() -> Result<web_sys::MediaDevices> {
        web_sys::window()
            .ok_or_else(|| Error::MediaAccessDenied("no window available".to_owned()))?
            .navigator()
            .media_devices()
            .map_err(|error| media_error(&error))
    }

    /// Camera and microphone stream, for the local preview.
    #[must_use]
    pub fn local_stream(&self) -> Option<MediaStream> {
        self.local.borrow().clone()
    }
}

#[async_trait(?Send)]
impl MediaDevices for WebMediaDevices {
    type Track = WebTrack;

    async fn camera_and_microphone(&self) -> Result<Vec<WebTrack>> {
        let mut constraints = MediaStreamConstraints::new();
        constraints.audio(&JsValue::TRUE).video(&JsValue::TRUE);
        let promise = Self::devices()?
            .get_user_media_with_constraints(&constraints)
            .map_err(|error| media_error(&error))?;
        let stream: MediaStream = JsFuture::from(promise)
            .await
            .map_err(|error| media_error(&error))?
            .dyn_into()
            .map_err(|error| media_error(&error))?;
        let tracks = stream_tracks(&stream);
        if tracks.is_empty() {
            return Err(Error::MediaAccessDenied("no capture device".to_owned()));
        }
        *self.local.borrow_mut() = Some(stream);
        Ok(tracks)
    }

    async fn screen(&self, ended: TrackEndedSink) -> Result<WebTrack> {
        let promise = Self::devices()?
            .get_display_media()
            .map_err(|error| media_error(&error))?;
        let stream: MediaStream = match JsFuture::from(promise).await {
            Ok(stream) => stream.dyn_into().map_err(|error| media_error(&error))?,
            Err(error) => {
                let name = error.dyn_ref::<DomException>().map(DomException::name);
                return Err(match name.as_deref() {
                    Some("NotAllowedError" | "AbortError") => Error::NoSourceSelected,
                    _ => media_error(&error),
                });
            }
        };
        let screen = stream_tracks(&stream)
            .into_iter()
            .find(|track| track.kind() == TrackKind::Video)
            .ok_or(Error::NoSourceSelected)?;
        callbacks::set_track_on_ended(&screen.track, ended);
        Ok(screen)
    }
}

fn create_peer_connection(connection_type: &ConnectionType) -> anyhow::Result<RtcPeerConnection> {
    let ice_server = |urls: &str| -> anyhow::Result<Object> {
        let server_entry = Object::new();
        Reflect::set(&server_entry, &"urls".into(), &urls.into())
            .map_err(|error| js_error("failed to build ICE server entry", &error))?;
        Ok(server_entry)
    };
    let ice_servers = Array::new();
    match *connection_type {
        ConnectionType::Local => {
            return RtcPeerConnection::new()
                .map_err(|error| js_error("failed to create peer connection", &error));
        }
        ConnectionType::Stun { ref urls } => {
            ice_servers.push(&ice_server(urls.as_str())?);
        }
        ConnectionType::StunAndTurn {
            ref stun_urls,
            ref turn_urls,
            ref username,
            ref credential,
        } => {
            ice_servers.push(&ice_server(stun_urls.as_str())?);
            let turn = ice_server(turn_urls.as_str())?;
            Reflect::set(&turn, &"username".into(), &username.into())
                .and_then(|_| Reflect::set(&turn, &"credential".into(), &credential.into()))
                .map_err(|error| js_error("failed to build TURN server entry", &error))?;
            ice_servers.push(&turn);
        }
    }

    let mut rtc_configuration = RtcConfiguration::new();
    rtc_configuration.ice_servers(&ice_servers);
    RtcPeerConnection::new_with_configuration(&rtc_configuration)
        .map_err(|error| js_error("failed to create peer connection", &error))
}

const fn rtc_sdp_type(sdp_type: SdpType) -> RtcSdpType {
    match sdp_type {
        SdpType::Offer => RtcSdpType::Offer,
        SdpType::Answer => RtcSdpType::Answer,
    }
}

fn description_init(description: &SessionDescription) -> RtcSessionDescriptionInit {
    let mut init = RtcSessionDescriptionInit::new(rtc_sdp_type(description.sdp_type));
    init.sdp(&description.sdp);
    init
}

async fn sdp_of(promise: js_sys::Promise, context: &str) -> anyhow::Result<String> {
    let description = JsFuture::from(promise)
        .await
        .map_err(|error| js_error(context, &error))?;
    Reflect::get(&description, &JsValue::from_str("sdp"))
        .map_err(|error| js_error(context, &error))?
        .as_string()
        .ok_or_else(|| anyhow!("{context}: description without sdp"))
}

/// `RTCPeerConnection` to one remote peer.
#[derive(Debug)]
pub struct WebTransport {
    connection: RtcPeerConnection,
    senders: RefCell<Vec<(RtcRtpSender, TrackKind)>>,
}

impl WebTransport {
    fn sender(&self, sender: SenderId) -> anyhow::Result<RtcRtpSender> {
        self.senders
            .borrow()
            .get(sender.index())
            .map(|(rtc_sender, _)| rtc_sender.clone())
            .ok_or_else(|| anyhow!("unknown sender {}", sender.index()))
    }

    fn transceivers(&self) -> Vec<RtcRtpTransceiver> {
        self.connection
            .get_transceivers()
            .iter()
            .filter_map(|transceiver| transceiver.dyn_into::<RtcRtpTransceiver>().ok())
            .collect()
    }
}

#[async_trait(?Send)]
impl PeerTransport for WebTransport {
    type Track = WebTrack;

    async fn create_offer(&self) -> anyhow::Result<SessionDescription> {
        let sdp = sdp_of(self.connection.create_offer(), "failed to create an SDP offer").await?;
        Ok(SessionDescription::offer(sdp))
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        let sdp = sdp_of(self.connection.create_answer(), "failed to create an SDP answer").await?;
        Ok(SessionDescription::answer(sdp))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> anyhow::Result<()> {
        JsFuture::from(self.connection.set_local_description(&description_init(description)))
            .await
            .map_err(|error| js_error("failed to set local description", &error))?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> anyhow::Result<()> {
        JsFuture::from(self.connection.set_remote_description(&description_init(description)))
            .await
            .map_err(|error| js_error("failed to set remote description", &error))?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> anyhow::Result<()> {
        let mut init = RtcIceCandidateInit::new(&candidate.candidate);
        init.sdp_mid(candidate.sdp_mid.as_deref());
        init.sdp_m_line_index(candidate.sdp_m_line_index);
        JsFuture::from(
            self.connection
                .add_ice_candidate_with_opt_rtc_ice_candidate_init(Some(&init)),
        )
        .await
        .map_err(|error| js_error("failed to add ICE candidate", &error))?;
        Ok(())
    }

    fn add_track(&self, track: &WebTrack) -> anyhow::Result<SenderId> {
        self.connection.add_track_0(&track.track, &track.stream);
        let track_id = track.track.id();
        let rtc_sender = self
            .connection
            .get_senders()
            .iter()
            .filter_map(|sender| sender.dyn_into::<RtcRtpSender>().ok())
            .find(|sender| sender.track().map_or(false, |sent| sent.id() == track_id))
            .ok_or_else(|| anyhow!("track {track_id} was not added"))?;
        let mut senders = self.senders.borrow_mut();
        senders.push((rtc_sender, track.kind()));
        Ok(SenderId::new(senders.len() - 1))
    }

    fn remove_track(&self, sender: SenderId) -> anyhow::Result<()> {
        let rtc_sender = self.sender(sender)?;
        self.connection.remove_track(&rtc_sender);
        Ok(())
    }

    fn senders(&self) -> Vec<RtpSender> {
        let transceivers = self.transceivers();
        self.senders
            .borrow()
            .iter()
            .enumerate()
            .map(|(index, (rtc_sender, kind))| RtpSender {
                id: SenderId::new(index),
                track: rtc_sender.track().map(|track| TrackId::new(track.id())),
                kind: *kind,
                mid: transceivers
                    .iter()
                    .find(|transceiver| transceiver.sender() == *rtc_sender)
                    .and_then(RtcRtpTransceiver::mid)
                    .map(MediaId::new),
            })
            .collect()
    }

    fn receiving(&self) -> Vec<RemoteTrack> {
        self.transceivers()
            .into_iter()
            .filter(|transceiver| {
                matches!(
                    transceiver.current_direction(),
                    Some(RtcRtpTransceiverDirection::Sendrecv | RtcRtpTransceiverDirection::Recvonly)
                )
            })
            .map(|transceiver| {
                let track = transceiver.receiver().track();
                RemoteTrack {
                    id: TrackId::new(track.id()),
                    mid: transceiver.mid().map(MediaId::new),
                    kind: track_kind(&track),
                    label: track.label(),
                }
            })
            .collect()
    }

    async fn replace_track(&self, sender: SenderId, track: &WebTrack) -> anyhow::Result<()> {
        let rtc_sender = self.sender(sender)?;
        JsFuture::from(rtc_sender.replace_track(Some(&track.track)))
            .await
            .map_err(|error| js_error("failed to replace track", &error))?;
        Ok(())
    }

    fn close(&self) {
        self.connection.close();
    }
}

/// Creates `RTCPeerConnection`s with the configured ICE servers.
#[derive(Debug, Clone, Default)]
pub struct WebTransportFactory {
    connection_type: ConnectionType,
    received: ReceivedTracks,
}

impl WebTransportFactory {
    #[must_use]
    pub fn new(connection_type: ConnectionType) -> Self {
        Self {
            connection_type,
            received: ReceivedTracks::default(),
        }
    }

    /// Remote track as reported by [`CallEvent::RemoteTrack`], ready to be attached to a `<video>`.
    #[must_use]
    pub fn received_track(&self, track_id: &TrackId) -> Option<MediaStreamTrack> {
        self.received.borrow().get(track_id).cloned()
    }
}

impl PeerTransportFactory for WebTransportFactory {
    type Track = WebTrack;
    type Transport = WebTransport;

    fn create(&self, remote: &PeerId, events: TransportEventSink) -> anyhow::Result<WebTransport> {
        debug!("creating peer connection {} to {remote}", events.connection());
        let connection = create_peer_connection(&self.connection_type)?;
        callbacks::set_peer_connection_on_ice_candidate(&connection, events.clone());
        callbacks::set_peer_connection_on_track(&connection, events.clone(), Rc::clone(&self.received));
        callbacks::set_peer_connection_on_ice_connection_state_change(&connection, events);
        Ok(WebTransport {
            connection,
            senders: RefCell::new(Vec::new()),
        })
    }
}

/// Sends signaling frames over a `WebSocket`, queueing them until it opens.
#[derive(Debug, Clone)]
pub struct WebSocketSignaling {
    websocket: WebSocket,
    pending: Rc<RefCell<Vec<String>>>,
}

impl WebSocketSignaling {
    /// # Errors
    /// Fails if the URL is not a valid `WebSocket` URL.
    pub fn connect(url: &str) -> Result<Self> {
        let websocket =
            WebSocket::new(url).map_err(|error| Error::Signaling(format!("{error:?}")))?;
        let pending = Rc::new(RefCell::new(Vec::new()));
        callbacks::set_websocket_on_open(&websocket, Rc::clone(&pending));
        callbacks::set_websocket_on_close(&websocket);
        Ok(Self { websocket, pending })
    }
}

impl SignalSender for WebSocketSignaling {
    fn send(&self, message: SignalMessage) -> Result<()> {
        let frame = message.encode()?;
        if self.websocket.ready_state() == WebSocket::CONNECTING {
            self.pending.borrow_mut().push(frame);
            return Ok(());
        }
        self.websocket
            .send_with_str(&frame)
            .map_err(|error| Error::Signaling(format!("{error:?}")))
    }
}

/// Entry point for browser applications.
pub struct CallSession;

impl CallSession {
    /// Connect to the relay and start processing inputs in the background.
    ///
    /// # Errors
    /// Fails if the signaling socket cannot be created.
    pub fn start(
        signaling_url: &str,
        config: CallConfig,
        connection_type: ConnectionType,
        on_event: impl FnMut(CallEvent) + 'static,
    ) -> Result<CallHandle> {
        let signaling = WebSocketSignaling::connect(signaling_url)?;
        let websocket = signaling.websocket.clone();
        let factory = WebTransportFactory::new(connection_type);
        let devices = WebMediaDevices::new();
        let handle_factory = factory.clone();
        let handle_devices = devices.clone();

        let (manager, inputs) =
            PeerConnectionManager::new(config, factory, devices, signaling, on_event);
        let sender = manager.inputs();
        callbacks::set_websocket_on_message(&websocket, sender.clone());
        spawn_local(manager.run(inputs));
        info!("call session started against {signaling_url}");

        Ok(CallHandle {
            inputs: sender,
            websocket,
            factory: handle_factory,
            devices: handle_devices,
        })
    }
}

/// Cheap handle for issuing commands to a running [`CallSession`].
#[derive(Debug, Clone)]
pub struct CallHandle {
    inputs: InputSender,
    websocket: WebSocket,
    factory: WebTransportFactory,
    devices: WebMediaDevices,
}

impl CallHandle {
    fn command(&self, command: Command) -> Result<()> {
        self.inputs
            .unbounded_send(Input::Command(command))
            .map_err(|_| Error::Signaling("call session stopped".to_owned()))
    }

    /// # Errors
    /// Fails if the session stopped. Media errors are reported through [`CallEvent`]s.
    pub fn start_call(&self) -> Result<()> {
        self.command(Command::StartCall)
    }

    /// # Errors
    /// Fails if the session stopped.
    pub fn end_call(&self) -> Result<()> {
        self.command(Command::EndCall)
    }

    /// # Errors
    /// Fails if the session stopped.
    pub fn toggle_screen_share(&self) -> Result<()> {
        self.command(Command::ToggleScreenShare)
    }

    /// # Errors
    /// Fails if the session stopped.
    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.command(Command::SendChat(text.into()))
    }

    /// # Errors
    /// Fails if the session stopped.
    pub fn draw(&self, data: Value) -> Result<()> {
        self.command(Command::Draw(data))
    }

    /// # Errors
    /// Fails if the session stopped.
    pub fn clear_board(&self) -> Result<()> {
        self.command(Command::ClearBoard)
    }

    #[must_use]
    pub fn local_stream(&self) -> Option<MediaStream> {
        self.devices.local_stream()
    }

    #[must_use]
    pub fn remote_track(&self, track_id: &TrackId) -> Option<MediaStreamTrack> {
        self.factory.received_track(track_id)
    }

    /// End the call and close the signaling socket.
    ///
    /// # Errors
    /// Fails if the socket refuses to close.
    pub fn close(&self) -> Result<()> {
        self.end_call()?;
        self.websocket
            .close()
            .map_err(|error| Error::Signaling(format!("{error:?}")))
    }
}
