use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use gant_meet_protocol::{IceCandidate, MediaId, SignalMessage, TrackId};
use log::{debug, error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    MediaStreamTrack, MessageEvent, RtcIceConnectionState, RtcPeerConnection,
    RtcPeerConnectionIceEvent, RtcTrackEvent, WebSocket,
};

use crate::events::{Input, InputSender, TrackEndedSink, TransportEventSink};
use crate::transport::{IceConnectionState, RemoteTrack, TransportEvent};
use crate::web::track_kind;

/// forward every gathered local candidate to the manager
pub fn set_peer_connection_on_ice_candidate(
    peer_connection: &RtcPeerConnection,
    events: TransportEventSink,
) {
    let on_ice_candidate: Box<dyn FnMut(RtcPeerConnectionIceEvent)> =
        Box::new(move |ev: RtcPeerConnectionIceEvent| {
            if let Some(candidate) = ev.candidate() {
                let candidate = IceCandidate {
                    candidate: candidate.candidate(),
                    sdp_mid: candidate.sdp_mid(),
                    sdp_m_line_index: candidate.sdp_m_line_index(),
                };
                debug!("gathered candidate: {:?}", candidate);
                events.emit(TransportEvent::LocalCandidate(candidate));
            }
        });
    let on_ice_candidate = Closure::wrap(on_ice_candidate);
    peer_connection.set_onicecandidate(Some(on_ice_candidate.as_ref().unchecked_ref()));
    on_ice_candidate.forget();
}

/// remote tracks are kept in `received` so the UI can render them
pub fn set_peer_connection_on_track(
    peer_connection: &RtcPeerConnection,
    events: TransportEventSink,
    received: Rc<RefCell<HashMap<TrackId, MediaStreamTrack>>>,
) {
    let on_track: Box<dyn FnMut(RtcTrackEvent)> = Box::new(move |ev: RtcTrackEvent| {
        let track = ev.track();
        let remote = RemoteTrack {
            id: TrackId::new(track.id()),
            mid: ev.transceiver().mid().map(MediaId::new),
            kind: track_kind(&track),
            label: track.label(),
        };
        info!("received remote {} track {}", remote.kind, remote.id);
        received.borrow_mut().insert(remote.id.clone(), track);
        events.emit(TransportEvent::RemoteTrack(remote));
    });
    let on_track = Closure::wrap(on_track);
    peer_connection.set_ontrack(Some(on_track.as_ref().unchecked_ref()));
    on_track.forget();
}

pub fn set_peer_connection_on_ice_connection_state_change(
    peer_connection: &RtcPeerConnection,
    events: TransportEventSink,
) {
    let peer_connection_clone = peer_connection.clone();
    let on_ice_connection_state_change: Box<dyn FnMut()> = Box::new(move || {
        let state = match peer_connection_clone.ice_connection_state() {
            RtcIceConnectionState::Checking => IceConnectionState::Checking,
            RtcIceConnectionState::Connected => IceConnectionState::Connected,
            RtcIceConnectionState::Completed => IceConnectionState::Completed,
            RtcIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RtcIceConnectionState::Failed => IceConnectionState::Failed,
            RtcIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::New,
        };
        debug!("ice connection state change: {:?}", state);
        events.emit(TransportEvent::IceConnectionStateChanged(state));
    });
    let on_ice_connection_state_change = Closure::wrap(on_ice_connection_state_change);
    peer_connection.set_oniceconnectionstatechange(Some(
        on_ice_connection_state_change.as_ref().unchecked_ref(),
    ));
    on_ice_connection_state_change.forget();
}

/// fires when the browser stops a capture, e.g. through its "stop sharing" button
pub fn set_track_on_ended(track: &MediaStreamTrack, ended: TrackEndedSink) {
    let track_id = TrackId::new(track.id());
    let on_ended: Box<dyn FnMut(JsValue)> = Box::new(move |_| {
        debug!("local track {} ended", track_id);
        ended.track_ended(track_id.clone());
    });
    let on_ended = Closure::wrap(on_ended);
    track.set_onended(Some(on_ended.as_ref().unchecked_ref()));
    on_ended.forget();
}

/// handle message sent by signaling server
pub fn set_websocket_on_message(websocket: &WebSocket, inputs: InputSender) {
    let on_message_callback: Box<dyn FnMut(MessageEvent)> = Box::new(move |ev: MessageEvent| {
        let Some(frame) = ev.data().as_string() else {
            warn!("ignoring non-text signaling frame");
            return;
        };
        match SignalMessage::decode(&frame) {
            Ok(message) => {
                if inputs.unbounded_send(Input::Signal(message)).is_err() {
                    error!("call session is gone, dropping signaling message");
                }
            }
            Err(err) => warn!("failed to deserialize signaling message: {err}"),
        }
    });
    let on_message_callback = Closure::wrap(on_message_callback);
    websocket.set_onmessage(Some(on_message_callback.as_ref().unchecked_ref()));
    on_message_callback.forget();
}

/// flush frames queued while the socket was connecting
pub fn set_websocket_on_open(websocket: &WebSocket, pending: Rc<RefCell<Vec<String>>>) {
    let websocket_clone = websocket.clone();
    let on_open_callback: Box<dyn FnMut(JsValue)> = Box::new(move |_| {
        info!("signaling socket open");
        for frame in pending.borrow_mut().drain(..) {
            if let Err(err) = websocket_clone.send_with_str(&frame) {
                error!("failed to send queued signaling message: {:?}", err);
            }
        }
    });
    let on_open_callback = Closure::wrap(on_open_callback);
    websocket.set_onopen(Some(on_open_callback.as_ref().unchecked_ref()));
    on_open_callback.forget();
}

pub fn set_websocket_on_close(websocket: &WebSocket) {
    let on_close: Box<dyn FnMut(JsValue)> = Box::new(move |_| {
        warn!("signaling socket closed");
    });
    let on_close = Closure::wrap(on_close);
    websocket.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    on_close.forget();
}
