//! Test suite for the Web and headless browsers.

#![cfg(target_arch = "wasm32")]

use futures::channel::mpsc;
use gant_meet::web::{WebSocketSignaling, WebTransportFactory};
use gant_meet::{
    ConnectionId, ConnectionType, Input, PeerId, PeerTransport, PeerTransportFactory, SdpType,
    TransportEventSink,
};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
async fn local_connection_creates_an_offer() {
    let (inputs, _receiver) = mpsc::unbounded::<Input>();
    let factory = WebTransportFactory::new(ConnectionType::Local);
    let transport = factory
        .create(
            &PeerId::random(),
            TransportEventSink::new(ConnectionId::new(1), inputs),
        )
        .unwrap();

    let offer = transport.create_offer().await.unwrap();
    assert_eq!(offer.sdp_type, SdpType::Offer);
    assert!(offer.sdp.starts_with("v=0"));
    transport.set_local_description(&offer).await.unwrap();
    assert!(transport.senders().is_empty());
    transport.close();
}

#[wasm_bindgen_test]
async fn answer_needs_a_remote_offer() {
    let (inputs, _receiver) = mpsc::unbounded::<Input>();
    let transport = WebTransportFactory::default()
        .create(
            &PeerId::random(),
            TransportEventSink::new(ConnectionId::new(2), inputs),
        )
        .unwrap();
    assert!(transport.create_answer().await.is_err());
}

#[wasm_bindgen_test]
fn invalid_signaling_url_is_rejected() {
    assert!(WebSocketSignaling::connect("not a url").is_err());
}
