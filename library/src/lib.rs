/*!
Client side of a two-party video call built on `WebRTC`.

# Overview

Two peers meet in a named room on the
[accompanying signaling relay](../gant_meet_signaling_server/index.html).
The one that joins second calls the one already waiting, both exchange offer, answer and
ICE candidates through the relay, and from then on camera, microphone and optionally a
screen capture flow directly between the browsers.

[`PeerConnectionManager`] drives all of it. It consumes a single ordered queue of
[`Input`]s and reports progress as [`CallEvent`]s. The browser is reached through a handful
of traits ([`PeerTransport`], [`MediaDevices`], [`SignalSender`]), implemented by the
`web` module on `wasm32` and by the in-memory [`loopback`] module everywhere else.

*/

#![allow(
    clippy::module_name_repetitions,
    clippy::future_not_send, // false positive in WASM (single threaded) context
)]
// clippy WARN level lints
#![warn(
    clippy::cargo,
    clippy::pedantic,
    clippy::dbg_macro,
    clippy::unwrap_used,
    clippy::integer_division,
    clippy::large_include_file,
    clippy::map_err_ignore,
    clippy::panic,
    clippy::todo,
    clippy::undocumented_unsafe_blocks,
    clippy::unimplemented,
    clippy::unreachable
)]
// clippy WARN level lints, that can be upgraded to DENY if preferred
#![warn(
    clippy::float_arithmetic,
    clippy::as_conversions,
    clippy::assertions_on_result_states,
    clippy::clone_on_ref_ptr,
    clippy::empty_drop,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::float_cmp_const,
    clippy::if_then_some_else_none,
    clippy::indexing_slicing,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::string_slice,
    clippy::try_err
)]
// clippy DENY level lints, they always have a quick fix that should be preferred
#![deny(
    clippy::wildcard_imports,
    clippy::multiple_inherent_impl,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_name_method,
    clippy::self_named_module_files,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::unnecessary_self_imports,
    clippy::unneeded_field_pattern,
    clippy::verbose_file_reads
)]

mod candidates;
pub(crate) mod constants;
mod error;
mod events;
pub mod loopback;
mod manager;
mod media;
mod peer;
mod transport;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use candidates::{CandidateBuffer, RemoteDescription};
pub use constants::{DEFAULT_STUN_SERVER, MAX_BUFFERED_CANDIDATES};
pub use error::{Error, Result};
pub use events::{
    CallEvent, CallState, Command, ConnectionState, Input, InputReceiver, InputSender,
    TrackEndedSink, TransportEventSink,
};
pub use gant_meet_protocol::{
    IceCandidate, MediaId, PeerId, RoomId, SdpType, SessionDescription, SignalMessage, Target,
    TrackDescriptor, TrackId, TrackKind, TrackPurpose,
};
pub use manager::{CallConfig, PeerConnectionManager, SignalSender};
pub use media::{swap_outbound_video, LocalTrack, MediaDevices, MediaTrackController, ScreenShareMode};
pub use peer::{CandidateOutcome, PeerConnection, Role};
pub use transport::{
    ConnectionId, ConnectionType, IceConnectionState, PeerTransport, PeerTransportFactory,
    RemoteTrack, RtpSender, SenderId, TransportEvent,
};
