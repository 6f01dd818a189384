/*!
Helper crate that declares the types shared between the [gant-meet](../gant_meet/index.html) client library
and the [gant-meet-signaling-server](../gant_meet_signaling_server/index.html) relay.

Every frame on the signaling WebSocket is a single JSON encoded [`SignalMessage`].
*/

#![warn(missing_docs)]

mod common;
mod session;
mod signal;

pub use common::{InvalidRoomId, PeerId, RoomId, MAX_ROOM_ID_LEN};
pub use session::{
    IceCandidate, MediaId, SdpType, SessionDescription, TrackDescriptor, TrackId, TrackKind,
    TrackPurpose,
};
pub use signal::{SignalMessage, Target};
