/*!
Signaling messages exchanged between peers and the relay.

Messages in the first group are used to manage room membership, the second group carries
`WebRTC` negotiation, the last one is plain room traffic (chat and whiteboard) sharing the same socket.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{IceCandidate, MediaId, SessionDescription, TrackDescriptor, TrackPurpose};
use crate::{PeerId, RoomId};

/// Recipient of a negotiation message.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// Single peer, message is dropped if it is no longer connected
    Peer(PeerId),
    /// Every other member of the room the sender belongs to
    Room(RoomId),
}

/// `Enum` of every frame that travels over the signaling socket.
///
/// Fields named `caller` or `sender` are filled in by the relay with the identifier of the
/// connection the message came from, whatever the client put there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Relay tells a freshly connected client its identifier
    #[serde(rename_all = "camelCase")]
    Welcome {
        /// Identifier assigned to the receiving connection
        peer_id: PeerId,
    },

    /// Client asks to become a member of a room
    #[serde(rename_all = "camelCase")]
    Join {
        /// Room to enter, created on first join
        room_id: RoomId,
        /// Shared secret, only checked when the relay is configured with one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },

    /// Client leaves a room without closing the socket
    #[serde(rename_all = "camelCase")]
    Leave {
        /// Room to leave
        room_id: RoomId,
    },

    /// Relay tells a joining client who already occupies the room
    #[serde(rename_all = "camelCase")]
    OtherUser {
        /// Identifier of the occupant that should be called
        peer_id: PeerId,
    },

    /// `SDP` offer passed to the target without modifications
    #[serde(rename_all = "camelCase")]
    Offer {
        /// Peer or whole room
        target: Target,
        /// Offering peer
        #[serde(default)]
        caller: Option<PeerId>,
        /// Local description of the offering peer
        sdp: SessionDescription,
        /// Purpose of each track the offering peer sends
        #[serde(default)]
        tracks: Vec<TrackDescriptor>,
        /// Set when the offer updates an already established connection
        #[serde(default)]
        renegotiate: bool,
    },

    /// `SDP` answer passed to the target without modifications
    #[serde(rename_all = "camelCase")]
    Answer {
        /// Peer that sent the offer
        target: PeerId,
        /// Answering peer
        #[serde(default)]
        caller: Option<PeerId>,
        /// Local description of the answering peer
        sdp: SessionDescription,
        /// Purpose of each track the answering peer sends
        #[serde(default)]
        tracks: Vec<TrackDescriptor>,
    },

    /// Proposed ICE candidate of one peer passed to the other one without modifications
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        /// Peer the candidate is meant for
        target: PeerId,
        /// Peer that discovered the candidate
        #[serde(default)]
        sender: Option<PeerId>,
        /// Candidate itself
        candidate: IceCandidate,
    },

    /// The outbound video in media section `mid` now carries a different source
    #[serde(rename_all = "camelCase")]
    VideoSource {
        /// Peer receiving the video
        target: PeerId,
        /// Peer sending the video
        #[serde(default)]
        sender: Option<PeerId>,
        /// Media section of the video slot
        mid: MediaId,
        /// What the slot carries from now on
        purpose: TrackPurpose,
    },

    /// Chat line for every other member of the room
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        /// Room the message is meant for
        room_id: RoomId,
        /// Author
        #[serde(default)]
        sender: Option<PeerId>,
        /// Message text
        text: String,
    },

    /// Whiteboard stroke for every other member of the room
    #[serde(rename_all = "camelCase")]
    Draw {
        /// Room the stroke is meant for
        room_id: RoomId,
        /// Author
        #[serde(default)]
        sender: Option<PeerId>,
        /// Stroke data, never inspected by the relay
        data: Value,
    },

    /// Whiteboard wipe for every other member of the room
    #[serde(rename_all = "camelCase")]
    ClearBoard {
        /// Room whose board is cleared
        room_id: RoomId,
        /// Author
        #[serde(default)]
        sender: Option<PeerId>,
    },

    /// Generic error containing detailed information about the cause
    Error {
        /// Human readable cause
        message: String,
    },
}

impl SignalMessage {
    /// Decode a single text frame.
    ///
    /// # Errors
    /// Fails on malformed JSON, unknown message types or invalid field values.
    pub fn decode(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }

    /// Encode as a single text frame.
    ///
    /// # Errors
    /// Only fails if the whiteboard payload cannot be represented as JSON.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Wire name of the message, handy for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match *self {
            Self::Welcome { .. } => "welcome",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::OtherUser { .. } => "other-user",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::VideoSource { .. } => "video-source",
            Self::ChatMessage { .. } => "chat-message",
            Self::Draw { .. } => "draw",
            Self::ClearBoard { .. } => "clear-board",
            Self::Error { .. } => "error",
        }
    }

    /// Overwrite the author field of relayed messages with `peer_id`.
    #[must_use]
    pub fn stamped(mut self, peer_id: PeerId) -> Self {
        match self {
            Self::Offer { ref mut caller, .. } | Self::Answer { ref mut caller, .. } => {
                *caller = Some(peer_id);
            }
            Self::IceCandidate { ref mut sender, .. }
            | Self::VideoSource { ref mut sender, .. }
            | Self::ChatMessage { ref mut sender, .. }
            | Self::Draw { ref mut sender, .. }
            | Self::ClearBoard { ref mut sender, .. } => *sender = Some(peer_id),
            Self::Welcome { .. }
            | Self::Join { .. }
            | Self::Leave { .. }
            | Self::OtherUser { .. }
            | Self::Error { .. } => {}
        }
        self
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::session::TrackKind;

    #[test]
    fn join_uses_kebab_case_tag_and_camel_case_fields() {
        let message = SignalMessage::decode(r#"{"type":"join","roomId":"room-42"}"#).unwrap();
        assert_eq!(
            message,
            SignalMessage::Join {
                room_id: RoomId::parse("room-42").unwrap(),
                secret: None,
            }
        );
    }

    #[test]
    fn offer_to_room_decodes_with_defaults() {
        let message = SignalMessage::decode(
            r#"{"type":"offer","target":{"room":"room-42"},"sdp":{"type":"offer","sdp":"v=0"}}"#,
        )
        .unwrap();
        match message {
            SignalMessage::Offer {
                target,
                caller,
                tracks,
                renegotiate,
                ..
            } => {
                assert_eq!(target, Target::Room(RoomId::parse("room-42").unwrap()));
                assert_eq!(caller, None);
                assert!(tracks.is_empty());
                assert!(!renegotiate);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unknown_type_and_invalid_room_are_rejected() {
        assert!(SignalMessage::decode(r#"{"type":"hang-up"}"#).is_err());
        assert!(SignalMessage::decode(r#"{"type":"join","roomId":"  "}"#).is_err());
        assert!(SignalMessage::decode(r#"{"type":"answer","sdp":{"type":"answer","sdp":""}}"#).is_err());
    }

    #[test]
    fn stamping_overwrites_claimed_author() {
        let liar = PeerId::random();
        let real = PeerId::random();
        let message = SignalMessage::IceCandidate {
            target: PeerId::random(),
            sender: Some(liar),
            candidate: IceCandidate {
                candidate: String::new(),
                sdp_mid: None,
                sdp_m_line_index: None,
            },
        }
        .stamped(real);
        assert!(matches!(message, SignalMessage::IceCandidate { sender: Some(id), .. } if id == real));
    }

    #[test]
    fn video_source_wire_shape() {
        let target = PeerId::random();
        let message = SignalMessage::VideoSource {
            target,
            sender: None,
            mid: MediaId::new("0"),
            purpose: TrackPurpose::Screen,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "video-source",
                "target": target.to_string(),
                "sender": null,
                "mid": "0",
                "purpose": "screen"
            })
        );
        assert_eq!(message.kind(), "video-source");
        let descriptor = TrackDescriptor {
            mid: MediaId::new("1"),
            kind: TrackKind::Audio,
            purpose: TrackPurpose::Microphone,
        };
        assert_eq!(
            serde_json::to_value(descriptor).unwrap(),
            json!({ "mid": "1", "kind": "audio", "purpose": "microphone" })
        );
    }
}
