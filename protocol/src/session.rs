use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Whether a session description proposes or accepts a session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Proposal made by the calling side
    Offer,
    /// Reply made by the called side
    Answer,
}

/// `SDP` blob together with its type, shaped like the browser's `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Raw `SDP` text, passed through the relay without modifications
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer description
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One network path proposed by a peer, shaped like the browser's `RTCIceCandidateInit`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// `candidate:` attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default)]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Identifier of a media track, as seen in the `SDP` `msid` attribute.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Wrap a raw track identifier
    #[must_use]
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Return reference to the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TrackId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identification tag (`a=mid`) of the `SDP` media section a track travels in.
///
/// Unlike a [`TrackId`] it is negotiated, so both peers see the same value.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    /// Wrap a raw media identification tag
    #[must_use]
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    /// Return reference to the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MediaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media type carried by a track.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Microphone or other sound source
    Audio,
    /// Camera or screen capture
    Video,
}

impl Display for TrackKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// What a track is used for, declared by the sending side.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackPurpose {
    /// Webcam video
    Camera,
    /// Microphone audio
    Microphone,
    /// Screen, window or tab capture
    Screen,
}

impl TrackPurpose {
    /// Purpose assumed for a track nobody described.
    #[must_use]
    pub const fn default_for(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Audio => Self::Microphone,
            TrackKind::Video => Self::Camera,
        }
    }
}

/// Tag attached to an offer or answer telling the receiver what each outbound track is.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    /// Media section the track is sent in
    pub mid: MediaId,
    /// Audio or video
    pub kind: TrackKind,
    /// Camera, microphone or screen
    pub purpose: TrackPurpose,
}
