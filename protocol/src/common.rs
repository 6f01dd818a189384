use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted room name, counted in characters.
pub const MAX_ROOM_ID_LEN: usize = 64;

/// Name of a room that peers meet in.
///
/// Names are case-sensitive. Surrounding whitespace is trimmed when the value
/// crosses the wire or is parsed, so `" room-42 "` and `"room-42"` are the same room.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

/// Reason a string was refused as a [`RoomId`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InvalidRoomId {
    /// Nothing left after trimming whitespace
    Empty,
    /// Longer than [`MAX_ROOM_ID_LEN`] characters
    TooLong(usize),
    /// Contains a control character
    ControlCharacter,
}

impl Display for InvalidRoomId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Empty => write!(f, "room id is empty"),
            Self::TooLong(len) => write!(
                f,
                "room id is {len} characters long, at most {MAX_ROOM_ID_LEN} allowed"
            ),
            Self::ControlCharacter => write!(f, "room id contains a control character"),
        }
    }
}

impl std::error::Error for InvalidRoomId {}

impl RoomId {
    /// Normalize and validate a room name.
    ///
    /// # Errors
    /// Fails if the trimmed name is empty, too long or contains control characters.
    pub fn parse(raw: &str) -> Result<Self, InvalidRoomId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidRoomId::Empty);
        }
        let len = trimmed.chars().count();
        if len > MAX_ROOM_ID_LEN {
            return Err(InvalidRoomId::TooLong(len));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(InvalidRoomId::ControlCharacter);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Return reference to the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = InvalidRoomId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(room_id: RoomId) -> Self {
        room_id.0
    }
}

impl FromStr for RoomId {
    type Err = InvalidRoomId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for RoomId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier the relay assigns to each live connection.
///
/// It is never reused, so a stale identifier can only miss, never hit another peer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Generate a fresh random identifier
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing `Uuid`
    #[must_use]
    pub const fn new(inner: Uuid) -> Self {
        Self(inner)
    }

    /// Acquire the underlying type
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn room_id_is_trimmed_and_keeps_case() {
        let room_id = RoomId::parse("  Room-42\t").unwrap();
        assert_eq!(room_id.as_str(), "Room-42");
        assert_ne!(room_id, RoomId::parse("room-42").unwrap());
    }

    #[test]
    fn invalid_room_ids_are_rejected() {
        assert_eq!(RoomId::parse("   "), Err(InvalidRoomId::Empty));
        assert_eq!(
            RoomId::parse(&"x".repeat(MAX_ROOM_ID_LEN + 1)),
            Err(InvalidRoomId::TooLong(MAX_ROOM_ID_LEN + 1))
        );
        assert_eq!(
            RoomId::parse("room\u{0}42"),
            Err(InvalidRoomId::ControlCharacter)
        );
    }

    #[test]
    fn room_id_is_validated_when_deserialized() {
        let room_id: RoomId = serde_json::from_str("\" aula-123 \"").unwrap();
        assert_eq!(room_id.as_str(), "aula-123");
        assert!(serde_json::from_str::<RoomId>("\"\"").is_err());
    }

    #[test]
    fn peer_ids_are_unique() {
        assert_ne!(PeerId::random(), PeerId::random());
    }
}
