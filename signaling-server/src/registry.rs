use std::collections::{BTreeSet, HashMap};

use gant_meet_protocol::{PeerId, RoomId};

/// What happened when a peer joined a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The only other member, present when exactly one peer was already waiting
    pub occupant: Option<PeerId>,
    /// Room the peer had to leave in order to join the new one
    pub left: Option<RoomId>,
    /// Members after the join, the joining peer included
    pub members: usize,
}

/// Room membership table.
///
/// Rooms exist only while they have members, a peer belongs to at most one room at a time.
/// Owned by whoever needs it, so it can be tested directly and swapped for a shared store later.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, BTreeSet<PeerId>>,
    memberships: HashMap<PeerId, RoomId>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `peer_id` to `room_id`, creating the room if needed.
    /// Leaves the previously joined room first.
    pub fn join(&mut self, peer_id: PeerId, room_id: RoomId) -> JoinOutcome {
        let current = self.memberships.get(&peer_id).cloned();
        let left = match current {
            Some(current) if current != room_id => self.disconnect(peer_id),
            _ => None,
        };

        let members = self.rooms.entry(room_id.clone()).or_default();
        let mut others = members.iter().filter(|member| **member != peer_id);
        let occupant = match (others.next(), others.next()) {
            (Some(occupant), None) => Some(*occupant),
            _ => None,
        };
        members.insert(peer_id);
        let members = members.len();
        self.memberships.insert(peer_id, room_id);

        JoinOutcome {
            occupant,
            left,
            members,
        }
    }

    /// Remove `peer_id` from `room_id`. Returns whether it was a member.
    pub fn leave(&mut self, peer_id: PeerId, room_id: &RoomId) -> bool {
        if self.memberships.get(&peer_id) != Some(room_id) {
            return false;
        }
        self.disconnect(peer_id).is_some()
    }

    /// Remove `peer_id` from whatever room it is in, returning that room.
    pub fn disconnect(&mut self, peer_id: PeerId) -> Option<RoomId> {
        let room_id = self.memberships.remove(&peer_id)?;
        if let Some(members) = self.rooms.get_mut(&room_id) {
            members.remove(&peer_id);
            if members.is_empty() {
                self.rooms.remove(&room_id);
            }
        }
        Some(room_id)
    }

    pub fn members(&self, room_id: &RoomId) -> impl Iterator<Item = PeerId> + '_ {
        self.rooms
            .get(room_id)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    #[must_use]
    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map_or(0, BTreeSet::len)
    }

    #[must_use]
    pub fn room_of(&self, peer_id: PeerId) -> Option<&RoomId> {
        self.memberships.get(&peer_id)
    }

    #[must_use]
    pub fn is_member(&self, peer_id: PeerId, room_id: &RoomId) -> bool {
        self.room_of(peer_id) == Some(room_id)
    }

    /// Number of non-empty rooms
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
