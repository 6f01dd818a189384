use std::collections::HashMap;

use anyhow::anyhow;
use gant_meet_protocol::{
    IceCandidate, MediaId, PeerId, SdpType, SessionDescription, TrackDescriptor, TrackId,
    TrackPurpose,
};
use log::{debug, warn};

use crate::candidates::{CandidateBuffer, RemoteDescription};
use crate::error::{Error, Result};
use crate::events::ConnectionState;
use crate::media::LocalTrack;
use crate::transport::{ConnectionId, IceConnectionState, PeerTransport, RemoteTrack, SenderId};

/// Which side of the exchange this peer plays. Decided once per connection, never flips.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    /// Joined the room second and sends the offer
    Caller,
    /// Was already in the room and only answers
    Callee,
}

/// What happened to a remote candidate handed to a connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CandidateOutcome {
    Applied,
    /// Waiting for the remote description, with the number of candidates now waiting
    Buffered(usize),
    /// Buffer was full
    Dropped,
}

/// One connection object to the remote peer together with its negotiation bookkeeping.
#[derive(Debug)]
pub struct PeerConnection<P: PeerTransport> {
    id: ConnectionId,
    remote: PeerId,
    role: Role,
    state: ConnectionState,
    transport: P,
    remote_description: RemoteDescription,
    local_tracks: Vec<(TrackId, SenderId)>,
    remote_tracks: Vec<RemoteTrack>,
    /// What the remote peer sends in each media section
    purposes: HashMap<MediaId, TrackPurpose>,
    awaiting_answer: bool,
}

impl<P: PeerTransport> PeerConnection<P> {
    pub fn new(id: ConnectionId, remote: PeerId, role: Role, transport: P) -> Self {
        Self {
            id,
            remote,
            role,
            state: ConnectionState::Negotiating,
            transport,
            remote_description: RemoteDescription::default(),
            local_tracks: Vec::new(),
            remote_tracks: Vec::new(),
            purposes: HashMap::new(),
            awaiting_answer: false,
        }
    }

    /// Start sending `track`. Attaching the same track twice is a no-op.
    ///
    /// # Errors
    /// Fails if the transport refuses the track.
    pub fn attach(&mut self, track: &P::Track) -> Result<()> {
        let track_id = track.id();
        if self.local_tracks.iter().any(|(id, _)| *id == track_id) {
            return Ok(());
        }
        let sender = self.transport.add_track(track)?;
        debug!("connection {} sends {} track {track_id}", self.id, track.kind());
        self.local_tracks.push((track_id, sender));
        Ok(())
    }

    /// Stop sending a previously attached track. Returns whether it was attached.
    ///
    /// # Errors
    /// Fails if the transport refuses to remove the sender.
    pub fn detach(&mut self, track_id: &TrackId) -> Result<bool> {
        let Some(position) = self.local_tracks.iter().position(|(id, _)| id == track_id) else {
            return Ok(false);
        };
        let (_, sender) = self.local_tracks.remove(position);
        self.transport.remove_track(sender)?;
        Ok(true)
    }

    /// Describe what each attached track carries right now, by the media section it is sent in.
    /// Senders not yet part of an applied local description are left out.
    pub fn local_descriptors(&self, screen: Option<&TrackId>) -> Vec<TrackDescriptor> {
        self.transport
            .senders()
            .into_iter()
            .filter(|sender| self.local_tracks.iter().any(|(_, id)| *id == sender.id))
            .filter_map(|sender| {
                let mid = sender.mid?;
                let current = sender.track.as_ref()?;
                let purpose = if Some(current) == screen {
                    TrackPurpose::Screen
                } else {
                    TrackPurpose::default_for(sender.kind)
                };
                Some(TrackDescriptor {
                    mid,
                    kind: sender.kind,
                    purpose,
                })
            })
            .collect()
    }

    /// Create an offer and apply it locally.
    ///
    /// # Errors
    /// Fails if the transport cannot produce or apply the offer.
    pub async fn create_offer(&mut self) -> Result<SessionDescription> {
        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(&offer).await?;
        self.awaiting_answer = true;
        Ok(offer)
    }

    /// Create an answer to the applied remote offer and apply it locally.
    ///
    /// # Errors
    /// Fails without a remote description or if the transport cannot produce the answer.
    pub async fn create_answer(&mut self) -> Result<SessionDescription> {
        if !self.remote_description.is_applied() {
            return Err(anyhow!("cannot answer before the remote offer is applied").into());
        }
        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(&answer).await?;
        Ok(answer)
    }

    /// Apply the remote description, then every candidate that was waiting for it, oldest first.
    ///
    /// # Errors
    /// [`Error::RemoteDescriptionRejected`] if the transport refuses the description.
    pub async fn apply_remote_description(&mut self, description: &SessionDescription) -> Result<()> {
        self.transport
            .set_remote_description(description)
            .await
            .map_err(|err| Error::RemoteDescriptionRejected(format!("{err:#}")))?;
        if description.sdp_type == SdpType::Answer {
            self.awaiting_answer = false;
        }

        let waiting = self.remote_description.apply();
        if !waiting.is_empty() {
            debug!(
                "connection {} applies {} buffered candidates",
                self.id,
                waiting.len()
            );
        }
        for candidate in waiting {
            if let Err(err) = self.transport.add_ice_candidate(&candidate).await {
                warn!("buffered candidate rejected on connection {}: {err:#}", self.id);
            }
        }
        Ok(())
    }

    /// Apply a remote candidate, or keep it until the remote description exists.
    ///
    /// # Errors
    /// Fails if the transport rejects a candidate it should have accepted.
    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<CandidateOutcome> {
        match self.remote_description {
            RemoteDescription::Pending(ref mut buffer) => {
                if buffer.push(candidate) {
                    Ok(CandidateOutcome::Buffered(buffer.len()))
                } else {
                    warn!("candidate buffer of connection {} is full", self.id);
                    Ok(CandidateOutcome::Dropped)
                }
            }
            RemoteDescription::Applied => {
                self.transport.add_ice_candidate(&candidate).await?;
                Ok(CandidateOutcome::Applied)
            }
        }
    }

    /// Take over candidates that arrived before this connection existed.
    pub fn adopt_candidates(&mut self, early: CandidateBuffer) {
        if let RemoteDescription::Pending(ref mut buffer) = self.remote_description {
            buffer.append(early);
        }
    }

    /// Remember what the remote peer said each of its tracks is for.
    pub fn describe_remote_tracks(&mut self, descriptors: &[TrackDescriptor]) {
        for descriptor in descriptors {
            self.purposes.insert(descriptor.mid.clone(), descriptor.purpose);
        }
    }

    /// Record a new purpose for media section `mid`.
    /// Returns the local id of the track received there, if it already arrived.
    pub fn set_remote_purpose(&mut self, mid: MediaId, purpose: TrackPurpose) -> Option<TrackId> {
        let track_id = self
            .remote_tracks
            .iter()
            .find(|track| track.mid.as_ref() == Some(&mid))
            .map(|track| track.id.clone());
        self.purposes.insert(mid, purpose);
        track_id
    }

    /// Record an inbound track and work out what it is for.
    pub fn on_remote_track(&mut self, track: RemoteTrack) -> TrackPurpose {
        let purpose = track
            .mid
            .as_ref()
            .and_then(|mid| self.remote_purpose(mid))
            .unwrap_or_else(|| TrackPurpose::default_for(track.kind));
        self.remote_tracks.retain(|known| known.id != track.id);
        self.remote_tracks.push(track);
        purpose
    }

    pub fn remote_purpose(&self, mid: &MediaId) -> Option<TrackPurpose> {
        self.purposes.get(mid).copied()
    }

    /// Forget inbound tracks the negotiated session no longer carries and return them.
    pub fn sync_remote_tracks(&mut self) -> Vec<RemoteTrack> {
        let receiving = self.transport.receiving();
        let (kept, removed): (Vec<_>, Vec<_>) = self
            .remote_tracks
            .drain(..)
            .partition(|track| receiving.iter().any(|live| live.id == track.id));
        self.remote_tracks = kept;
        removed
    }

    /// Returns the new state if it changed.
    pub fn on_ice_state(&mut self, ice: IceConnectionState) -> Option<ConnectionState> {
        let next = match ice {
            IceConnectionState::Connected | IceConnectionState::Completed => ConnectionState::Connected,
            IceConnectionState::Failed | IceConnectionState::Closed => ConnectionState::Closed,
            IceConnectionState::New
            | IceConnectionState::Checking
            | IceConnectionState::Disconnected => return None,
        };
        if next == self.state {
            return None;
        }
        if next == ConnectionState::Closed {
            self.close();
        } else {
            self.state = next;
        }
        Some(next)
    }

    /// Close the transport. Closing twice does nothing.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            debug!("closing connection {} to {}", self.id, self.remote);
            self.transport.close();
            self.state = ConnectionState::Closed;
        }
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    pub const fn remote(&self) -> PeerId {
        self.remote
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub const fn transport(&self) -> &P {
        &self.transport
    }

    pub fn remote_tracks(&self) -> &[RemoteTrack] {
        &self.remote_tracks
    }

    pub const fn is_awaiting_answer(&self) -> bool {
        self.awaiting_answer
    }

    pub const fn has_remote_description(&self) -> bool {
        self.remote_description.is_applied()
    }

    pub fn buffered_candidates(&self) -> usize {
        self.remote_description.buffered()
    }
}

#[cfg(test)]
mod test {
    use futures::channel::mpsc;
    use gant_meet_protocol::PeerId;

    use super::*;
    use crate::events::TransportEventSink;
    use crate::loopback::LoopbackNetwork;
    use crate::transport::PeerTransportFactory;

    fn candidate(n: u8) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2130706431 192.168.0.{n} 5000 typ host"),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        }
    }

    #[tokio::test]
    async fn early_candidates_wait_for_remote_description() {
        let network = LoopbackNetwork::new();
        let (local, remote) = (PeerId::random(), PeerId::random());
        let (inputs, _receiver) = mpsc::unbounded();
        let id = ConnectionId::new(1);
        let transport = network
            .factory(local)
            .create(&remote, TransportEventSink::new(id, inputs))
            .unwrap();
        let mut connection = PeerConnection::new(id, remote, Role::Callee, transport);

        assert_eq!(
            connection.add_remote_candidate(candidate(1)).await.unwrap(),
            CandidateOutcome::Buffered(1)
        );
        assert_eq!(
            connection.add_remote_candidate(candidate(2)).await.unwrap(),
            CandidateOutcome::Buffered(2)
        );
        assert!(connection.create_answer().await.is_err());

        connection
            .apply_remote_description(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap();

        let stats = network.stats(local, remote).unwrap();
        assert_eq!(stats.applied_candidates, vec![candidate(1), candidate(2)]);
        assert_eq!(stats.premature_candidates, 0);
        assert_eq!(connection.buffered_candidates(), 0);
        assert_eq!(
            connection.add_remote_candidate(candidate(3)).await.unwrap(),
            CandidateOutcome::Applied
        );
    }

    #[tokio::test]
    async fn malformed_description_is_rejected() {
        let network = LoopbackNetwork::new();
        let (local, remote) = (PeerId::random(), PeerId::random());
        let (inputs, _receiver) = mpsc::unbounded();
        let id = ConnectionId::new(7);
        let transport = network
            .factory(local)
            .create(&remote, TransportEventSink::new(id, inputs))
            .unwrap();
        let mut connection = PeerConnection::new(id, remote, Role::Callee, transport);

        let result = connection
            .apply_remote_description(&SessionDescription::offer("garbage"))
            .await;
        assert!(matches!(result, Err(Error::RemoteDescriptionRejected(_))));
        assert!(!connection.has_remote_description());

        connection.close();
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(network.stats(local, remote).unwrap().closed);
    }
}
