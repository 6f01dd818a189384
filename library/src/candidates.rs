use std::collections::VecDeque;

use gant_meet_protocol::IceCandidate;

use crate::constants::MAX_BUFFERED_CANDIDATES;

/// Remote candidates that arrived before they could be applied, kept in arrival order.
#[derive(Debug, Clone)]
pub struct CandidateBuffer {
    candidates: VecDeque<IceCandidate>,
    capacity: usize,
}

impl Default for CandidateBuffer {
    fn default() -> Self {
        Self::with_capacity(MAX_BUFFERED_CANDIDATES)
    }
}

impl CandidateBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            candidates: VecDeque::new(),
            capacity,
        }
    }

    /// Returns `false` and drops the candidate when the buffer is full.
    pub fn push(&mut self, candidate: IceCandidate) -> bool {
        if self.candidates.len() >= self.capacity {
            return false;
        }
        self.candidates.push_back(candidate);
        true
    }

    /// Move everything from `other` to the back of this buffer.
    pub fn append(&mut self, other: Self) {
        for candidate in other.candidates {
            if !self.push(candidate) {
                break;
            }
        }
    }

    /// Take every candidate, oldest first.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.candidates.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Whether candidates can be handed to the transport right away.
#[derive(Debug, Clone)]
pub enum RemoteDescription {
    /// No remote description yet, candidates wait here
    Pending(CandidateBuffer),
    Applied,
}

impl Default for RemoteDescription {
    fn default() -> Self {
        Self::Pending(CandidateBuffer::new())
    }
}

impl RemoteDescription {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        match self {
            Self::Pending(buffer) => buffer.len(),
            Self::Applied => 0,
        }
    }

    /// Mark the description as applied and return what was waiting for it.
    pub fn apply(&mut self) -> Vec<IceCandidate> {
        match std::mem::replace(self, Self::Applied) {
            Self::Pending(mut buffer) => buffer.drain(),
            Self::Applied => Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn candidate(n: usize) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2130706431 10.0.0.{n} 5000 typ host"),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        }
    }

    #[test]
    fn drains_in_arrival_order() {
        let mut description = RemoteDescription::default();
        if let RemoteDescription::Pending(buffer) = &mut description {
            for n in 0..3 {
                assert!(buffer.push(candidate(n)));
            }
        }
        assert_eq!(description.buffered(), 3);

        let flushed = description.apply();
        assert_eq!(flushed, vec![candidate(0), candidate(1), candidate(2)]);
        assert!(description.is_applied());
        assert!(description.apply().is_empty());
    }

    #[test]
    fn full_buffer_drops_newest() {
        let mut buffer = CandidateBuffer::with_capacity(2);
        assert!(buffer.push(candidate(0)));
        assert!(buffer.push(candidate(1)));
        assert!(!buffer.push(candidate(2)));
        assert_eq!(buffer.drain(), vec![candidate(0), candidate(1)]);
        assert!(buffer.is_empty());
    }
}
