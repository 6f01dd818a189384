use std::fmt::{Display, Formatter};

/// Errors surfaced by call setup and negotiation.
///
/// Early ICE candidates are not an error, they are buffered until the remote description exists.
/// Undeliverable signaling is not one either, the relay drops it silently.
#[derive(Debug)]
pub enum Error {
    /// User declined camera/microphone or screen capture, or no device exists
    MediaAccessDenied(String),
    /// Screen picker was dismissed without choosing a source
    NoSourceSelected,
    /// Remote session description was malformed or incompatible
    RemoteDescriptionRejected(String),
    /// Operation needs an active call
    NotInCall,
    /// Message could not be handed to the signaling socket
    Signaling(String),
    /// Any other failure reported by the platform's peer transport
    Transport(anyhow::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::MediaAccessDenied(ref reason) => write!(f, "media access denied: {reason}"),
            Self::NoSourceSelected => write!(f, "no screen capture source selected"),
            Self::RemoteDescriptionRejected(ref reason) => {
                write!(f, "remote description rejected: {reason}")
            }
            Self::NotInCall => write!(f, "not in a call"),
            Self::Signaling(ref reason) => write!(f, "signaling error: {reason}"),
            Self::Transport(ref err) => write!(f, "peer transport error: {err:#}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Transport(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Signaling(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
