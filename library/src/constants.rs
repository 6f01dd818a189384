pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Candidates kept per sender while no connection object for it exists yet.
pub const MAX_BUFFERED_CANDIDATES: usize = 128;
