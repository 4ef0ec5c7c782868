//! Error taxonomy shared by every layer of the node.
//!
//! Application-level misses (a key that is not present) are never errors; they
//! travel as report variants. Everything here is a fault the caller can act on.

use std::time::Duration;

use crate::ring::types::{MAX_ID, NodeId};

pub type Result<T> = std::result::Result<T, RingError>;

#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Malformed or missing configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The connection to a peer could not be established, so nothing was delivered.
    #[error("peer {addr} unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A call to a peer did not complete within its deadline.
    #[error("call to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// Unexpected frame or message shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A membership step failed after local state had already been mutated.
    /// The ring may have a gap or an overlap until corrected.
    #[error("handoff with node {peer} failed, ring may be inconsistent: {source}")]
    Handoff {
        peer: NodeId,
        #[source]
        source: Box<RingError>,
    },

    #[error("node {0} is already a ring member")]
    AlreadyJoined(NodeId),

    #[error("node {0} is not a ring member")]
    NotJoined(NodeId),

    #[error("the bootstrap node never leaves the ring")]
    BootstrapCannotLeave,

    #[error("id {0} is outside [1, {max}]", max = MAX_ID)]
    IdOutOfBounds(u32),

    #[error("entry refused: {0}")]
    EntryRefused(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] bincode::Error),
}

impl RingError {
    /// True when the failure guarantees the peer never saw the message.
    pub fn is_undelivered(&self) -> bool {
        matches!(self, RingError::Unreachable { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RingError::Timeout { .. })
    }

    pub fn handoff(peer: NodeId, source: RingError) -> Self {
        RingError::Handoff {
            peer,
            source: Box::new(source),
        }
    }
}
