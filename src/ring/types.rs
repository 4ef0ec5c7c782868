use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::{Result, RingError};

/// Upper bound of the identifier space. Keys and joinable ids live in `[1, MAX_ID]`.
pub const MAX_ID: u32 = 1024;

/// Reserved identity of the bootstrap node. Never a valid key or joinable id.
pub const BOOTSTRAP_ID: NodeId = 0;

pub type NodeId = u32;
pub type Key = u32;

pub fn check_id(id: u32) -> Result<u32> {
    if (1..=MAX_ID).contains(&id) {
        Ok(id)
    } else {
        Err(RingError::IdOutOfBounds(id))
    }
}

/// Ring position plus the address peers use to reach the node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub address: IpAddr,
    pub port: u16,
}

impl NodeIdentity {
    pub fn new(id: NodeId, address: IpAddr, port: u16) -> Self {
        Self { id, address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn is_bootstrap(&self) -> bool {
        self.id == BOOTSTRAP_ID
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.address, self.port)
    }
}

/// Interval of ids a node serves, read circularly.
///
/// With `start <= end` the node owns `[start, end]`. With `start > end` the
/// interval wraps the space boundary and the node owns `[start, MAX_ID] ∪ [1, end]`.
/// A lone bootstrap node holds `start = 1, end = 0`, which covers every key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRange {
    pub start: u32,
    pub end: u32,
}

impl KeyRange {
    /// Range served by a node at `own` whose predecessor sits at `predecessor`.
    pub fn owned_by(predecessor: NodeId, own: NodeId) -> Self {
        Self {
            start: predecessor + 1,
            end: own,
        }
    }

    /// Range of a node that is not on the ring. Contains no key.
    pub fn none() -> Self {
        Self {
            start: MAX_ID + 1,
            end: BOOTSTRAP_ID,
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        if self.start <= self.end {
            id >= self.start && id <= self.end
        } else {
            id >= self.start || id <= self.end
        }
    }

    /// True when the range covers the whole key space.
    pub fn is_full(&self) -> bool {
        (1..=MAX_ID).all(|key| self.contains(key))
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A predecessor at MAX_ID yields start = MAX_ID + 1, which reads as 1.
        // An end at the reserved id 0 reads as MAX_ID.
        match (self.start > MAX_ID, self.end == BOOTSTRAP_ID) {
            (true, true) => write!(f, "[]"),
            (true, false) => write!(f, "[1,{}]", self.end),
            (false, true) => write!(f, "[{},{}]", self.start, MAX_ID),
            (false, false) => write!(f, "[{},{}]", self.start, self.end),
        }
    }
}

/// Ordered, append-only record of the nodes a request was forwarded through.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathTrace(pub Vec<NodeId>);

impl PathTrace {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, id: NodeId) {
        self.0.push(id);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }
}

impl fmt::Display for PathTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

impl From<Vec<NodeId>> for PathTrace {
    fn from(ids: Vec<NodeId>) -> Self {
        Self(ids)
    }
}
