use std::fmt;

use tokio::sync::mpsc;

use crate::error::RingError;
use crate::ring::state::NodeSnapshot;
use crate::ring::types::{KeyRange, NodeId, NodeIdentity, PathTrace};
use crate::routing::report::OperationReport;
use crate::storage::store::KeySlice;

pub type EventSender = mpsc::UnboundedSender<NodeEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<NodeEvent>;

/// Things a node tells its operator about, outside of command replies.
#[derive(Debug)]
pub enum NodeEvent {
    /// This node completed its own join.
    Joined {
        snapshot: NodeSnapshot,
        path: PathTrace,
    },
    /// This node admitted `candidate` and handed it `handed`.
    Admitted {
        candidate: NodeIdentity,
        handed: KeyRange,
        first_entry: bool,
    },
    /// This node left the ring after serving `range`.
    Left { range: KeyRange },
    /// A forwarded join of this node was refused somewhere on the ring.
    EntryRefused { reason: String },
    /// A membership step failed after local state had changed.
    HandoffFailed { peer: NodeId, error: String },
    /// Result of a routed operation (bootstrap node only).
    Report(OperationReport),
    /// This node's share of a ring-wide `print`.
    Listing {
        server: NodeId,
        range: KeyRange,
        entries: KeySlice,
        path: PathTrace,
    },
}

impl NodeEvent {
    pub fn handoff_failed(error: &RingError) -> Option<Self> {
        match error {
            RingError::Handoff { peer, source } => Some(NodeEvent::HandoffFailed {
                peer: *peer,
                error: source.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEvent::Joined { snapshot, path } => {
                writeln!(f, "Successful entry")?;
                writeln!(f, "Range: {}", snapshot.range)?;
                writeln!(f, "Predecessor: {}", snapshot.predecessor.id)?;
                writeln!(f, "Successor: {}", snapshot.successor.id)?;
                write!(f, "Servers visited: {}", path)
            }
            NodeEvent::Admitted {
                candidate,
                handed,
                first_entry,
            } => {
                if *first_entry {
                    write!(f, "First entry: node {} now serves {}", candidate.id, handed)
                } else {
                    write!(f, "Node {} entered, serving {}", candidate.id, handed)
                }
            }
            NodeEvent::Left { range } => {
                writeln!(f, "Successful exit")?;
                write!(f, "Range handed over: {}", range)
            }
            NodeEvent::EntryRefused { reason } => write!(f, "Entry refused: {}", reason),
            NodeEvent::HandoffFailed { peer, error } => write!(
                f,
                "Handoff with node {} failed, ring may be inconsistent: {}",
                peer, error
            ),
            NodeEvent::Report(report) => write!(f, "{}", report),
            NodeEvent::Listing {
                server,
                range,
                entries,
                ..
            } => {
                write!(f, "Server {} range {}:", server, range)?;
                if entries.is_empty() {
                    write!(f, " (no keys)")?;
                }
                for (key, value) in entries {
                    write!(f, "\n  {} -> {}", key, value)?;
                }
                Ok(())
            }
        }
    }
}
