//! Ring Wire Protocol
//!
//! Every inter-node exchange opens a fresh connection and carries exactly one
//! [`Message`]. Only `enter` expects a reply ([`EnterReply`]); all other
//! messages are one-way and the connection is closed right after the write.
//! A direct admission takes one more frame: the candidate confirms with an
//! [`EntryAck`] before the admitting node commits the split.
//!
//! Messages are bincode-encoded (see [`codec`](super::codec)). Maps travel as
//! complete key-sorted snapshots, never diffs.

use serde::{Deserialize, Serialize};

use crate::ring::types::{Key, NodeId, NodeIdentity, PathTrace};
use crate::routing::report::OperationReport;
use crate::storage::store::KeySlice;

/// Identifier of one logical operation, constant across forwarding hops.
///
/// Receivers remember recent ids so that a retried delivery is applied once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OpId(pub String);

impl OpId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a candidate needs to install itself on the ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Admission {
    /// The admitting node's old predecessor (the admitting node itself on first entry).
    pub predecessor: NodeIdentity,
    /// The admitting node.
    pub successor: NodeIdentity,
    /// Nodes the `enter` request was forwarded through before admission.
    pub path: PathTrace,
    /// Keys of the candidate's new range, spliced out of the admitting node.
    pub keys: KeySlice,
    /// The admitting node was the sole ring member.
    pub first_entry: bool,
}

/// Notification sent by a node that is leaving the ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExitNotice {
    /// "You are my successor": adopt my predecessor and absorb my keys.
    ToSuccessor {
        predecessor: NodeIdentity,
        keys: KeySlice,
    },
    /// "You are my predecessor": adopt my successor.
    ToPredecessor { successor: NodeIdentity },
    /// Sent to the only other ring member, which becomes the sole member.
    LastPeer { keys: KeySlice },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    /// Join request, from the candidate or forwarded node to node.
    Enter {
        op_id: OpId,
        candidate: NodeIdentity,
        path: PathTrace,
    },
    /// Admission delivered by a ring member to a candidate it did not talk to directly.
    Entrance(Admission),
    /// A forwarded join was rejected; delivered to the candidate.
    Refused { reason: String },
    /// Sent to a predecessor whose successor pointer must move.
    Successor { successor: NodeIdentity },
    Exit(ExitNotice),
    Lookup {
        op_id: OpId,
        key: Key,
        path: PathTrace,
    },
    Insert {
        op_id: OpId,
        key: Key,
        value: String,
        path: PathTrace,
    },
    Delete {
        op_id: OpId,
        key: Key,
        path: PathTrace,
    },
    /// Ring-wide listing. Stops once the successor is `origin`.
    Print {
        op_id: OpId,
        origin: NodeId,
        path: PathTrace,
    },
    /// Terminal node to bootstrap node: outcome of a routed operation.
    Report(OperationReport),
}

impl Message {
    /// Command tag of the message, for logs.
    pub fn command(&self) -> &'static str {
        match self {
            Message::Enter { .. } => "enter",
            Message::Entrance(_) => "entrance",
            Message::Refused { .. } => "refused",
            Message::Successor { .. } => "successor",
            Message::Exit(_) => "exit",
            Message::Lookup { .. } => "lookup",
            Message::Insert { .. } => "insert",
            Message::Delete { .. } => "delete",
            Message::Print { .. } => "print",
            Message::Report(report) => report.command(),
        }
    }

    /// Operation id of messages that may be retried along a forwarding chain.
    pub fn op_id(&self) -> Option<&OpId> {
        match self {
            Message::Enter { op_id, .. }
            | Message::Lookup { op_id, .. }
            | Message::Insert { op_id, .. }
            | Message::Delete { op_id, .. }
            | Message::Print { op_id, .. } => Some(op_id),
            _ => None,
        }
    }

    pub fn expects_reply(&self) -> bool {
        matches!(self, Message::Enter { .. })
    }
}

/// Sent back by a directly admitted candidate, on the `enter` connection,
/// once it has installed the admission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryAck {
    pub candidate: NodeId,
}

/// Reply to an `enter` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EnterReply {
    /// The receiver admitted the caller directly. The caller answers with an
    /// [`EntryAck`] on the same connection.
    Admitted(Admission),
    /// The request moved on; admission (or refusal) arrives later as `Entrance` / `Refused`.
    Pending,
    Refused(String),
}
