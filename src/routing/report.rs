use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::error::Result;
use crate::node::events::{EventSender, NodeEvent};
use crate::ring::types::{Key, NodeId, PathTrace};
use crate::transport::client::LinkClient;
use crate::transport::protocol::Message;

/// Outcome of a routed operation, produced by the node that owns the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OperationReport {
    Lookup {
        key: Key,
        value: Option<String>,
        server: NodeId,
        path: PathTrace,
    },
    Insert {
        key: Key,
        value: String,
        server: NodeId,
        path: PathTrace,
    },
    Delete {
        key: Key,
        deleted: bool,
        server: NodeId,
        path: PathTrace,
    },
    /// The request went all the way round without meeting an owner.
    Unroutable {
        operation: String,
        key: Option<Key>,
        path: PathTrace,
    },
}

impl OperationReport {
    pub fn command(&self) -> &'static str {
        match self {
            OperationReport::Lookup { .. } => "lookup-msg",
            OperationReport::Insert { .. } => "insert-msg",
            OperationReport::Delete { .. } => "delete-msg",
            OperationReport::Unroutable { .. } => "unroutable-msg",
        }
    }

    pub fn path(&self) -> &PathTrace {
        match self {
            OperationReport::Lookup { path, .. }
            | OperationReport::Insert { path, .. }
            | OperationReport::Delete { path, .. }
            | OperationReport::Unroutable { path, .. } => path,
        }
    }

    pub fn server(&self) -> Option<NodeId> {
        match self {
            OperationReport::Lookup { server, .. }
            | OperationReport::Insert { server, .. }
            | OperationReport::Delete { server, .. } => Some(*server),
            OperationReport::Unroutable { .. } => None,
        }
    }
}

impl fmt::Display for OperationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationReport::Lookup {
                value: Some(value),
                server,
                path,
                ..
            } => {
                writeln!(f, "Value: {}", value)?;
                writeln!(f, "Servers visited: {}", path)?;
                write!(f, "Final server: {}", server)
            }
            OperationReport::Lookup { value: None, .. } => write!(f, "Key not found"),
            OperationReport::Insert {
                key, value, path, ..
            } => {
                writeln!(f, "Key-Value pair inserted into server: ({}, {})", key, value)?;
                write!(f, "Servers visited: {}", path)
            }
            OperationReport::Delete {
                deleted: true,
                path,
                ..
            } => {
                writeln!(f, "Successful deletion")?;
                write!(f, "Servers visited: {}", path)
            }
            OperationReport::Delete { deleted: false, .. } => write!(f, "Key not found"),
            OperationReport::Unroutable {
                operation,
                key,
                path,
            } => match key {
                Some(key) => write!(f, "No owner found for {} {} (visited {})", operation, key, path),
                None => write!(f, "No owner found for {} (visited {})", operation, path),
            },
        }
    }
}

/// Where a terminal node sends operation outcomes.
///
/// Results never travel back along the forwarding chain. The bootstrap node
/// surfaces them on its own console; every other node ships them to the
/// bootstrap node over a fresh connection.
#[derive(Clone)]
pub enum ResultSink {
    Local(EventSender),
    Remote {
        client: LinkClient,
        bootstrap: SocketAddr,
    },
}

impl ResultSink {
    pub async fn deliver(&self, report: OperationReport) -> Result<()> {
        match self {
            ResultSink::Local(events) => {
                if events.send(NodeEvent::Report(report)).is_err() {
                    tracing::debug!("Console detached, dropping report");
                }
                Ok(())
            }
            ResultSink::Remote { client, bootstrap } => {
                tracing::debug!("Delivering {} to bootstrap at {}", report.command(), bootstrap);
                client.send(*bootstrap, &Message::Report(report)).await
            }
        }
    }
}
