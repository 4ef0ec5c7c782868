use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::report::{OperationReport, ResultSink};
use crate::error::{Result, RingError};
use crate::node::events::{EventSender, NodeEvent};
use crate::ring::state::{NodeState, Ownership};
use crate::ring::types::{Key, NodeId, PathTrace, check_id};
use crate::transport::client::LinkClient;
use crate::transport::dedup::SeenOps;
use crate::transport::protocol::{Message, OpId};

/// A key-addressed operation in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Lookup { key: Key },
    Insert { key: Key, value: String },
    Delete { key: Key },
}

impl Operation {
    pub fn key(&self) -> Key {
        match self {
            Operation::Lookup { key } | Operation::Insert { key, .. } | Operation::Delete { key } => *key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Lookup { .. } => "lookup",
            Operation::Insert { .. } => "insert",
            Operation::Delete { .. } => "delete",
        }
    }

    fn into_message(self, op_id: OpId, path: PathTrace) -> Message {
        match self {
            Operation::Lookup { key } => Message::Lookup { op_id, key, path },
            Operation::Insert { key, value } => Message::Insert {
                op_id,
                key,
                value,
                path,
            },
            Operation::Delete { key } => Message::Delete { op_id, key, path },
        }
    }

    /// Splits a routed message back into its parts. `None` for non-routed messages.
    pub fn from_message(message: Message) -> Option<(OpId, Operation, PathTrace)> {
        match message {
            Message::Lookup { op_id, key, path } => Some((op_id, Operation::Lookup { key }, path)),
            Message::Insert {
                op_id,
                key,
                value,
                path,
            } => Some((op_id, Operation::Insert { key, value }, path)),
            Message::Delete { op_id, key, path } => Some((op_id, Operation::Delete { key }, path)),
            _ => None,
        }
    }
}

/// Ownership test plus forwarding along successor links.
///
/// The owner applies the operation and hands the outcome to the
/// [`ResultSink`]; nothing travels back along the forwarding chain.
pub struct Router {
    id: NodeId,
    state: Arc<Mutex<NodeState>>,
    client: LinkClient,
    sink: ResultSink,
    events: EventSender,
    seen: Arc<SeenOps>,
}

impl Router {
    pub fn new(
        state: Arc<Mutex<NodeState>>,
        id: NodeId,
        client: LinkClient,
        sink: ResultSink,
        events: EventSender,
        seen: Arc<SeenOps>,
    ) -> Self {
        Self {
            id,
            state,
            client,
            sink,
            events,
            seen,
        }
    }

    /// Starts a new operation at this node.
    pub async fn submit(&self, operation: Operation) -> Result<()> {
        check_id(operation.key())?;
        if !self.state.lock().await.joined {
            return Err(RingError::NotJoined(self.id));
        }
        self.route(OpId::new(), operation, PathTrace::new()).await
    }

    /// Handles a routed message forwarded by the predecessor.
    pub async fn handle(&self, op_id: OpId, operation: Operation, path: PathTrace) -> Result<()> {
        if !path.contains(self.id) && !self.seen.should_process(&op_id) {
            debug!("Duplicate {} {} ignored", operation.name(), op_id.0);
            return Ok(());
        }
        self.route(op_id, operation, path).await
    }

    async fn route(&self, op_id: OpId, operation: Operation, path: PathTrace) -> Result<()> {
        let mut state = self.state.lock().await;

        match state.route(operation.key(), path) {
            Ownership::Local { path } => {
                let server = self.id;
                let report = match operation {
                    Operation::Lookup { key } => OperationReport::Lookup {
                        key,
                        value: state.store.get(key).cloned(),
                        server,
                        path,
                    },
                    Operation::Insert { key, value } => {
                        state.store.insert(key, value.clone());
                        OperationReport::Insert {
                            key,
                            value,
                            server,
                            path,
                        }
                    }
                    Operation::Delete { key } => OperationReport::Delete {
                        key,
                        deleted: state.store.remove(key).is_some(),
                        server,
                        path,
                    },
                };
                drop(state);

                info!("Node {} served {}", self.id, report.command());
                self.sink.deliver(report).await
            }
            Ownership::Forward { successor, path } => {
                drop(state);
                debug!(
                    "Node {} forwarding {} {} to {} (path {})",
                    self.id,
                    operation.name(),
                    operation.key(),
                    successor,
                    path
                );
                self.client
                    .send(successor.socket_addr(), &operation.into_message(op_id, path))
                    .await
            }
            Ownership::Unroutable { path } => {
                drop(state);
                warn!(
                    "Node {} cannot route {} {} (visited {})",
                    self.id,
                    operation.name(),
                    operation.key(),
                    path
                );
                self.sink
                    .deliver(OperationReport::Unroutable {
                        operation: operation.name().to_string(),
                        key: Some(operation.key()),
                        path,
                    })
                    .await
            }
        }
    }

    // ------------------------------------------------------------
    // Print
    // ------------------------------------------------------------

    /// Starts a ring-wide listing at this node.
    pub async fn print(&self) -> Result<()> {
        if !self.state.lock().await.joined {
            return Err(RingError::NotJoined(self.id));
        }
        self.print_step(OpId::new(), self.id, PathTrace::new()).await
    }

    pub async fn handle_print(&self, op_id: OpId, origin: NodeId, path: PathTrace) -> Result<()> {
        if !path.contains(self.id) && !self.seen.should_process(&op_id) {
            debug!("Duplicate print {} ignored", op_id.0);
            return Ok(());
        }
        self.print_step(op_id, origin, path).await
    }

    /// Emits this node's entries, then passes the listing on unless the
    /// successor is where it started.
    async fn print_step(&self, op_id: OpId, origin: NodeId, mut path: PathTrace) -> Result<()> {
        let state = self.state.lock().await;
        if !state.joined {
            warn!("Node {} is off the ring, dropping print from {}", self.id, origin);
            return Ok(());
        }
        if path.contains(self.id) {
            warn!(
                "Print from {} came back to node {} without meeting its origin (visited {})",
                origin, self.id, path
            );
            return Ok(());
        }

        let listing = NodeEvent::Listing {
            server: self.id,
            range: state.range,
            entries: state.store.snapshot(),
            path: path.clone(),
        };
        let successor = state.successor.clone();
        drop(state);

        let _ = self.events.send(listing);

        if successor.id == origin {
            debug!("Print from {} complete at node {}", origin, self.id);
            return Ok(());
        }

        path.push(self.id);
        self.client
            .send(
                successor.socket_addr(),
                &Message::Print {
                    op_id,
                    origin,
                    path,
                },
            )
            .await
    }
}
