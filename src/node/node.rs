use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::events::{EventReceiver, EventSender, NodeEvent};
use crate::config::loader::{NodeConfig, Role};
use crate::error::{Result, RingError};
use crate::ring::membership::{EnterOutcome, Membership};
use crate::ring::state::{NodeSnapshot, NodeState};
use crate::ring::types::{Key, NodeId, NodeIdentity};
use crate::routing::report::ResultSink;
use crate::routing::router::{Operation, Router};
use crate::transport::client::LinkClient;
use crate::transport::dedup::SeenOps;
use crate::transport::protocol::Message;
use crate::transport::server::{self, MessageHandler, Responder};

/// Inbound side of a node: dispatches every message to membership or routing.
struct NodeCore {
    membership: Membership,
    router: Router,
    events: EventSender,
}

impl MessageHandler for NodeCore {
    async fn handle(&self, message: Message, responder: Responder) -> Result<()> {
        match message {
            Message::Enter {
                op_id,
                candidate,
                path,
            } => {
                self.membership
                    .handle_enter(op_id, candidate, path, responder)
                    .await
            }
            Message::Entrance(admission) => self.membership.handle_entrance(admission).await,
            Message::Refused { reason } => {
                self.membership.handle_refused(reason);
                Ok(())
            }
            Message::Successor { successor } => self.membership.handle_successor(successor).await,
            Message::Exit(notice) => self.membership.handle_exit(notice).await,
            Message::Print {
                op_id,
                origin,
                path,
            } => self.router.handle_print(op_id, origin, path).await,
            Message::Report(report) => {
                tracing::debug!("Received {} from {}", report.command(), responder.peer());
                let _ = self.events.send(NodeEvent::Report(report));
                Ok(())
            }
            routed => match Operation::from_message(routed) {
                Some((op_id, operation, path)) => self.router.handle(op_id, operation, path).await,
                None => Err(RingError::Protocol("unhandled message".to_string())),
            },
        }
    }
}

/// A running ring member: the bootstrap node or a ring node.
///
/// Owns the listening socket's accept loop. Dropping the node (or calling
/// [`shutdown`](Self::shutdown)) stops serving without leaving the ring.
pub struct RingNode {
    identity: NodeIdentity,
    state: Arc<Mutex<NodeState>>,
    core: Arc<NodeCore>,
    server: JoinHandle<()>,
}

impl RingNode {
    /// Binds the listener, builds the node state and starts serving.
    ///
    /// The returned receiver carries this node's [`NodeEvent`]s. At the
    /// bootstrap node it is also where routed-operation results arrive.
    pub async fn start(config: &NodeConfig) -> Result<(Arc<Self>, EventReceiver)> {
        let listener = TcpListener::bind(SocketAddr::new(config.host, config.port)).await?;
        let bound = listener.local_addr()?;
        let identity = NodeIdentity::new(config.id, config.host, bound.port());

        let (events, receiver) = mpsc::unbounded_channel();
        let client = LinkClient::new(config.rpc_timeout, config.rpc_attempts);
        let seen = Arc::new(SeenOps::new());

        let (state, bootstrap, sink) = match config.role {
            Role::Bootstrap => (
                NodeState::new_bootstrap(identity.clone(), config.initial_keys.clone()),
                identity.socket_addr(),
                ResultSink::Local(events.clone()),
            ),
            Role::Node => {
                let bootstrap = config.bootstrap.ok_or_else(|| {
                    RingError::Config("a ring node needs the bootstrap node's address".to_string())
                })?;
                (
                    NodeState::new_detached(identity.clone()),
                    bootstrap,
                    ResultSink::Remote {
                        client: client.clone(),
                        bootstrap,
                    },
                )
            }
        };
        let state = Arc::new(Mutex::new(state));

        let core = Arc::new(NodeCore {
            membership: Membership::new(
                state.clone(),
                identity.id,
                client.clone(),
                events.clone(),
                seen.clone(),
                bootstrap,
            ),
            router: Router::new(state.clone(), identity.id, client.clone(), sink, events.clone(), seen),
            events,
        });

        let server = tokio::spawn(server::serve(listener, core.clone(), config.rpc_timeout));

        tracing::info!(
            "Node {} listening on {} ({:?})",
            identity.id,
            bound,
            config.role
        );

        Ok((
            Arc::new(Self {
                identity,
                state,
                core,
                server,
            }),
            receiver,
        ))
    }

    pub fn id(&self) -> NodeId {
        self.identity.id
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn addr(&self) -> SocketAddr {
        self.identity.socket_addr()
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn enter(&self) -> Result<EnterOutcome> {
        self.core.membership.enter().await
    }

    pub async fn leave(&self) -> Result<()> {
        self.core.membership.leave().await
    }

    pub async fn lookup(&self, key: Key) -> Result<()> {
        self.core.router.submit(Operation::Lookup { key }).await
    }

    pub async fn insert(&self, key: Key, value: String) -> Result<()> {
        self.core.router.submit(Operation::Insert { key, value }).await
    }

    pub async fn delete(&self, key: Key) -> Result<()> {
        self.core.router.submit(Operation::Delete { key }).await
    }

    pub async fn print(&self) -> Result<()> {
        self.core.router.print().await
    }

    /// Stops accepting connections. Does not leave the ring.
    pub fn shutdown(&self) {
        self.server.abort();
    }
}

impl Drop for RingNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}
