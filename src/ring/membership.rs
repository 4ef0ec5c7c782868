use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::state::{AdmitDecision, NodeSnapshot, NodeState};
use super::types::{KeyRange, NodeId, NodeIdentity, PathTrace};
use crate::error::{Result, RingError};
use crate::node::events::{EventSender, NodeEvent};
use crate::transport::client::{LinkClient, PendingAck};
use crate::transport::dedup::SeenOps;
use crate::transport::protocol::{Admission, EnterReply, EntryAck, ExitNotice, Message, OpId};
use crate::transport::server::Responder;

/// What `enter` achieved by the time the bootstrap node answered.
#[derive(Debug, Clone, PartialEq)]
pub enum EnterOutcome {
    Joined(NodeSnapshot),
    /// The request is travelling the ring; an `entrance` or `refused` follows.
    Pending,
}

/// Join, leave and handoff for one node.
pub struct Membership {
    id: NodeId,
    state: Arc<Mutex<NodeState>>,
    client: LinkClient,
    events: EventSender,
    seen: Arc<SeenOps>,
    bootstrap: SocketAddr,
}

impl Membership {
    pub fn new(
        state: Arc<Mutex<NodeState>>,
        id: NodeId,
        client: LinkClient,
        events: EventSender,
        seen: Arc<SeenOps>,
        bootstrap: SocketAddr,
    ) -> Self {
        Self {
            id,
            state,
            client,
            events,
            seen,
            bootstrap,
        }
    }

    // ------------------------------------------------------------
    // Candidate side
    // ------------------------------------------------------------

    /// Asks the bootstrap node to admit this node.
    pub async fn enter(&self) -> Result<EnterOutcome> {
        let identity = {
            let state = self.state.lock().await;
            if state.joined {
                return Err(RingError::AlreadyJoined(self.id));
            }
            state.identity.clone()
        };

        info!("Node {} requesting entry via {}", self.id, self.bootstrap);
        let request = Message::Enter {
            op_id: OpId::new(),
            candidate: identity,
            path: PathTrace::new(),
        };

        let (reply, connection) = self.client.exchange(self.bootstrap, &request).await?;
        match reply {
            EnterReply::Admitted(admission) => {
                let snapshot = self.complete_entry(admission, Some(connection)).await?;
                Ok(EnterOutcome::Joined(snapshot))
            }
            EnterReply::Pending => {
                info!("Entry request for node {} forwarded along the ring", self.id);
                Ok(EnterOutcome::Pending)
            }
            EnterReply::Refused(reason) => Err(RingError::EntryRefused(reason)),
        }
    }

    /// Admission delivered by a ring member other than the bootstrap node.
    pub async fn handle_entrance(&self, admission: Admission) -> Result<()> {
        self.complete_entry(admission, None).await.map(|_| ())
    }

    pub fn handle_refused(&self, reason: String) {
        warn!("Entry of node {} refused: {}", self.id, reason);
        let _ = self.events.send(NodeEvent::EntryRefused { reason });
    }

    /// Installs the admission, confirms it to a directly admitting node, then
    /// points the new predecessor at us.
    ///
    /// If the confirmation cannot be written the admitting node restores its
    /// range, so the install is undone here as well.
    async fn complete_entry(
        &self,
        admission: Admission,
        confirm: Option<PendingAck>,
    ) -> Result<NodeSnapshot> {
        let path = admission.path.clone();
        let mut state = self.state.lock().await;

        let notify = match state.install(admission) {
            Ok(notify) => notify,
            Err(e) => {
                warn!("Ignoring admission for node {}: {}", self.id, e);
                return Err(e);
            }
        };

        if let Some(connection) = confirm {
            if let Err(e) = connection.acknowledge(&EntryAck { candidate: self.id }).await {
                warn!("Node {} could not confirm its admission, backing out: {}", self.id, e);
                state.detach();
                return Err(e);
            }
        }

        info!(
            "Node {} entered: range {}, predecessor {}, successor {}",
            self.id, state.range, state.predecessor, state.successor
        );

        if let Some(predecessor) = notify {
            let update = Message::Successor {
                successor: state.identity.clone(),
            };
            if let Err(e) = self.client.send(predecessor.socket_addr(), &update).await {
                let err = RingError::handoff(predecessor.id, e);
                self.publish_failure(&err);
                return Err(err);
            }
            debug!("Sent successor update to {}", predecessor);
        }

        let snapshot = state.snapshot();
        drop(state);

        let _ = self.events.send(NodeEvent::Joined {
            snapshot: snapshot.clone(),
            path,
        });
        Ok(snapshot)
    }

    // ------------------------------------------------------------
    // Admitting / forwarding side
    // ------------------------------------------------------------

    /// Handles an `enter` request, either straight from the candidate (empty
    /// path) or forwarded by another member.
    ///
    /// A forwarded request is answered `Pending` at once; its outcome goes
    /// straight to the candidate.
    pub async fn handle_enter(
        &self,
        op_id: OpId,
        candidate: NodeIdentity,
        path: PathTrace,
        responder: Responder,
    ) -> Result<()> {
        let looped = path.contains(self.id);
        if !looped && !self.seen.should_process(&op_id) {
            debug!("Duplicate enter {} for node {} ignored", op_id.0, candidate.id);
            return responder.reply(&EnterReply::Pending).await;
        }

        let direct = path.is_empty();
        let responder = if direct {
            Some(responder)
        } else {
            responder.reply(&EnterReply::Pending).await?;
            None
        };

        let mut state = self.state.lock().await;
        match state.admit(&candidate, path) {
            AdmitDecision::Admit {
                admission,
                rollback,
            } => {
                let handed = KeyRange::owned_by(admission.predecessor.id, candidate.id);
                info!(
                    "Node {} admitting node {} (first entry: {}), handing over {}",
                    self.id, candidate.id, admission.first_entry, handed
                );
                let first_entry = admission.first_entry;

                let delivery = match responder {
                    Some(responder) => responder
                        .reply_and_confirm(&EnterReply::Admitted(admission))
                        .await
                        .and_then(|ack| confirmation_of(&candidate, ack)),
                    None => {
                        self.client
                            .send(candidate.socket_addr(), &Message::Entrance(admission))
                            .await
                    }
                };

                match delivery {
                    Ok(()) => {
                        drop(state);
                        let _ = self.events.send(NodeEvent::Admitted {
                            candidate,
                            handed,
                            first_entry,
                        });
                        Ok(())
                    }
                    Err(e) if e.is_undelivered() || (direct && !e.is_timeout()) => {
                        warn!(
                            "Admission of node {} not delivered, restoring range: {}",
                            candidate.id, e
                        );
                        state.restore(rollback);
                        Err(e)
                    }
                    Err(e) => {
                        let err = RingError::handoff(candidate.id, e);
                        self.publish_failure(&err);
                        Err(err)
                    }
                }
            }

            AdmitDecision::Forward { successor, path } => {
                drop(state);
                if let Some(responder) = responder {
                    responder.reply(&EnterReply::Pending).await?;
                }
                debug!(
                    "Forwarding enter of node {} to {} (path {})",
                    candidate.id, successor, path
                );
                self.forward_enter(op_id, candidate, path, successor).await
            }

            AdmitDecision::Refuse(reason) => {
                drop(state);
                info!("Refusing entry of node {}: {}", candidate.id, reason);
                match responder {
                    Some(responder) => responder.reply(&EnterReply::Refused(reason)).await,
                    None => self.send_refusal(&candidate, reason).await,
                }
            }
        }
    }

    async fn forward_enter(
        &self,
        op_id: OpId,
        candidate: NodeIdentity,
        path: PathTrace,
        successor: NodeIdentity,
    ) -> Result<()> {
        let forward = Message::Enter {
            op_id,
            candidate: candidate.clone(),
            path,
        };

        match self.client.request(successor.socket_addr(), &forward).await {
            Ok(EnterReply::Pending) => Ok(()),
            Ok(EnterReply::Refused(reason)) => self.send_refusal(&candidate, reason).await,
            Ok(EnterReply::Admitted(_)) => {
                // Left unconfirmed, so the admitting node has already restored its range.
                warn!(
                    "Node {} answered a forwarded enter of node {} with a direct admission",
                    successor.id, candidate.id
                );
                let reason = format!("node {} could not complete the admission", successor.id);
                self.send_refusal(&candidate, reason).await
            }
            Err(e) => {
                warn!(
                    "Could not forward enter of node {} to {}: {}",
                    candidate.id, successor, e
                );
                let reason = format!("node {} could not reach its successor {}", self.id, successor.id);
                self.send_refusal(&candidate, reason).await?;
                Err(e)
            }
        }
    }

    async fn send_refusal(&self, candidate: &NodeIdentity, reason: String) -> Result<()> {
        self.client
            .send(candidate.socket_addr(), &Message::Refused { reason })
            .await
    }

    // ------------------------------------------------------------
    // Neighbour updates
    // ------------------------------------------------------------

    pub async fn handle_successor(&self, successor: NodeIdentity) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.joined {
            warn!("Node {} is off the ring, ignoring successor update", self.id);
            return Ok(());
        }
        info!("Node {} successor {} -> {}", self.id, state.successor.id, successor.id);
        state.apply_successor(successor);
        Ok(())
    }

    pub async fn handle_exit(&self, notice: ExitNotice) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.joined {
            warn!("Node {} is off the ring, ignoring exit notice", self.id);
            return Ok(());
        }

        match &notice {
            ExitNotice::ToSuccessor { predecessor, keys } => info!(
                "Node {} absorbing {} keys from departing predecessor, new predecessor {}",
                self.id,
                keys.len(),
                predecessor
            ),
            ExitNotice::ToPredecessor { successor } => {
                info!("Node {} successor departed, new successor {}", self.id, successor)
            }
            ExitNotice::LastPeer { keys } => info!(
                "Node {} is the sole ring member again, absorbing {} keys",
                self.id,
                keys.len()
            ),
        }

        state.absorb_exit(notice);
        debug!("Node {} now serves {}", self.id, state.range);
        Ok(())
    }

    // ------------------------------------------------------------
    // Leave
    // ------------------------------------------------------------

    /// Hands this node's range to its neighbours and leaves the ring.
    ///
    /// If the first notice cannot be delivered nothing changes. Once it is
    /// delivered the node is off the ring, even if the second notice fails.
    pub async fn leave(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let plan = state.plan_leave()?;

        let (peer, notice) = plan.first();
        info!("Node {} leaving, notifying {}", self.id, peer);
        self.client
            .send(peer.socket_addr(), &Message::Exit(notice.clone()))
            .await?;

        let second = match plan.second() {
            Some((predecessor, notice)) => self
                .client
                .send(predecessor.socket_addr(), &Message::Exit(notice.clone()))
                .await
                .map_err(|e| RingError::handoff(predecessor.id, e)),
            None => Ok(()),
        };

        let range = state.range;
        state.detach();
        drop(state);

        if let Err(err) = second {
            self.publish_failure(&err);
            return Err(err);
        }

        info!("Node {} left the ring", self.id);
        let _ = self.events.send(NodeEvent::Left { range });
        Ok(())
    }

    fn publish_failure(&self, error: &RingError) {
        tracing::error!("{}", error);
        if let Some(event) = NodeEvent::handoff_failed(error) {
            let _ = self.events.send(event);
        }
    }
}

fn confirmation_of(candidate: &NodeIdentity, ack: EntryAck) -> Result<()> {
    if ack.candidate == candidate.id {
        Ok(())
    } else {
        Err(RingError::Protocol(format!(
            "admission of node {} confirmed by node {}",
            candidate.id, ack.candidate
        )))
    }
}
