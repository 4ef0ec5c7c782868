use serde::{Deserialize, Serialize};

use super::types::{Key, KeyRange, NodeIdentity, PathTrace, check_id};
use crate::error::{Result, RingError};
use crate::storage::store::{KeyRangeStore, KeySlice};
use crate::transport::protocol::{Admission, ExitNotice};

/// Link state and key store of one node, mutated as a single unit.
///
/// Every transition below is synchronous and touches nothing but `self`; the
/// membership service and the router call them under the node's state lock
/// and do the network work around them.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub identity: NodeIdentity,
    pub predecessor: NodeIdentity,
    pub successor: NodeIdentity,
    pub range: KeyRange,
    pub store: KeyRangeStore,
    pub joined: bool,
    /// Successor at the time this node left. Stragglers still addressed to
    /// this node are passed on there.
    pub handed_over_to: Option<NodeIdentity>,
}

/// Outcome of testing a join candidate against this node's range.
#[derive(Debug)]
pub enum AdmitDecision {
    /// The range was split. `admission` goes to the candidate; `rollback`
    /// restores the pre-split state should the candidate be unreachable.
    Admit {
        admission: Admission,
        rollback: Rollback,
    },
    /// Not ours. Pass the request on with this node appended to the path.
    Forward {
        successor: NodeIdentity,
        path: PathTrace,
    },
    Refuse(String),
}

/// Pre-split state captured at admission time.
#[derive(Debug, Clone)]
pub struct Rollback {
    predecessor: NodeIdentity,
    successor: NodeIdentity,
    range: KeyRange,
    keys: KeySlice,
}

/// Ownership verdict for a routed key.
#[derive(Debug, Clone, PartialEq)]
pub enum Ownership {
    /// This node owns the key. The path is handed back unchanged.
    Local { path: PathTrace },
    Forward {
        successor: NodeIdentity,
        path: PathTrace,
    },
    /// The request already passed through this node, or the node is off the
    /// ring with nowhere to pass it.
    Unroutable { path: PathTrace },
}

/// Notices a leaving node must deliver, in order.
#[derive(Debug, Clone)]
pub enum LeavePlan {
    /// Exactly one other member remains; it receives everything.
    LastPeer {
        peer: NodeIdentity,
        notice: ExitNotice,
    },
    General {
        successor: NodeIdentity,
        to_successor: ExitNotice,
        predecessor: NodeIdentity,
        to_predecessor: ExitNotice,
    },
}

impl LeavePlan {
    /// The first notice, whose failure aborts the leave.
    pub fn first(&self) -> (&NodeIdentity, &ExitNotice) {
        match self {
            LeavePlan::LastPeer { peer, notice } => (peer, notice),
            LeavePlan::General {
                successor,
                to_successor,
                ..
            } => (successor, to_successor),
        }
    }

    pub fn second(&self) -> Option<(&NodeIdentity, &ExitNotice)> {
        match self {
            LeavePlan::LastPeer { .. } => None,
            LeavePlan::General {
                predecessor,
                to_predecessor,
                ..
            } => Some((predecessor, to_predecessor)),
        }
    }
}

/// Immutable copy of a node's state, for the console and for tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub identity: NodeIdentity,
    pub predecessor: NodeIdentity,
    pub successor: NodeIdentity,
    pub range: KeyRange,
    pub keys: KeySlice,
    pub joined: bool,
}

impl NodeState {
    /// The bootstrap node: sole member, owner of the whole space and the initial keys.
    pub fn new_bootstrap(identity: NodeIdentity, keys: KeySlice) -> Self {
        Self {
            predecessor: identity.clone(),
            successor: identity.clone(),
            range: KeyRange::owned_by(identity.id, identity.id),
            store: KeyRangeStore::from_entries(keys),
            joined: true,
            handed_over_to: None,
            identity,
        }
    }

    /// A ring node before `enter`, or after `exit`.
    pub fn new_detached(identity: NodeIdentity) -> Self {
        Self {
            predecessor: identity.clone(),
            successor: identity.clone(),
            range: KeyRange::none(),
            store: KeyRangeStore::new(),
            joined: false,
            handed_over_to: None,
            identity,
        }
    }

    pub fn is_sole_member(&self) -> bool {
        self.joined && self.successor.id == self.identity.id
    }

    pub fn owns(&self, key: Key) -> bool {
        self.joined && self.range.contains(key)
    }

    /// Join decision for `candidate`, applying the split when admitting.
    pub fn admit(&mut self, candidate: &NodeIdentity, mut path: PathTrace) -> AdmitDecision {
        if !self.joined {
            return AdmitDecision::Refuse(format!("node {} is not a ring member", self.identity.id));
        }
        if let Err(e) = check_id(candidate.id) {
            return AdmitDecision::Refuse(e.to_string());
        }
        if candidate.id == self.identity.id {
            return AdmitDecision::Refuse(format!("id {} is already taken", candidate.id));
        }

        if !self.range.contains(candidate.id) {
            if path.contains(self.identity.id) {
                return AdmitDecision::Refuse(format!(
                    "no ring member owns id {} (visited {})",
                    candidate.id, path
                ));
            }
            path.push(self.identity.id);
            return AdmitDecision::Forward {
                successor: self.successor.clone(),
                path,
            };
        }

        let first_entry = self.is_sole_member();
        let handed_range = KeyRange {
            start: self.range.start,
            end: candidate.id,
        };
        let keys = self.store.split_off_range(&handed_range);

        let rollback = Rollback {
            predecessor: self.predecessor.clone(),
            successor: self.successor.clone(),
            range: self.range,
            keys: keys.clone(),
        };

        let candidate_predecessor = if first_entry {
            self.identity.clone()
        } else {
            self.predecessor.clone()
        };

        self.predecessor = candidate.clone();
        if first_entry {
            self.successor = candidate.clone();
        }
        self.range = KeyRange::owned_by(candidate.id, self.identity.id);

        AdmitDecision::Admit {
            admission: Admission {
                predecessor: candidate_predecessor,
                successor: self.identity.clone(),
                path,
                keys,
                first_entry,
            },
            rollback,
        }
    }

    /// Undoes an admission whose candidate never received it.
    pub fn restore(&mut self, rollback: Rollback) {
        self.predecessor = rollback.predecessor;
        self.successor = rollback.successor;
        self.range = rollback.range;
        self.store.merge(rollback.keys);
    }

    /// Candidate side of a join. Returns the predecessor that still points past
    /// us and must receive a successor update, if any.
    pub fn install(&mut self, admission: Admission) -> Result<Option<NodeIdentity>> {
        if self.joined {
            return Err(RingError::AlreadyJoined(self.identity.id));
        }

        self.range = KeyRange::owned_by(admission.predecessor.id, self.identity.id);
        self.predecessor = admission.predecessor;
        self.successor = admission.successor;
        self.store.merge(admission.keys);
        self.joined = true;
        self.handed_over_to = None;

        if admission.first_entry {
            Ok(None)
        } else {
            Ok(Some(self.predecessor.clone()))
        }
    }

    pub fn apply_successor(&mut self, successor: NodeIdentity) {
        self.successor = successor;
    }

    /// Applies an exit notice from a leaving neighbour.
    pub fn absorb_exit(&mut self, notice: ExitNotice) {
        match notice {
            ExitNotice::ToSuccessor { predecessor, keys } => {
                self.range = KeyRange::owned_by(predecessor.id, self.identity.id);
                self.predecessor = predecessor;
                self.store.merge(keys);
            }
            ExitNotice::ToPredecessor { successor } => {
                self.successor = successor;
            }
            ExitNotice::LastPeer { keys } => {
                self.predecessor = self.identity.clone();
                self.successor = self.identity.clone();
                self.range = KeyRange::owned_by(self.identity.id, self.identity.id);
                self.store.merge(keys);
            }
        }
    }

    /// Notices to send for leaving. Does not mutate; call [`detach`](Self::detach)
    /// once the notices have gone out.
    pub fn plan_leave(&self) -> Result<LeavePlan> {
        if self.identity.is_bootstrap() {
            return Err(RingError::BootstrapCannotLeave);
        }
        if !self.joined {
            return Err(RingError::NotJoined(self.identity.id));
        }

        let keys = self.store.snapshot();
        if self.successor.id == self.predecessor.id {
            return Ok(LeavePlan::LastPeer {
                peer: self.successor.clone(),
                notice: ExitNotice::LastPeer { keys },
            });
        }

        Ok(LeavePlan::General {
            successor: self.successor.clone(),
            to_successor: ExitNotice::ToSuccessor {
                predecessor: self.predecessor.clone(),
                keys,
            },
            predecessor: self.predecessor.clone(),
            to_predecessor: ExitNotice::ToPredecessor {
                successor: self.successor.clone(),
            },
        })
    }

    /// Drops ring membership and every key, remembering the successor the
    /// range went to.
    pub fn detach(&mut self) {
        self.handed_over_to = Some(self.successor.clone())
            .filter(|successor| self.joined && successor.id != self.identity.id);
        self.store.drain_all();
        self.predecessor = self.identity.clone();
        self.successor = self.identity.clone();
        self.range = KeyRange::none();
        self.joined = false;
    }

    /// Ownership test for a routed key, extending the path on a miss.
    pub fn route(&self, key: Key, mut path: PathTrace) -> Ownership {
        if self.owns(key) {
            return Ownership::Local { path };
        }
        if path.contains(self.identity.id) {
            return Ownership::Unroutable { path };
        }
        let next = if self.joined {
            &self.successor
        } else {
            match &self.handed_over_to {
                Some(next) => next,
                None => return Ownership::Unroutable { path },
            }
        };
        path.push(self.identity.id);
        Ownership::Forward {
            successor: next.clone(),
            path,
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            identity: self.identity.clone(),
            predecessor: self.predecessor.clone(),
            successor: self.successor.clone(),
            range: self.range,
            keys: self.store.snapshot(),
            joined: self.joined,
        }
    }
}
