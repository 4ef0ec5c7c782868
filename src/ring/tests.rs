//! Ring Module Tests
//!
//! Exercises the synchronous state transitions without any networking.
//!
//! ## Test Scopes
//! - **Ranges**: Circular containment and the bootstrap sentinel.
//! - **Join**: First entry, in-range admission, forwarding, refusals and rollback.
//! - **Leave**: Last-peer collapse and the general two-notice case.
//! - **Invariants**: Partition and ring closure across join/leave sequences, driven by an
//!   in-memory ring that applies each message the way the network would.

#[cfg(test)]
mod tests {
    use crate::error::RingError;
    use crate::ring::state::{AdmitDecision, LeavePlan, NodeState, Ownership};
    use crate::ring::types::{BOOTSTRAP_ID, KeyRange, MAX_ID, NodeId, NodeIdentity, PathTrace};
    use crate::storage::store::KeySlice;
    use crate::transport::protocol::ExitNotice;
    use std::collections::BTreeMap;
    use std::net::{IpAddr, Ipv4Addr};

    fn ident(id: NodeId) -> NodeIdentity {
        NodeIdentity::new(id, IpAddr::V4(Ipv4Addr::LOCALHOST), 6000 + id as u16)
    }

    fn keys(pairs: &[(u32, &str)]) -> KeySlice {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    /// Applies every message of a join or leave synchronously, in protocol order.
    struct Ring {
        nodes: BTreeMap<NodeId, NodeState>,
    }

    impl Ring {
        fn new(initial: &[(u32, &str)]) -> Self {
            let mut nodes = BTreeMap::new();
            nodes.insert(
                BOOTSTRAP_ID,
                NodeState::new_bootstrap(ident(BOOTSTRAP_ID), keys(initial)),
            );
            Self { nodes }
        }

        fn node(&self, id: NodeId) -> &NodeState {
            self.nodes.get(&id).unwrap()
        }

        fn join(&mut self, id: NodeId) -> PathTrace {
            let candidate = ident(id);
            self.nodes.insert(id, NodeState::new_detached(candidate.clone()));

            let mut at = BOOTSTRAP_ID;
            let mut path = PathTrace::new();
            loop {
                let decision = self.nodes.get_mut(&at).unwrap().admit(&candidate, path.clone());
                match decision {
                    AdmitDecision::Admit { admission, .. } => {
                        let trace = admission.path.clone();
                        let notify = self.nodes.get_mut(&id).unwrap().install(admission).unwrap();
                        if let Some(predecessor) = notify {
                            self.nodes
                                .get_mut(&predecessor.id)
                                .unwrap()
                                .apply_successor(candidate.clone());
                        }
                        return trace;
                    }
                    AdmitDecision::Forward { successor, path: next } => {
                        at = successor.id;
                        path = next;
                    }
                    AdmitDecision::Refuse(reason) => panic!("Join of {} refused: {}", id, reason),
                }
            }
        }

        fn leave(&mut self, id: NodeId) {
            let plan = self.node(id).plan_leave().unwrap();

            let (peer, notice) = plan.first();
            self.nodes.get_mut(&peer.id).unwrap().absorb_exit(notice.clone());
            if let Some((predecessor, notice)) = plan.second() {
                self.nodes
                    .get_mut(&predecessor.id)
                    .unwrap()
                    .absorb_exit(notice.clone());
            }

            self.nodes.get_mut(&id).unwrap().detach();
            self.nodes.remove(&id);
        }

        /// Follows successor links from `from` until the owner of `key` is met.
        fn route(&self, from: NodeId, key: u32) -> (NodeId, PathTrace) {
            let mut at = from;
            let mut path = PathTrace::new();
            for _ in 0..=self.nodes.len() {
                match self.node(at).route(key, path) {
                    Ownership::Local { path } => return (at, path),
                    Ownership::Forward { successor, path: next } => {
                        at = successor.id;
                        path = next;
                    }
                    Ownership::Unroutable { path } => panic!("Key {} unroutable via {}", key, path),
                }
            }
            panic!("Key {} not resolved within ring size", key);
        }

        fn assert_invariants(&self) {
            for key in 1..=MAX_ID {
                let owners: Vec<NodeId> = self
                    .nodes
                    .values()
                    .filter(|node| node.owns(key))
                    .map(|node| node.identity.id)
                    .collect();
                assert_eq!(owners.len(), 1, "Key {} owned by {:?}", key, owners);
            }

            for node in self.nodes.values() {
                let id = node.identity.id;
                assert_eq!(
                    self.node(node.successor.id).predecessor.id,
                    id,
                    "successor of {} does not point back",
                    id
                );
                assert_eq!(
                    self.node(node.predecessor.id).successor.id,
                    id,
                    "predecessor of {} does not point forward",
                    id
                );
                for (key, _) in node.store.iter() {
                    assert!(node.owns(*key), "Node {} holds foreign key {}", id, key);
                }
            }
        }

        fn total_keys(&self) -> usize {
            self.nodes.values().map(|node| node.store.len()).sum()
        }
    }

    // ============================================================
    // RANGE TESTS
    // ============================================================

    #[test]
    fn test_bootstrap_sentinel_covers_every_key() {
        let range = KeyRange::owned_by(BOOTSTRAP_ID, BOOTSTRAP_ID);

        assert_eq!(range, KeyRange { start: 1, end: 0 });
        assert!(range.is_full());
        assert_eq!(range.to_string(), "[1,1024]");
    }

    #[test]
    fn test_plain_and_wrapping_ranges() {
        let plain = KeyRange::owned_by(300, 700);
        assert!(plain.contains(301) && plain.contains(700));
        assert!(!plain.contains(300) && !plain.contains(701));

        let wrapping = KeyRange::owned_by(900, 100);
        assert!(wrapping.contains(1024) && wrapping.contains(1) && wrapping.contains(100));
        assert!(!wrapping.contains(500));
        assert_eq!(wrapping.to_string(), "[901,100]");
    }

    #[test]
    fn test_bootstrap_range_after_split() {
        let range = KeyRange::owned_by(700, BOOTSTRAP_ID);

        assert!(range.contains(701) && range.contains(MAX_ID));
        assert!(!range.contains(700) && !range.contains(1));
        assert_eq!(range.to_string(), "[701,1024]");
    }

    #[test]
    fn test_none_range_is_empty() {
        let none = KeyRange::none();

        assert!((0..=MAX_ID + 1).all(|id| !none.contains(id)));
        assert_eq!(none.to_string(), "[]");
    }

    #[test]
    fn test_path_trace_display() {
        assert_eq!(PathTrace::from(vec![200, 300]).to_string(), "[200, 300]");
        assert_eq!(PathTrace::new().to_string(), "[]");
    }

    // ============================================================
    // JOIN TESTS
    // ============================================================

    #[test]
    fn test_first_entry_splits_bootstrap() {
        let mut bootstrap = NodeState::new_bootstrap(ident(0), keys(&[(500, "x")]));

        let decision = bootstrap.admit(&ident(200), PathTrace::new());

        let AdmitDecision::Admit { admission, .. } = decision else {
            panic!("Bootstrap should admit the first node");
        };
        assert!(admission.first_entry);
        assert_eq!(admission.predecessor.id, 0);
        assert_eq!(admission.successor.id, 0);
        assert!(admission.keys.is_empty(), "Key 500 stays with the bootstrap node");

        assert_eq!(bootstrap.predecessor.id, 200);
        assert_eq!(bootstrap.successor.id, 200);
        assert_eq!(bootstrap.range.to_string(), "[201,1024]");
        assert!(bootstrap.store.contains_key(500));
    }

    #[test]
    fn test_candidate_installs_first_entry() {
        let mut bootstrap = NodeState::new_bootstrap(ident(0), keys(&[(150, "a"), (500, "x")]));
        let mut candidate = NodeState::new_detached(ident(200));

        let AdmitDecision::Admit { admission, .. } = bootstrap.admit(&ident(200), PathTrace::new())
        else {
            panic!("expected admission");
        };
        let notify = candidate.install(admission).unwrap();

        assert_eq!(notify, None, "First entry needs no successor update");
        assert!(candidate.joined);
        assert_eq!(candidate.range.to_string(), "[1,200]");
        assert_eq!(candidate.predecessor.id, 0);
        assert_eq!(candidate.successor.id, 0);
        assert_eq!(candidate.store.get(150), Some(&"a".to_string()));
    }

    #[test]
    fn test_in_range_admission_hands_lower_part() {
        let mut ring = Ring::new(&[(301, "low"), (650, "mid"), (701, "high")]);
        ring.join(300);

        let mut bootstrap = ring.node(0).clone();
        let decision = bootstrap.admit(&ident(700), PathTrace::new());

        let AdmitDecision::Admit { admission, .. } = decision else {
            panic!("Bootstrap owns 700");
        };
        assert!(!admission.first_entry);
        assert_eq!(admission.predecessor.id, 300, "Candidate inherits the old predecessor");
        assert_eq!(admission.successor.id, 0);
        assert_eq!(
            admission.keys.keys().copied().collect::<Vec<_>>(),
            vec![301, 650],
            "Lower bound of the handed range is inclusive"
        );
        assert_eq!(bootstrap.range.to_string(), "[701,1024]");
        assert_eq!(bootstrap.successor.id, 300, "Successor is untouched");
    }

    #[test]
    fn test_install_names_predecessor_to_update() {
        let mut ring = Ring::new(&[]);
        ring.join(300);

        let mut bootstrap = ring.node(0).clone();
        let AdmitDecision::Admit { admission, .. } = bootstrap.admit(&ident(700), PathTrace::new())
        else {
            panic!("expected admission");
        };
        let mut candidate = NodeState::new_detached(ident(700));

        let notify = candidate.install(admission).unwrap();

        assert_eq!(notify.map(|node| node.id), Some(300));
    }

    #[test]
    fn test_out_of_range_is_forwarded_with_path() {
        let mut ring = Ring::new(&[]);
        ring.join(300);

        let mut node = ring.node(300).clone();
        let decision = node.admit(&ident(700), PathTrace::new());

        match decision {
            AdmitDecision::Forward { successor, path } => {
                assert_eq!(successor.id, 0);
                assert_eq!(path.as_slice(), &[300]);
            }
            other => panic!("Expected forward, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_id_is_refused() {
        let mut ring = Ring::new(&[]);
        ring.join(300);

        let mut node = ring.node(300).clone();
        let before = node.range;

        assert!(matches!(
            node.admit(&ident(300), PathTrace::from(vec![0])),
            AdmitDecision::Refuse(_)
        ));
        assert_eq!(node.range, before, "A refusal changes nothing");
    }

    #[test]
    fn test_out_of_bounds_candidate_is_refused() {
        let mut bootstrap = NodeState::new_bootstrap(ident(0), KeySlice::new());

        assert!(matches!(
            bootstrap.admit(&ident(0), PathTrace::new()),
            AdmitDecision::Refuse(_)
        ));
        assert!(matches!(
            bootstrap.admit(&ident(MAX_ID + 1), PathTrace::new()),
            AdmitDecision::Refuse(_)
        ));
    }

    #[test]
    fn test_join_loop_guard_refuses() {
        let mut ring = Ring::new(&[]);
        ring.join(300);

        let mut node = ring.node(300).clone();
        let decision = node.admit(&ident(700), PathTrace::from(vec![0, 300]));

        assert!(matches!(decision, AdmitDecision::Refuse(_)));
    }

    #[test]
    fn test_detached_node_refuses_entry() {
        let mut detached = NodeState::new_detached(ident(50));

        assert!(matches!(
            detached.admit(&ident(40), PathTrace::new()),
            AdmitDecision::Refuse(_)
        ));
    }

    #[test]
    fn test_rollback_restores_pre_split_state() {
        let mut bootstrap = NodeState::new_bootstrap(ident(0), keys(&[(100, "a"), (500, "x")]));
        let before = bootstrap.snapshot();

        let AdmitDecision::Admit { rollback, .. } = bootstrap.admit(&ident(200), PathTrace::new())
        else {
            panic!("expected admission");
        };
        assert!(!bootstrap.store.contains_key(100));
        bootstrap.restore(rollback);

        assert_eq!(bootstrap.snapshot(), before);
    }

    #[test]
    fn test_second_install_is_rejected() {
        let mut bootstrap = NodeState::new_bootstrap(ident(0), KeySlice::new());
        let mut candidate = NodeState::new_detached(ident(200));
        let AdmitDecision::Admit { admission, .. } = bootstrap.admit(&ident(200), PathTrace::new())
        else {
            panic!("expected admission");
        };

        candidate.install(admission.clone()).unwrap();

        assert!(matches!(
            candidate.install(admission),
            Err(RingError::AlreadyJoined(200))
        ));
    }

    // ============================================================
    // LEAVE TESTS
    // ============================================================

    #[test]
    fn test_leave_with_two_nodes_restores_bootstrap() {
        let mut ring = Ring::new(&[(500, "x")]);
        ring.join(200);
        ring.nodes
            .get_mut(&200)
            .unwrap()
            .store
            .insert(42, "answer".to_string());

        ring.leave(200);

        let bootstrap = ring.node(0);
        assert!(bootstrap.range.is_full(), "Bootstrap is back to [1,1024]");
        assert_eq!(bootstrap.successor.id, 0);
        assert_eq!(bootstrap.predecessor.id, 0);
        assert_eq!(bootstrap.store.get(42), Some(&"answer".to_string()));
        assert_eq!(bootstrap.store.get(500), Some(&"x".to_string()));
    }

    #[test]
    fn test_general_leave_plan() {
        let mut ring = Ring::new(&[]);
        ring.join(300);
        ring.join(700);

        let plan = ring.node(300).plan_leave().unwrap();

        match plan {
            LeavePlan::General {
                successor,
                to_successor,
                predecessor,
                to_predecessor,
            } => {
                assert_eq!(successor.id, 700);
                assert_eq!(predecessor.id, 0);
                assert!(matches!(
                    to_successor,
                    ExitNotice::ToSuccessor { ref predecessor, .. } if predecessor.id == 0
                ));
                assert!(matches!(
                    to_predecessor,
                    ExitNotice::ToPredecessor { ref successor } if successor.id == 700
                ));
            }
            other => panic!("Expected the general case, got {:?}", other),
        }
    }

    #[test]
    fn test_successor_extends_range_downward_on_leave() {
        let mut ring = Ring::new(&[]);
        ring.join(300);
        ring.join(700);

        ring.leave(300);

        assert_eq!(ring.node(700).range.to_string(), "[1,700]");
        assert_eq!(ring.node(0).successor.id, 700);
        ring.assert_invariants();
    }

    #[test]
    fn test_bootstrap_and_detached_cannot_leave() {
        let bootstrap = NodeState::new_bootstrap(ident(0), KeySlice::new());
        let detached = NodeState::new_detached(ident(10));

        assert!(matches!(
            bootstrap.plan_leave(),
            Err(RingError::BootstrapCannotLeave)
        ));
        assert!(matches!(detached.plan_leave(), Err(RingError::NotJoined(10))));
    }

    #[test]
    fn test_detach_clears_everything() {
        let mut ring = Ring::new(&[(100, "a")]);
        ring.join(200);

        let mut node = ring.node(200).clone();
        node.detach();

        assert!(!node.joined);
        assert!(node.store.is_empty());
        assert_eq!(node.range, KeyRange::none());
        assert_eq!(node.successor.id, 200);
    }

    #[test]
    fn test_departed_node_passes_stragglers_on() {
        let mut ring = Ring::new(&[]);
        ring.join(300);
        ring.join(700);

        let mut departed = ring.node(300).clone();
        departed.detach();

        // A lookup the predecessor forwarded before it learned of the exit.
        match departed.route(250, PathTrace::from(vec![0])) {
            Ownership::Forward { successor, path } => {
                assert_eq!(successor.id, 700);
                assert_eq!(path.as_slice(), &[0, 300]);
            }
            other => panic!("Expected a forward to the old successor, got {:?}", other),
        }
        assert!(matches!(
            departed.route(250, PathTrace::from(vec![300, 700, 0])),
            Ownership::Unroutable { .. }
        ));

        let never_joined = NodeState::new_detached(ident(40));
        assert!(matches!(
            never_joined.route(40, PathTrace::new()),
            Ownership::Unroutable { .. }
        ));
    }

    #[test]
    fn test_rejoin_forgets_old_successor() {
        let mut ring = Ring::new(&[]);
        ring.join(300);
        let mut node = ring.node(300).clone();
        node.detach();
        assert_eq!(node.handed_over_to.as_ref().map(|n| n.id), Some(0));

        let mut bootstrap = NodeState::new_bootstrap(ident(0), KeySlice::new());
        let AdmitDecision::Admit { admission, .. } = bootstrap.admit(&ident(300), PathTrace::new())
        else {
            panic!("The sole bootstrap node admits directly");
        };
        node.install(admission).unwrap();

        assert_eq!(node.handed_over_to, None);
        assert!(node.joined);
    }

    // ============================================================
    // ROUTING DECISION TESTS
    // ============================================================

    #[test]
    fn test_route_decisions() {
        let mut ring = Ring::new(&[]);
        ring.join(300);
        ring.join(700);

        let node = ring.node(300);
        assert_eq!(
            node.route(100, PathTrace::new()),
            Ownership::Local {
                path: PathTrace::new()
            }
        );
        assert!(matches!(
            node.route(650, PathTrace::new()),
            Ownership::Forward { ref successor, ref path } if successor.id == 700 && path.as_slice() == [300]
        ));
        assert!(matches!(
            node.route(650, PathTrace::from(vec![300, 700, 0])),
            Ownership::Unroutable { .. }
        ));
    }

    #[test]
    fn test_three_node_lookup_path() {
        let mut ring = Ring::new(&[]);
        ring.join(300);
        ring.join(700);

        let (owner, path) = ring.route(300, 650);

        assert_eq!(owner, 700);
        assert_eq!(path.as_slice(), &[300]);
    }

    #[test]
    fn test_two_node_lookup_reaches_bootstrap() {
        let mut ring = Ring::new(&[(500, "x")]);
        ring.join(200);

        let (owner, path) = ring.route(200, 500);

        assert_eq!(owner, BOOTSTRAP_ID);
        assert_eq!(path.as_slice(), &[200]);
        assert_eq!(ring.node(owner).store.get(500), Some(&"x".to_string()));
    }

    // ============================================================
    // INVARIANT TESTS
    // ============================================================

    #[test]
    fn test_invariants_across_joins_and_leaves() {
        let initial: Vec<(u32, String)> = (1..=MAX_ID).step_by(37).map(|k| (k, format!("v{}", k))).collect();
        let initial: Vec<(u32, &str)> = initial.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let mut ring = Ring::new(&initial);
        let total = ring.total_keys();
        ring.assert_invariants();

        for id in [300, 700, 100, 900, 500, 1024, 1, 650] {
            ring.join(id);
            ring.assert_invariants();
            assert_eq!(ring.total_keys(), total, "Join of {} lost keys", id);
        }

        for id in [700, 1, 1024, 300] {
            ring.leave(id);
            ring.assert_invariants();
            assert_eq!(ring.total_keys(), total, "Leave of {} lost keys", id);
        }

        ring.join(700);
        ring.assert_invariants();
    }

    #[test]
    fn test_routing_reaches_unique_owner_from_every_node() {
        let mut ring = Ring::new(&[]);
        for id in [120, 480, 800, 1000] {
            ring.join(id);
        }
        let members: Vec<NodeId> = ring.nodes.keys().copied().collect();

        for from in &members {
            for key in [1, 120, 121, 479, 480, 799, 801, 1000, 1001, 1024] {
                let (owner, path) = ring.route(*from, key);

                assert!(ring.node(owner).owns(key));
                assert!(path.len() < members.len(), "At most ring-size hops");
                let mut unique = path.as_slice().to_vec();
                unique.sort();
                unique.dedup();
                assert_eq!(unique.len(), path.len(), "Path has no duplicates");
                if path.is_empty() {
                    assert_eq!(owner, *from);
                } else {
                    assert_eq!(path.as_slice()[0], *from, "Path starts at the entry node");
                }
            }
        }
    }

    #[test]
    fn test_join_path_records_forwarders() {
        let mut ring = Ring::new(&[]);
        ring.join(700);

        // 0 owns [701,1024], so 300 is forwarded to 700, which owns [1,700].
        let path = ring.join(300);

        assert_eq!(path.as_slice(), &[0]);
        ring.assert_invariants();
    }
}
