use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::protocol::OpId;

const MAX_REMEMBERED_OPS: usize = 10_000;

/// Operation ids this node has already acted on.
///
/// A retried delivery carries the same id as the original, so checking here
/// makes forwarding idempotent. The log is wiped once it grows past its bound;
/// a retry older than that window is acted on again.
#[derive(Debug, Default)]
pub struct SeenOps {
    processed_ops: DashMap<String, ()>,
}

impl SeenOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time an id is seen and records it. Of two
    /// concurrent deliveries of the same id exactly one gets `true`.
    pub fn should_process(&self, op_id: &OpId) -> bool {
        if self.processed_ops.len() > MAX_REMEMBERED_OPS {
            self.processed_ops.clear();
        }
        match self.processed_ops.entry(op_id.0.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.processed_ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_ops.is_empty()
    }
}
