//! Request ledger: which requests are known, pending, served or rejected.

use std::collections::BTreeSet;

use od_core::NodeId;

#[derive(Clone, Debug, Default)]
pub struct RequestLedger {
    released: BTreeSet<NodeId>,
    /// Released, not yet assigned, served or rejected.
    unserved_released: BTreeSet<NodeId>,
    served: BTreeSet<NodeId>,
    rejected: BTreeSet<NodeId>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `node` as known.  Returns `false` if it was already released.
    pub fn release(&mut self, node: NodeId) -> bool {
        if !self.released.insert(node) {
            return false;
        }
        if !self.served.contains(&node) && !self.rejected.contains(&node) {
            self.unserved_released.insert(node);
        }
        true
    }

    /// A resource committed to `node`.
    pub fn assign(&mut self, node: NodeId) {
        self.unserved_released.remove(&node);
    }

    pub fn serve(&mut self, node: NodeId) {
        self.unserved_released.remove(&node);
        self.served.insert(node);
    }

    pub fn reject(&mut self, node: NodeId) {
        self.unserved_released.remove(&node);
        self.rejected.insert(node);
    }

    pub fn is_released(&self, node: NodeId) -> bool {
        self.released.contains(&node)
    }

    pub fn is_served(&self, node: NodeId) -> bool {
        self.served.contains(&node)
    }

    pub fn released(&self) -> &BTreeSet<NodeId> {
        &self.released
    }

    pub fn unserved_released(&self) -> &BTreeSet<NodeId> {
        &self.unserved_released
    }

    pub fn served(&self) -> &BTreeSet<NodeId> {
        &self.served
    }

    pub fn rejected(&self) -> &BTreeSet<NodeId> {
        &self.rejected
    }
}
