use parking_lot::RwLock;

use crate::permission::{PermissionNode, PermissionTree};

/// Holds the permission tree fetched for the current session.
///
/// Writers swap in a whole new [`PermissionTree`]; readers get a cheap clone
/// of whatever snapshot was current, never a half-written one.
#[derive(Debug, Default)]
pub struct PermissionTreeCache {
    tree: RwLock<PermissionTree>,
}

impl PermissionTreeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tree: PermissionTree) {
        *self.tree.write() = tree;
    }

    /// Last stored tree, or an empty one if nothing was stored.
    #[must_use]
    pub fn get(&self) -> PermissionTree {
        self.tree.read().clone()
    }

    pub fn clear(&self) {
        self.set(PermissionTree::default());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    #[must_use]
    pub fn find_by_route_name(&self, name: &str) -> Option<PermissionNode> {
        self.tree.read().find_by_route_name(name).cloned()
    }
}
