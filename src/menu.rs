//! Navigation menu built from the permission tree.

use serde::Serialize;

use crate::permission::{MainOption, PermissionNode, PermissionTree};
use crate::types::{ModuleId, NodeId};

/// Sidebar entry.
///
/// Only leaves link to a route; entries with children are groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct NavItem {
    pub id: NodeId,
    pub title: String,
    pub module_id: Option<ModuleId>,
    pub parent_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Route name to navigate to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub main_options: Vec<MainOption>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavItem>,
}

impl From<&PermissionNode> for NavItem {
    fn from(node: &PermissionNode) -> Self {
        let children: Vec<NavItem> = node.children.iter().map(NavItem::from).collect();
        let to = if children.is_empty() {
            node.route.clone()
        } else {
            None
        };
        Self {
            id: node.id.clone(),
            title: node.title.clone().unwrap_or_default(),
            module_id: node.module_id.clone(),
            parent_id: node.parent_id.clone(),
            icon: node.icon.clone(),
            to,
            main_options: node.main_options.clone(),
            children,
        }
    }
}

/// Project the whole forest into menu entries, preserving order.
#[must_use]
pub fn navigation(tree: &PermissionTree) -> Vec<NavItem> {
    tree.roots().iter().map(NavItem::from).collect()
}
