//! Permission (menu) tree returned by the backend.

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{ModuleId, NodeId, OptionId};

/// Capability flag on a menu entry ("List", "Create", "Edit", "Delete", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct MainOption {
    pub id: OptionId,
    pub name: String,
}

impl MainOption {
    #[must_use]
    pub fn new(id: impl Into<OptionId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One entry of the permission forest.
///
/// Deserializing goes through [`PermissionNode::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct PermissionNode {
    pub id: NodeId,
    /// Route identifier matched against navigation targets.
    pub route: Option<String>,
    /// Display title (the backend's `name` field).
    #[serde(rename = "name")]
    pub title: Option<String>,
    pub module_id: Option<ModuleId>,
    pub parent_id: Option<NodeId>,
    pub icon: Option<String>,
    pub children: Vec<PermissionNode>,
    pub main_options: Vec<MainOption>,
}

impl PermissionNode {
    /// Decode one backend node, keeping whatever is usable.
    ///
    /// Only an object with a string or integer `id` is required; anything
    /// else is `None`. Fields of the wrong type read as absent, malformed
    /// main options are skipped, and a malformed child is dropped alone
    /// while its parent and siblings stay.
    #[must_use]
    pub fn from_value(value: JsonValue) -> Option<Self> {
        let JsonValue::Object(mut fields) = value else {
            return None;
        };
        let id: NodeId = fields.remove("id").and_then(lenient)?;
        let children = match fields.remove("children") {
            Some(JsonValue::Array(items)) => decode_nodes(items),
            _ => Vec::new(),
        };
        let main_options = match fields.remove("main_options") {
            Some(JsonValue::Array(items)) => items
                .into_iter()
                .filter_map(|item| {
                    let option = lenient::<MainOption>(item);
                    if option.is_none() {
                        tracing::debug!(node = %id, "Skipping malformed main option");
                    }
                    option
                })
                .collect(),
            _ => Vec::new(),
        };
        Some(Self {
            route: fields.remove("route").and_then(lenient),
            title: fields.remove("name").and_then(lenient),
            module_id: fields.remove("module_id").and_then(lenient),
            parent_id: fields.remove("parent_id").and_then(lenient),
            icon: fields.remove("icon").and_then(lenient),
            id,
            children,
            main_options,
        })
    }

    #[must_use]
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            route: None,
            title: None,
            module_id: None,
            parent_id: None,
            icon: None,
            children: Vec::new(),
            main_options: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_module(mut self, module_id: impl Into<ModuleId>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Append a child, linking its `parent_id` to this node.
    #[must_use]
    pub fn with_child(mut self, mut child: PermissionNode) -> Self {
        child.parent_id = Some(self.id.clone());
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_option(mut self, option: MainOption) -> Self {
        self.main_options.push(option);
        self
    }

    #[must_use]
    pub fn has_option(&self, name: &str) -> bool {
        self.main_options.iter().any(|o| o.name == name)
    }
}

/// Immutable snapshot of the permission forest.
///
/// Clones share the same allocation; a refresh builds a new tree rather than
/// editing this one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionTree {
    roots: Arc<[PermissionNode]>,
}

impl PermissionTree {
    #[must_use]
    pub fn new(roots: Vec<PermissionNode>) -> Self {
        Self {
            roots: roots.into(),
        }
    }

    /// Decode a backend payload, tolerating malformed input.
    ///
    /// Anything but an array is an empty forest. Nodes that are not valid
    /// are dropped one by one, at any depth; see [`PermissionNode::from_value`].
    #[must_use]
    pub fn from_value(value: JsonValue) -> Self {
        let items = match value {
            JsonValue::Array(items) => items,
            JsonValue::Null => return Self::default(),
            _ => {
                tracing::warn!("Permission payload is not an array; using an empty tree");
                return Self::default();
            }
        };

        Self::new(decode_nodes(items))
    }

    #[must_use]
    pub fn roots(&self) -> &[PermissionNode] {
        &self.roots
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes in the forest.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Pre-order walk: forest order, then child order.
    ///
    /// A node whose id was already visited is skipped together with its subtree.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionNode> {
        DepthFirst::new(&self.roots)
    }

    /// First node (depth-first) whose route equals `name`.
    #[must_use]
    pub fn find_by_route_name(&self, name: &str) -> Option<&PermissionNode> {
        self.iter().find(|node| node.route.as_deref() == Some(name))
    }

    /// Main options attached to the route, empty when the route is unknown.
    #[must_use]
    pub fn options_for(&self, route: &str) -> &[MainOption] {
        self.find_by_route_name(route)
            .map(|node| node.main_options.as_slice())
            .unwrap_or_default()
    }

    /// `true` when the route carries the named option.
    #[must_use]
    pub fn has_permission(&self, route: &str, option: &str) -> bool {
        if option.is_empty() {
            return false;
        }
        self.find_by_route_name(route)
            .is_some_and(|node| node.has_option(option))
    }
}

impl From<Vec<PermissionNode>> for PermissionTree {
    fn from(roots: Vec<PermissionNode>) -> Self {
        Self::new(roots)
    }
}

impl<'de> Deserialize<'de> for PermissionTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Self::from_value)
    }
}

impl<'de> Deserialize<'de> for PermissionNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Self::from_value(value)
            .ok_or_else(|| D::Error::custom("permission node must be an object with an id"))
    }
}

impl Serialize for PermissionTree {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.roots[..].serialize(serializer)
    }
}

fn decode_nodes(items: Vec<JsonValue>) -> Vec<PermissionNode> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let node = PermissionNode::from_value(item);
            if node.is_none() {
                tracing::warn!(index, "Dropping malformed permission node");
            }
            node
        })
        .collect()
}

fn lenient<T: DeserializeOwned>(value: JsonValue) -> Option<T> {
    serde_json::from_value(value).ok()
}

struct DepthFirst<'a> {
    stack: Vec<&'a PermissionNode>,
    seen: HashSet<&'a NodeId>,
}

impl<'a> DepthFirst<'a> {
    fn new(roots: &'a [PermissionNode]) -> Self {
        Self {
            stack: roots.iter().rev().collect(),
            seen: HashSet::new(),
        }
    }
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a PermissionNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if !self.seen.insert(&node.id) {
                continue;
            }
            self.stack.extend(node.children.iter().rev());
            return Some(node);
        }
        None
    }
}
