// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node instances and their item lists.

use crate::ids::{DatablockId, ItemId, NodeId, SocketId, TreeId};
use crate::kinds::NodeKind;
use crate::socket::{Socket, SocketType};
use indexmap::IndexMap;
use nodeclip_engine::Scalar;
use serde::{Deserialize, Serialize};

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Group boundaries and nested groups
    Group,
    /// Input nodes (constants, data lookups)
    Input,
    /// Output nodes
    Output,
    /// Math operations
    Math,
    /// Geometry operations
    Geometry,
    /// Texture operations
    Texture,
    /// Control flow (zones, switches)
    Flow,
    /// Layout helpers
    Layout,
}

/// Value of a kind-specific node property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Enum identifier
    Enum(String),
}

impl PropValue {
    /// Reflected form
    pub fn to_scalar(&self) -> Scalar {
        match self {
            Self::Bool(v) => Scalar::Bool(*v),
            Self::Int(v) => Scalar::Int(*v),
            Self::Float(v) => Scalar::Float(*v),
            Self::Enum(v) => Scalar::Enum(v.clone()),
        }
    }

    /// Convert a reflected value to the same variant as `self`
    pub fn with_scalar(&self, scalar: &Scalar) -> Option<Self> {
        match (self, scalar) {
            (Self::Bool(_), Scalar::Bool(v)) => Some(Self::Bool(*v)),
            (Self::Int(_), Scalar::Int(v)) => Some(Self::Int(*v)),
            (Self::Float(_), Scalar::Float(v)) => Some(Self::Float(*v)),
            (Self::Enum(_), Scalar::Enum(v) | Scalar::String(v)) => Some(Self::Enum(v.clone())),
            _ => None,
        }
    }
}

/// Item lists some nodes carry, each driving a set of sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemsKind {
    /// State passed around a repeat zone
    Repeat,
    /// Menu entries of a menu switch
    Enum,
    /// Extra values shown by a viewer
    Viewer,
}

impl ItemsKind {
    /// All item kinds
    pub const ALL: [ItemsKind; 3] = [Self::Repeat, Self::Enum, Self::Viewer];

    /// Property identifier of the item collection
    pub fn identifier(self) -> &'static str {
        match self {
            Self::Repeat => "repeat_items",
            Self::Enum => "enum_items",
            Self::Viewer => "viewer_items",
        }
    }

    /// Reflected type of the collection wrapper
    pub fn wrapper_type(self) -> &'static str {
        match self {
            Self::Repeat => "RepeatItems",
            Self::Enum => "EnumItems",
            Self::Viewer => "ViewerItems",
        }
    }

    /// Reflected type of the items
    pub fn element_type(self) -> &'static str {
        match self {
            Self::Repeat => "RepeatItem",
            Self::Enum => "EnumItem",
            Self::Viewer => "ViewerItem",
        }
    }

    /// Kind owning a collection identifier
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.identifier() == identifier)
    }
}

/// One entry of a node's item list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeItem {
    /// Unique item ID
    pub id: ItemId,
    /// Number used in the socket identifiers, `Item_<n>`
    pub identifier: u32,
    /// Display name, also the socket name
    pub name: String,
    /// Data type of the item sockets
    pub socket_type: SocketType,
    /// Tooltip (menu entries)
    pub description: String,
    /// Remove the item once its socket is unlinked (viewer items)
    pub auto_remove: bool,
}

impl NodeItem {
    /// Identifier of the sockets generated for this item
    pub fn socket_identifier(&self) -> String {
        format!("Item_{}", self.identifier)
    }
}

/// A node instance in a tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Node type tag
    pub node_type: String,
    /// Unique name within the tree
    pub name: String,
    /// Label shown instead of the name
    pub label: String,
    /// Position in the editor
    pub location: [f64; 2],
    /// Width in the editor
    pub width: f64,
    /// Collapsed
    pub hide: bool,
    /// Bypassed during evaluation
    pub mute: bool,
    /// Selected in the editor
    pub select: bool,
    /// Frame containing the node
    pub parent: Option<NodeId>,
    /// Input sockets
    pub inputs: Vec<Socket>,
    /// Output sockets
    pub outputs: Vec<Socket>,
    /// Kind-specific simple properties
    pub properties: IndexMap<String, PropValue>,
    /// Tree used by a group node
    pub node_tree: Option<TreeId>,
    /// Image, object or text a node refers to
    pub datablock: Option<DatablockId>,
    /// Zone output a zone input is paired with
    pub paired_output: Option<NodeId>,
    /// Items of the node's item list
    pub items: Vec<NodeItem>,
    next_item_identifier: u32,
}

impl Node {
    /// Create a new node from a kind definition
    pub fn new(kind: &NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            node_type: kind.id.clone(),
            name: kind.name.clone(),
            label: String::new(),
            location: [0.0, 0.0],
            width: kind.width,
            hide: false,
            mute: false,
            select: false,
            parent: None,
            inputs: kind.inputs.iter().map(Socket::fresh).collect(),
            outputs: kind.outputs.iter().map(Socket::fresh).collect(),
            properties: kind
                .properties
                .iter()
                .map(|p| (p.identifier.clone(), p.default.clone()))
                .collect(),
            node_tree: None,
            datablock: None,
            paired_output: None,
            items: Vec::new(),
            next_item_identifier: 0,
        }
    }

    /// Set the position
    pub fn with_location(mut self, x: f64, y: f64) -> Self {
        self.location = [x, y];
        self
    }

    /// Get an input socket by identifier
    pub fn input(&self, identifier: &str) -> Option<&Socket> {
        self.inputs.iter().find(|s| s.identifier == identifier)
    }

    /// Get an output socket by identifier
    pub fn output(&self, identifier: &str) -> Option<&Socket> {
        self.outputs.iter().find(|s| s.identifier == identifier)
    }

    /// Get a socket by ID
    pub fn socket(&self, socket_id: SocketId) -> Option<&Socket> {
        self.sockets().find(|s| s.id == socket_id)
    }

    /// Get a mutable socket by ID
    pub fn socket_mut(&mut self, socket_id: SocketId) -> Option<&mut Socket> {
        self.inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .find(|s| s.id == socket_id)
    }

    /// Get all sockets
    pub fn sockets(&self) -> impl Iterator<Item = &Socket> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Get an item by ID
    pub fn item(&self, item_id: ItemId) -> Option<&NodeItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Append an item with a name unique in the list
    pub fn push_item(&mut self, name: &str, socket_type: SocketType) -> ItemId {
        let name = unique_name(name, |candidate| self.items.iter().any(|i| i.name == candidate));
        let item = NodeItem {
            id: ItemId::new(),
            identifier: self.next_item_identifier,
            name,
            socket_type,
            description: String::new(),
            auto_remove: false,
        };
        self.next_item_identifier += 1;
        let id = item.id;
        self.items.push(item);
        id
    }
}

/// `base`, or `base.001`, `base.002`, ... for the first name not taken
pub fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_owned();
    }
    // Strip an existing numeric suffix so "Tree.001" continues as "Tree.002"
    let stem = match base.rsplit_once('.') {
        Some((stem, suffix)) if suffix.len() == 3 && suffix.bytes().all(|b| b.is_ascii_digit()) => stem,
        _ => base,
    };
    (1..)
        .map(|n| format!("{stem}.{n:03}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_owned())
}
