// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tree interface: the sockets a tree exposes to group nodes.
//!
//! Interface sockets drive the sockets of `GroupInput`, `GroupOutput` and of
//! every `Group` node that uses the tree. Panels only group sockets.

use crate::ids::ItemId;
use crate::socket::{SocketDirection, SocketType};
use serde::{Deserialize, Serialize};

/// Socket or panel specific data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterfaceItemKind {
    /// A socket exposed by the tree
    Socket {
        /// Whether the socket is an input or output of the tree
        in_out: SocketDirection,
        /// Data type
        socket_type: SocketType,
        /// Identifier shared by the boundary sockets, e.g. `Socket_2`
        identifier: String,
        /// Hide the value field on group nodes
        hide_value: bool,
    },
    /// A collapsible group of sockets
    Panel {
        /// Collapsed by default
        default_closed: bool,
    },
}

/// One entry of a tree interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceItem {
    /// Unique item ID
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Tooltip
    pub description: String,
    /// Owning panel
    pub parent: Option<ItemId>,
    /// Socket or panel
    pub kind: InterfaceItemKind,
}

impl InterfaceItem {
    /// `SOCKET` or `PANEL`
    pub fn item_type(&self) -> &'static str {
        match self.kind {
            InterfaceItemKind::Socket { .. } => "SOCKET",
            InterfaceItemKind::Panel { .. } => "PANEL",
        }
    }

    /// Whether this item is a panel
    pub fn is_panel(&self) -> bool {
        matches!(self.kind, InterfaceItemKind::Panel { .. })
    }
}

/// Ordered interface of a tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interface {
    /// Items in display order
    pub items: Vec<InterfaceItem>,
    /// Index of the active item
    pub active_index: i64,
    next_identifier: u32,
}

impl Interface {
    /// Add a socket
    pub fn new_socket(
        &mut self,
        name: impl Into<String>,
        in_out: SocketDirection,
        socket_type: SocketType,
        parent: Option<ItemId>,
    ) -> ItemId {
        let identifier = format!("Socket_{}", self.next_identifier);
        self.next_identifier += 1;
        self.push(InterfaceItem {
            id: ItemId::new(),
            name: name.into(),
            description: String::new(),
            parent,
            kind: InterfaceItemKind::Socket {
                in_out,
                socket_type,
                identifier,
                hide_value: false,
            },
        })
    }

    /// Add a panel
    pub fn new_panel(&mut self, name: impl Into<String>) -> ItemId {
        self.push(InterfaceItem {
            id: ItemId::new(),
            name: name.into(),
            description: String::new(),
            parent: None,
            kind: InterfaceItemKind::Panel {
                default_closed: false,
            },
        })
    }

    fn push(&mut self, item: InterfaceItem) -> ItemId {
        let id = item.id;
        self.items.push(item);
        id
    }

    /// Remove every item; identifiers keep counting
    pub fn clear(&mut self) {
        self.items.clear();
        self.active_index = 0;
    }

    /// Get an item by ID
    pub fn item(&self, id: ItemId) -> Option<&InterfaceItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Get a mutable item by ID
    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut InterfaceItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// Position of an item
    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }

    /// Sockets in one direction, as (identifier, name, type)
    pub fn sockets(&self, in_out: SocketDirection) -> impl Iterator<Item = (&str, &str, SocketType)> + '_ {
        self.items.iter().filter_map(move |item| match &item.kind {
            InterfaceItemKind::Socket {
                in_out: dir,
                socket_type,
                identifier,
                ..
            } if *dir == in_out => Some((identifier.as_str(), item.name.as_str(), *socket_type)),
            _ => None,
        })
    }
}
