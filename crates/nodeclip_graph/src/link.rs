// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for node trees.

use crate::ids::{LinkId, NodeId, SocketId};
use serde::{Deserialize, Serialize};

/// A link from an output socket to an input socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Unique link ID
    pub id: LinkId,
    /// Source node ID
    pub from_node: NodeId,
    /// Source socket ID
    pub from_socket: SocketId,
    /// Target node ID
    pub to_node: NodeId,
    /// Target socket ID
    pub to_socket: SocketId,
    /// Muted links pass nothing
    pub is_muted: bool,
    /// Position among the links ending in a multi-input socket
    pub multi_input_sort_id: i64,
}

impl Link {
    /// Create a new link
    pub fn new(from_node: NodeId, from_socket: SocketId, to_node: NodeId, to_socket: SocketId) -> Self {
        Self {
            id: LinkId::new(),
            from_node,
            from_socket,
            to_node,
            to_socket,
            is_muted: false,
            multi_input_sort_id: 0,
        }
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }

    /// Check if this link involves a specific socket
    pub fn involves_socket(&self, socket_id: SocketId) -> bool {
        self.from_socket == socket_id || self.to_socket == socket_id
    }
}
