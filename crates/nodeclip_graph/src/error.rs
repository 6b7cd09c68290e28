// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for library operations.

use crate::ids::{LinkId, NodeId, SocketId, TreeId};
use nodeclip_engine::ModelError;

/// Error raised by a library operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Tree not found
    #[error("Tree not found: {0}")]
    TreeNotFound(String),

    /// Tree ID not found
    #[error("Tree not found: {0:?}")]
    TreeIdNotFound(TreeId),

    /// Material not found
    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Socket not found
    #[error("Socket not found: {0:?}")]
    SocketNotFound(SocketId),

    /// Link not found
    #[error("Link not found: {0:?}")]
    LinkNotFound(LinkId),

    /// No node kind registered under this type tag
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The node kind cannot be used in this tree
    #[error("Node type {node_type} is not allowed in a {tree_type}")]
    NodeNotAllowed {
        /// Node type tag
        node_type: String,
        /// Tree type tag
        tree_type: String,
    },

    /// The operation does not apply to this node
    #[error("Node '{node}' does not support {operation}")]
    Unsupported {
        /// Node name
        node: String,
        /// Attempted operation
        operation: String,
    },

    /// Incompatible socket types
    #[error("Incompatible socket types")]
    IncompatibleSockets,

    /// Input socket is already linked
    #[error("Socket already linked: {0:?}")]
    SocketAlreadyLinked(SocketId),

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// A multi-input position beyond the links that end in the socket
    #[error("Sort id {wanted} is out of range for {count} link(s)")]
    SortIdOutOfRange {
        /// Requested position
        wanted: i64,
        /// Links ending in the socket
        count: usize,
    },

    /// Menu value outside the socket's choices
    #[error("'{value}' is not one of the menu choices [{}]", .choices.join(", "))]
    NotInMenuDomain {
        /// Rejected value
        value: String,
        /// Choices at the time of the assignment
        choices: Vec<String>,
    },

    /// Tree is linked from another library and cannot be edited
    #[error("Tree '{0}' is linked from a library")]
    LinkedData(String),

    /// Group node would reference its own tree
    #[error("Tree '{0}' cannot contain itself")]
    RecursiveGroup(String),
}

/// Library result type
pub type Result<T> = std::result::Result<T, GraphError>;

impl From<GraphError> for ModelError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::TreeNotFound(_)
            | GraphError::TreeIdNotFound(_)
            | GraphError::MaterialNotFound(_)
            | GraphError::NodeNotFound(_)
            | GraphError::SocketNotFound(_)
            | GraphError::LinkNotFound(_) => ModelError::Stale(err.to_string()),
            other => ModelError::Rejected(other.to_string()),
        }
    }
}
