// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node tree data structure containing nodes, links and an interface.

use crate::error::{GraphError, Result};
use crate::ids::{DatablockId, LinkId, NodeId, SocketId, TreeId};
use crate::interface::Interface;
use crate::link::Link;
use crate::node::{unique_name, Node};
use crate::socket::Socket;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of a node tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeKind {
    /// Geometry nodes
    Geometry,
    /// Shader nodes, used by materials
    Shader,
}

impl TreeKind {
    /// Type tag, also the reflected type name
    pub fn tag(self) -> &'static str {
        match self {
            Self::Geometry => "GeometryNodeTree",
            Self::Shader => "ShaderNodeTree",
        }
    }

    /// Parse a type tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "GeometryNodeTree" => Some(Self::Geometry),
            "ShaderNodeTree" => Some(Self::Shader),
            _ => None,
        }
    }
}

/// A node tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTree {
    /// Unique tree ID
    pub id: TreeId,
    /// Tree name
    pub name: String,
    /// Tree kind
    pub kind: TreeKind,
    /// Tooltip
    pub description: String,
    /// Keep the tree even when unused
    pub use_fake_user: bool,
    /// Color tag shown in the asset browser
    pub color_tag: String,
    /// Library the tree is linked from, `None` when local
    pub library: Option<String>,
    /// Owned by a material rather than listed on its own
    pub embedded: bool,
    /// Text block with notes about the tree
    pub annotation: Option<DatablockId>,
    /// Sockets exposed to group nodes
    pub interface: Interface,
    /// Nodes in the tree
    nodes: IndexMap<NodeId, Node>,
    /// Links between sockets
    links: IndexMap<LinkId, Link>,
    /// Node shown as active in the editor
    pub active_node: Option<NodeId>,
}

impl NodeTree {
    /// Create a new empty tree
    pub fn new(name: impl Into<String>, kind: TreeKind) -> Self {
        Self {
            id: TreeId::new(),
            name: name.into(),
            kind,
            description: String::new(),
            use_fake_user: false,
            color_tag: "NONE".to_owned(),
            library: None,
            embedded: false,
            annotation: None,
            interface: Interface::default(),
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            active_node: None,
        }
    }

    /// Whether the tree is owned by this library
    pub fn is_local(&self) -> bool {
        self.library.is_none()
    }

    /// Add a node to the tree, making its name unique
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        node.name = self.unique_node_name(&node.name, None);
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and its links
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let removed: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.involves_node(node_id))
            .map(|l| l.id)
            .collect();
        for link_id in removed {
            self.disconnect(link_id);
        }
        for node in self.nodes.values_mut() {
            if node.parent == Some(node_id) {
                node.parent = None;
            }
        }
        if self.active_node == Some(node_id) {
            self.active_node = None;
        }
        self.nodes.shift_remove(&node_id)
    }

    /// Remove all nodes and links
    pub fn clear(&mut self) {
        self.links.clear();
        self.nodes.clear();
        self.active_node = None;
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get a node by position
    pub fn node_at(&self, index: usize) -> Option<&Node> {
        self.nodes.get_index(index).map(|(_, node)| node)
    }

    /// Position of a node
    pub fn node_index(&self, node_id: NodeId) -> Option<usize> {
        self.nodes.get_index_of(&node_id)
    }

    /// Get a node by name
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// `name`, suffixed if another node already uses it
    pub fn unique_node_name(&self, name: &str, except: Option<NodeId>) -> String {
        unique_name(name, |candidate| {
            self.nodes
                .values()
                .any(|n| n.name == candidate && Some(n.id) != except)
        })
    }

    /// Find a node and one of its sockets
    pub fn socket(&self, node_id: NodeId, socket_id: SocketId) -> Result<(&Node, &Socket)> {
        let node = self.nodes.get(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let socket = node.socket(socket_id).ok_or(GraphError::SocketNotFound(socket_id))?;
        Ok((node, socket))
    }

    /// Add a link between sockets
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_socket: SocketId,
        to_node: NodeId,
        to_socket: SocketId,
    ) -> Result<LinkId> {
        let (_, source) = self.socket(from_node, from_socket)?;
        let (_, target) = self.socket(to_node, to_socket)?;

        // Links always run from an output to an input
        if !source.is_output() || target.is_output() {
            return Err(GraphError::IncompatibleSockets);
        }
        if !source.socket_type.can_connect_to(target.socket_type) {
            return Err(GraphError::IncompatibleSockets);
        }

        let existing = self.links_to(to_socket).count();
        if !target.multi_input && existing > 0 {
            return Err(GraphError::SocketAlreadyLinked(to_socket));
        }

        // Prevent self-loops
        if from_node == to_node {
            return Err(GraphError::SelfLoop);
        }

        let mut link = Link::new(from_node, from_socket, to_node, to_socket);
        link.multi_input_sort_id = i64::try_from(existing).unwrap_or(i64::MAX);
        let id = link.id;
        self.links.insert(id, link);
        Ok(id)
    }

    /// Remove a link; later links into the same socket move up
    pub fn disconnect(&mut self, link_id: LinkId) -> Option<Link> {
        let link = self.links.shift_remove(&link_id)?;
        for other in self.links.values_mut() {
            if other.to_socket == link.to_socket && other.multi_input_sort_id > link.multi_input_sort_id {
                other.multi_input_sort_id -= 1;
            }
        }
        Some(link)
    }

    /// Exchange the positions of two links ending in the same socket
    pub fn swap_multi_input_sort_id(&mut self, a: LinkId, b: LinkId) -> Result<()> {
        let first = self.links.get(&a).ok_or(GraphError::LinkNotFound(a))?;
        let second = self.links.get(&b).ok_or(GraphError::LinkNotFound(b))?;
        if first.to_socket != second.to_socket {
            return Err(GraphError::IncompatibleSockets);
        }
        let (first_sort, second_sort) = (first.multi_input_sort_id, second.multi_input_sort_id);
        if let Some(link) = self.links.get_mut(&a) {
            link.multi_input_sort_id = second_sort;
        }
        if let Some(link) = self.links.get_mut(&b) {
            link.multi_input_sort_id = first_sort;
        }
        Ok(())
    }

    /// Get a link by ID
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// Get a mutable link by ID
    pub fn link_mut(&mut self, link_id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&link_id)
    }

    /// Get a link by position
    pub fn link_at(&self, index: usize) -> Option<&Link> {
        self.links.get_index(index).map(|(_, link)| link)
    }

    /// Get all links
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Get links from a specific socket
    pub fn links_from(&self, socket_id: SocketId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.from_socket == socket_id)
    }

    /// Get links to a specific socket
    pub fn links_to(&self, socket_id: SocketId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.to_socket == socket_id)
    }

    /// Links into a socket in multi-input order
    pub fn sorted_links_to(&self, socket_id: SocketId) -> Vec<&Link> {
        let mut links: Vec<&Link> = self.links_to(socket_id).collect();
        links.sort_by_key(|l| l.multi_input_sort_id);
        links
    }

    /// Whether a socket has any link
    pub fn is_linked(&self, socket_id: SocketId) -> bool {
        self.links.values().any(|l| l.involves_socket(socket_id))
    }

    /// Remove every link touching a socket that no longer exists
    pub fn prune_links(&mut self) {
        let dangling: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| {
                self.socket(l.from_node, l.from_socket).is_err()
                    || self.socket(l.to_node, l.to_socket).is_err()
            })
            .map(|l| l.id)
            .collect();
        for link_id in dangling {
            self.disconnect(link_id);
        }
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::KindRegistry;

    fn tree_with(kinds: &[&str]) -> (NodeTree, Vec<NodeId>) {
        let registry = KindRegistry::builtin();
        let mut tree = NodeTree::new("Tree", TreeKind::Geometry);
        let ids = kinds
            .iter()
            .map(|k| tree.add_node(Node::new(registry.get(k).unwrap())))
            .collect();
        (tree, ids)
    }

    fn output(tree: &NodeTree, node: NodeId, identifier: &str) -> SocketId {
        tree.node(node).unwrap().output(identifier).unwrap().id
    }

    fn input(tree: &NodeTree, node: NodeId, identifier: &str) -> SocketId {
        tree.node(node).unwrap().input(identifier).unwrap().id
    }

    #[test]
    fn test_node_names_are_unique() {
        let (tree, ids) = tree_with(&["Cube", "Cube", "Cube"]);
        let names: Vec<_> = ids.iter().map(|id| tree.node(*id).unwrap().name.clone()).collect();
        assert_eq!(names, ["Cube", "Cube.001", "Cube.002"]);
    }

    #[test]
    fn test_connect_validation() {
        let (mut tree, ids) = tree_with(&["Cube", "Join", "Math"]);
        let (cube, join, math) = (ids[0], ids[1], ids[2]);

        let mesh = output(&tree, cube, "Mesh");
        let geometry = input(&tree, join, "Geometry");
        assert!(tree.connect(cube, mesh, join, geometry).is_ok());

        let value = input(&tree, math, "Value");
        assert_eq!(
            tree.connect(cube, mesh, math, value),
            Err(GraphError::IncompatibleSockets)
        );
        let math_out = output(&tree, math, "Value");
        assert_eq!(
            tree.connect(math, math_out, math, value),
            Err(GraphError::SelfLoop)
        );
        let vertices = input(&tree, cube, "Vertices X");
        assert!(tree.connect(math, math_out, cube, vertices).is_ok());
        assert_eq!(
            tree.connect(math, math_out, cube, vertices),
            Err(GraphError::SocketAlreadyLinked(vertices))
        );
    }

    #[test]
    fn test_multi_input_order() {
        let (mut tree, ids) = tree_with(&["Cube", "Cube", "Cube", "Join"]);
        let join = ids[3];
        let target = input(&tree, join, "Geometry");
        let links: Vec<LinkId> = ids[..3]
            .iter()
            .map(|cube| {
                let mesh = output(&tree, *cube, "Mesh");
                tree.connect(*cube, mesh, join, target).unwrap()
            })
            .collect();
        let order = |tree: &NodeTree| -> Vec<LinkId> { tree.sorted_links_to(target).iter().map(|l| l.id).collect() };
        assert_eq!(order(&tree), links);

        tree.swap_multi_input_sort_id(links[0], links[2]).unwrap();
        assert_eq!(order(&tree), vec![links[2], links[1], links[0]]);

        tree.disconnect(links[1]);
        assert_eq!(order(&tree), vec![links[2], links[0]]);
        assert_eq!(tree.link(links[0]).unwrap().multi_input_sort_id, 1);
    }

    #[test]
    fn test_remove_node_removes_links() {
        let (mut tree, ids) = tree_with(&["Cube", "Join"]);
        let mesh = output(&tree, ids[0], "Mesh");
        let geometry = input(&tree, ids[1], "Geometry");
        tree.connect(ids[0], mesh, ids[1], geometry).unwrap();
        tree.remove_node(ids[0]);
        assert_eq!(tree.link_count(), 0);
        assert_eq!(tree.node_count(), 1);
    }
}
