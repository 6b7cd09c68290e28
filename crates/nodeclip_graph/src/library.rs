// SPDX-License-Identifier: MIT OR Apache-2.0
//! The node library: every tree, material and datablock of a file.
//!
//! Editing goes through the library rather than through trees directly,
//! because many edits have effects beyond one node. Changing an interface
//! updates the sockets of every group node using the tree, pairing a zone
//! gives the zone input its item sockets, and unlinking a viewer socket may
//! remove the viewer item that created it.

use crate::datablock::{Datablock, DatablockKind};
use crate::error::{GraphError, Result};
use crate::ids::{DatablockId, ItemId, LinkId, MaterialId, NodeId, SocketId, TreeId};
use crate::interface::InterfaceItem;
use crate::kinds::{KindRegistry, NodeRole};
use crate::node::{unique_name, ItemsKind, Node, NodeItem, PropValue};
use crate::socket::{Socket, SocketDirection, SocketType, SocketValue};
use crate::tree::{NodeTree, TreeKind};
use indexmap::IndexMap;
use nodeclip_engine::Schema;
use serde::{Deserialize, Serialize};

/// Version string of this host, written into exported documents
pub const HOST_VERSION: &str = concat!("nodeclip-graph ", env!("CARGO_PKG_VERSION"));

/// Menu domains are traced through at most this many group levels
const MAX_MENU_DEPTH: usize = 8;

/// A material with its embedded shader tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    /// Unique material ID
    pub id: MaterialId,
    /// Unique material name
    pub name: String,
    /// Render pass index
    pub pass_index: i64,
    /// Library the material is linked from, `None` when local
    pub library: Option<String>,
    /// The embedded tree
    pub node_tree: TreeId,
}

/// Trees, materials and datablocks of one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    /// Host version written into exported documents
    pub version: String,
    trees: IndexMap<TreeId, NodeTree>,
    materials: IndexMap<MaterialId, Material>,
    datablocks: IndexMap<DatablockId, Datablock>,
    #[serde(skip, default = "KindRegistry::builtin")]
    kinds: KindRegistry,
    #[serde(skip, default = "crate::schema::build")]
    pub(crate) schema: Schema,
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

impl Library {
    /// Create an empty library with the built-in node kinds
    pub fn new() -> Self {
        Self {
            version: HOST_VERSION.to_owned(),
            trees: IndexMap::new(),
            materials: IndexMap::new(),
            datablocks: IndexMap::new(),
            kinds: KindRegistry::builtin(),
            schema: crate::schema::build(),
        }
    }

    /// Registered node kinds
    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    // ========================================================================
    // Trees, materials, datablocks
    // ========================================================================

    fn unique_tree_name(&self, name: &str) -> String {
        unique_name(name, |candidate| self.trees().any(|t| t.name == candidate))
    }

    /// Create a top-level tree; the name gets a suffix if already taken
    pub fn new_tree(&mut self, name: &str, kind: TreeKind) -> TreeId {
        let tree = NodeTree::new(self.unique_tree_name(name), kind);
        let id = tree.id;
        tracing::trace!("New tree '{}'", tree.name);
        self.trees.insert(id, tree);
        id
    }

    /// Create a tree that stands for one linked from another library file
    pub fn link_tree(&mut self, name: &str, kind: TreeKind, library: &str) -> TreeId {
        let id = self.new_tree(name, kind);
        if let Some(tree) = self.trees.get_mut(&id) {
            tree.library = Some(library.to_owned());
        }
        id
    }

    /// Get a tree by ID, embedded ones included
    pub fn tree(&self, tree_id: TreeId) -> Result<&NodeTree> {
        self.trees.get(&tree_id).ok_or(GraphError::TreeIdNotFound(tree_id))
    }

    /// Get a locally owned tree for editing
    pub fn tree_mut(&mut self, tree_id: TreeId) -> Result<&mut NodeTree> {
        let tree = self
            .trees
            .get_mut(&tree_id)
            .ok_or(GraphError::TreeIdNotFound(tree_id))?;
        if !tree.is_local() {
            return Err(GraphError::LinkedData(tree.name.clone()));
        }
        Ok(tree)
    }

    /// Get a top-level tree by name
    pub fn tree_by_name(&self, name: &str) -> Option<&NodeTree> {
        self.trees().find(|t| t.name == name)
    }

    /// Top-level trees, materials' trees excluded
    pub fn trees(&self) -> impl Iterator<Item = &NodeTree> {
        self.trees.values().filter(|t| !t.embedded)
    }

    /// Create a material with an empty shader tree containing an output node
    pub fn new_material(&mut self, name: &str) -> MaterialId {
        let name = unique_name(name, |candidate| self.materials.values().any(|m| m.name == candidate));
        let mut tree = NodeTree::new("Shader Nodetree", TreeKind::Shader);
        tree.embedded = true;
        let tree_id = tree.id;
        self.trees.insert(tree_id, tree);
        if let Err(err) = self.add_node(tree_id, "MaterialOutput") {
            tracing::warn!("Material '{name}' starts without an output node: {err}");
        }

        let material = Material {
            id: MaterialId::new(),
            name,
            pass_index: 0,
            library: None,
            node_tree: tree_id,
        };
        let id = material.id;
        self.materials.insert(id, material);
        id
    }

    /// Get a material by ID
    pub fn material(&self, material_id: MaterialId) -> Option<&Material> {
        self.materials.get(&material_id)
    }

    /// Get a mutable material by ID
    pub fn material_mut(&mut self, material_id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(&material_id)
    }

    /// Get a material by name
    pub fn material_by_name(&self, name: &str) -> Option<&Material> {
        self.materials.values().find(|m| m.name == name)
    }

    /// All materials
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.materials.values()
    }

    /// Create an image, object or text; names are unique per kind
    pub fn new_datablock(&mut self, name: &str, kind: DatablockKind) -> DatablockId {
        let name = unique_name(name, |candidate| {
            self.datablocks
                .values()
                .any(|d| d.kind == kind && d.name == candidate)
        });
        let datablock = Datablock::new(name, kind);
        let id = datablock.id;
        self.datablocks.insert(id, datablock);
        id
    }

    /// Get a datablock by ID
    pub fn datablock(&self, datablock_id: DatablockId) -> Option<&Datablock> {
        self.datablocks.get(&datablock_id)
    }

    /// Get a datablock by kind and name
    pub fn datablock_by_name(&self, kind: DatablockKind, name: &str) -> Option<&Datablock> {
        self.datablocks
            .values()
            .find(|d| d.kind == kind && d.name == name)
    }

    /// Set the annotation text of a tree
    pub fn set_annotation(&mut self, tree_id: TreeId, text: Option<DatablockId>) -> Result<()> {
        self.tree_mut(tree_id)?.annotation = text;
        Ok(())
    }

    /// Remove all nodes and links of a tree
    pub fn clear_tree(&mut self, tree_id: TreeId) -> Result<()> {
        self.tree_mut(tree_id)?.clear();
        Ok(())
    }

    /// Trees used by group nodes of a tree, in node order
    pub fn group_trees(&self, tree_id: TreeId) -> Result<Vec<TreeId>> {
        let mut out = Vec::new();
        for node in self.tree(tree_id)?.nodes() {
            if let Some(sub) = node.node_tree {
                if !out.contains(&sub) {
                    out.push(sub);
                }
            }
        }
        Ok(out)
    }

    /// Whether `tree_id` uses `target` through group nodes at any depth
    fn uses_tree(&self, tree_id: TreeId, target: TreeId, depth: usize) -> bool {
        if depth > self.trees.len() {
            return true;
        }
        self.group_trees(tree_id)
            .unwrap_or_default()
            .into_iter()
            .any(|sub| sub == target || self.uses_tree(sub, target, depth + 1))
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Get a node
    pub fn node(&self, tree_id: TreeId, node_id: NodeId) -> Result<&Node> {
        self.tree(tree_id)?
            .node(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    fn node_mut(&mut self, tree_id: TreeId, node_id: NodeId) -> Result<&mut Node> {
        self.tree_mut(tree_id)?
            .node_mut(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    fn role(&self, node: &Node) -> NodeRole {
        self.kinds
            .get(&node.node_type)
            .map_or(NodeRole::Plain, |k| k.role)
    }

    /// Add a node of a kind, with the kind's default items
    pub fn add_node(&mut self, tree_id: TreeId, node_type: &str) -> Result<NodeId> {
        let kind = self
            .kinds
            .get(node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_owned()))?;
        let tree_kind = self.tree(tree_id)?.kind;
        if !kind.allowed_in(tree_kind) {
            return Err(GraphError::NodeNotAllowed {
                node_type: node_type.to_owned(),
                tree_type: tree_kind.tag().to_owned(),
            });
        }

        let role = kind.role;
        let mut node = Node::new(kind);
        match role {
            NodeRole::RepeatOutput => {
                node.push_item("Geometry", SocketType::Geometry);
            }
            NodeRole::MenuSwitch => {
                node.push_item("A", SocketType::Float);
                node.push_item("B", SocketType::Float);
            }
            _ => {}
        }
        let node_id = self.tree_mut(tree_id)?.add_node(node);
        self.refresh_node(tree_id, node_id)?;

        if role == NodeRole::MenuSwitch {
            let menu = self.node(tree_id, node_id)?.input("Menu").map(|s| s.id);
            if let Some(menu) = menu {
                self.set_socket_value(tree_id, node_id, menu, SocketValue::Menu("A".to_owned()))?;
            }
        }
        tracing::trace!("Added {node_type} to tree {:?}", tree_id);
        Ok(node_id)
    }

    /// Remove a node and its links
    pub fn remove_node(&mut self, tree_id: TreeId, node_id: NodeId) -> Result<()> {
        let tree = self.tree_mut(tree_id)?;
        tree.remove_node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let paired: Vec<NodeId> = tree
            .nodes()
            .filter(|n| n.paired_output == Some(node_id))
            .map(|n| n.id)
            .collect();
        for input in paired {
            self.node_mut(tree_id, input)?.paired_output = None;
            self.refresh_node(tree_id, input)?;
        }
        Ok(())
    }

    /// Rename a node; returns the unique name it received
    pub fn set_node_name(&mut self, tree_id: TreeId, node_id: NodeId, name: &str) -> Result<String> {
        let tree = self.tree_mut(tree_id)?;
        let name = tree.unique_node_name(name, Some(node_id));
        tree.node_mut(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?
            .name
            .clone_from(&name);
        Ok(name)
    }

    /// Put a node into a frame, or take it out with `None`
    pub fn set_node_parent(&mut self, tree_id: TreeId, node_id: NodeId, parent: Option<NodeId>) -> Result<()> {
        if let Some(parent_id) = parent {
            let frame = self.node(tree_id, parent_id)?;
            if parent_id == node_id || self.role(frame) != NodeRole::Frame {
                return Err(GraphError::Unsupported {
                    node: frame.name.clone(),
                    operation: "parenting".to_owned(),
                });
            }
        }
        self.node_mut(tree_id, node_id)?.parent = parent;
        Ok(())
    }

    /// Set the active node
    pub fn set_active_node(&mut self, tree_id: TreeId, node_id: Option<NodeId>) -> Result<()> {
        let tree = self.tree_mut(tree_id)?;
        if let Some(id) = node_id {
            tree.node(id).ok_or(GraphError::NodeNotFound(id))?;
        }
        tree.active_node = node_id;
        Ok(())
    }

    /// Set a kind-specific property; enum values must be one of the choices
    pub fn set_node_property(
        &mut self,
        tree_id: TreeId,
        node_id: NodeId,
        identifier: &str,
        value: PropValue,
    ) -> Result<()> {
        let node = self.node(tree_id, node_id)?;
        let unsupported = || GraphError::Unsupported {
            node: node.name.clone(),
            operation: format!("property '{identifier}'"),
        };
        let property = self
            .kinds
            .get(&node.node_type)
            .and_then(|k| k.property(identifier))
            .ok_or_else(unsupported)?;
        if std::mem::discriminant(&property.default) != std::mem::discriminant(&value) {
            return Err(unsupported());
        }
        if let PropValue::Enum(choice) = &value {
            if !property.choices.contains(choice) {
                return Err(GraphError::NotInMenuDomain {
                    value: choice.clone(),
                    choices: property.choices.clone(),
                });
            }
        }
        self.node_mut(tree_id, node_id)?
            .properties
            .insert(identifier.to_owned(), value);
        Ok(())
    }

    /// Make a group node use a tree
    pub fn set_group_tree(&mut self, tree_id: TreeId, node_id: NodeId, group: Option<TreeId>) -> Result<()> {
        let node = self.node(tree_id, node_id)?;
        if self.role(node) != NodeRole::Group {
            return Err(GraphError::Unsupported {
                node: node.name.clone(),
                operation: "a node tree".to_owned(),
            });
        }
        if let Some(group_id) = group {
            let group_tree = self.tree(group_id)?;
            let tree = self.tree(tree_id)?;
            if group_tree.kind != tree.kind || group_tree.embedded {
                return Err(GraphError::Unsupported {
                    node: group_tree.name.clone(),
                    operation: format!("use as a group in '{}'", tree.name),
                });
            }
            if group_id == tree_id || self.uses_tree(group_id, tree_id, 0) {
                return Err(GraphError::RecursiveGroup(tree.name.clone()));
            }
        }
        self.node_mut(tree_id, node_id)?.node_tree = group;
        self.refresh_node(tree_id, node_id)
    }

    /// Point a node at an image, object or text
    pub fn set_datablock(&mut self, tree_id: TreeId, node_id: NodeId, datablock: Option<DatablockId>) -> Result<()> {
        self.node_mut(tree_id, node_id)?.datablock = datablock;
        Ok(())
    }

    /// Pair a repeat input with a repeat output, giving the input its item sockets
    pub fn pair_zone(&mut self, tree_id: TreeId, input: NodeId, output: NodeId) -> Result<()> {
        let input_node = self.node(tree_id, input)?;
        let output_node = self.node(tree_id, output)?;
        if self.role(input_node) != NodeRole::RepeatInput || self.role(output_node) != NodeRole::RepeatOutput {
            return Err(GraphError::Unsupported {
                node: input_node.name.clone(),
                operation: format!("pairing with '{}'", output_node.name),
            });
        }
        tracing::trace!("Pairing '{}' with '{}'", input_node.name, output_node.name);
        self.node_mut(tree_id, input)?.paired_output = Some(output);
        self.refresh_node(tree_id, input)
    }

    // ========================================================================
    // Node items
    // ========================================================================

    fn items_node(&self, tree_id: TreeId, node_id: NodeId) -> Result<ItemsKind> {
        let node = self.node(tree_id, node_id)?;
        self.kinds
            .get(&node.node_type)
            .and_then(|k| k.items)
            .ok_or_else(|| GraphError::Unsupported {
                node: node.name.clone(),
                operation: "items".to_owned(),
            })
    }

    /// Append an item to a node's item list
    pub fn new_node_item(
        &mut self,
        tree_id: TreeId,
        node_id: NodeId,
        name: &str,
        socket_type: SocketType,
    ) -> Result<ItemId> {
        let kind = self.items_node(tree_id, node_id)?;
        // Menu entries always switch between float inputs
        let socket_type = if kind == ItemsKind::Enum { SocketType::Float } else { socket_type };
        let item = self.node_mut(tree_id, node_id)?.push_item(name, socket_type);
        self.refresh_items(tree_id, node_id)?;
        Ok(item)
    }

    /// Remove every item of a node's item list
    pub fn clear_node_items(&mut self, tree_id: TreeId, node_id: NodeId) -> Result<()> {
        self.items_node(tree_id, node_id)?;
        self.node_mut(tree_id, node_id)?.items.clear();
        self.refresh_items(tree_id, node_id)
    }

    /// Edit an item, then update the node's sockets
    pub fn update_node_item(
        &mut self,
        tree_id: TreeId,
        node_id: NodeId,
        item_id: ItemId,
        edit: impl FnOnce(&mut NodeItem),
    ) -> Result<()> {
        let kind = self.items_node(tree_id, node_id)?;
        let node = self.node_mut(tree_id, node_id)?;
        let index = node
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let mut item = node.items[index].clone();
        edit(&mut item);
        if kind == ItemsKind::Enum {
            item.socket_type = SocketType::Float;
        }
        item.name = unique_name(&item.name, |candidate| {
            node.items
                .iter()
                .any(|i| i.name == candidate && i.id != item_id)
        });
        node.items[index] = item;
        self.refresh_items(tree_id, node_id)?;
        self.apply_auto_remove(tree_id)
    }

    fn refresh_items(&mut self, tree_id: TreeId, node_id: NodeId) -> Result<()> {
        self.refresh_node(tree_id, node_id)?;
        let paired: Vec<NodeId> = self
            .tree(tree_id)?
            .nodes()
            .filter(|n| n.paired_output == Some(node_id))
            .map(|n| n.id)
            .collect();
        for input in paired {
            self.refresh_node(tree_id, input)?;
        }
        Ok(())
    }

    /// Drop auto-removed viewer items whose socket has no link
    fn apply_auto_remove(&mut self, tree_id: TreeId) -> Result<()> {
        let tree = self.tree(tree_id)?;
        let mut doomed: Vec<(NodeId, ItemId)> = Vec::new();
        for node in tree.nodes() {
            for item in node.items.iter().filter(|i| i.auto_remove) {
                let socket = node.input(&item.socket_identifier());
                if socket.map_or(true, |s| !tree.is_linked(s.id)) {
                    doomed.push((node.id, item.id));
                }
            }
        }
        for (node_id, item_id) in doomed {
            tracing::trace!("Auto-removing unlinked item of node {:?}", node_id);
            self.node_mut(tree_id, node_id)?.items.retain(|i| i.id != item_id);
            self.refresh_items(tree_id, node_id)?;
        }
        Ok(())
    }

    // ========================================================================
    // Sockets & links
    // ========================================================================

    /// Find the node owning a socket
    pub fn socket_owner(&self, tree_id: TreeId, socket_id: SocketId) -> Result<NodeId> {
        self.tree(tree_id)?
            .nodes()
            .find(|n| n.socket(socket_id).is_some())
            .map(|n| n.id)
            .ok_or(GraphError::SocketNotFound(socket_id))
    }

    /// Set the value of a socket; menu sockets only take one of their choices
    pub fn set_socket_value(
        &mut self,
        tree_id: TreeId,
        node_id: NodeId,
        socket_id: SocketId,
        value: SocketValue,
    ) -> Result<()> {
        let (_, socket) = self.tree(tree_id)?.socket(node_id, socket_id)?;
        if std::mem::discriminant(&socket.socket_type.default_value()) != std::mem::discriminant(&value) {
            return Err(GraphError::IncompatibleSockets);
        }
        if let SocketValue::Menu(choice) = &value {
            let choices = self.menu_domain(tree_id, node_id, socket_id)?;
            if !choices.contains(choice) {
                return Err(GraphError::NotInMenuDomain {
                    value: choice.clone(),
                    choices,
                });
            }
        }
        let node = self.node_mut(tree_id, node_id)?;
        if let Some(socket) = node.socket_mut(socket_id) {
            socket.value = value;
        }
        Ok(())
    }

    /// Hide or show a socket
    pub fn set_socket_hide(&mut self, tree_id: TreeId, node_id: NodeId, socket_id: SocketId, hide: bool) -> Result<()> {
        let node = self.node_mut(tree_id, node_id)?;
        node.socket_mut(socket_id)
            .ok_or(GraphError::SocketNotFound(socket_id))?
            .hide = hide;
        Ok(())
    }

    /// Choices a menu socket accepts.
    ///
    /// A menu switch's own menu input offers its entries. A group node's menu
    /// input offers whatever the matching group input socket feeds inside the
    /// group, and an output offers what the inputs it is linked to accept.
    pub fn menu_domain(&self, tree_id: TreeId, node_id: NodeId, socket_id: SocketId) -> Result<Vec<String>> {
        self.menu_domain_at(tree_id, node_id, socket_id, 0)
    }

    fn menu_domain_at(&self, tree_id: TreeId, node_id: NodeId, socket_id: SocketId, depth: usize) -> Result<Vec<String>> {
        let tree = self.tree(tree_id)?;
        let (node, socket) = tree.socket(node_id, socket_id)?;
        if socket.socket_type != SocketType::Menu || depth > MAX_MENU_DEPTH {
            return Ok(Vec::new());
        }

        if socket.is_output() {
            for link in tree.links_from(socket_id) {
                let domain = self.menu_domain_at(tree_id, link.to_node, link.to_socket, depth + 1)?;
                if !domain.is_empty() {
                    return Ok(domain);
                }
            }
            return Ok(Vec::new());
        }

        match self.role(node) {
            NodeRole::MenuSwitch if socket.identifier == "Menu" => {
                Ok(node.items.iter().map(|i| i.name.clone()).collect())
            }
            NodeRole::Group => {
                let Some(group_id) = node.node_tree else {
                    return Ok(Vec::new());
                };
                let group = self.tree(group_id)?;
                for boundary in group.nodes().filter(|n| self.role(n) == NodeRole::GroupInput) {
                    if let Some(inner) = boundary.output(&socket.identifier) {
                        let domain = self.menu_domain_at(group_id, boundary.id, inner.id, depth + 1)?;
                        if !domain.is_empty() {
                            return Ok(domain);
                        }
                    }
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Link two sockets given by node and socket identifier
    pub fn connect(
        &mut self,
        tree_id: TreeId,
        from_node: NodeId,
        from_identifier: &str,
        to_node: NodeId,
        to_identifier: &str,
    ) -> Result<LinkId> {
        let tree = self.tree(tree_id)?;
        let source = tree
            .node(from_node)
            .ok_or(GraphError::NodeNotFound(from_node))?
            .output(from_identifier)
            .ok_or_else(|| GraphError::Unsupported {
                node: from_identifier.to_owned(),
                operation: "linking".to_owned(),
            })?
            .id;
        let target = tree
            .node(to_node)
            .ok_or(GraphError::NodeNotFound(to_node))?
            .input(to_identifier)
            .ok_or_else(|| GraphError::Unsupported {
                node: to_identifier.to_owned(),
                operation: "linking".to_owned(),
            })?
            .id;
        self.tree_mut(tree_id)?.connect(from_node, source, to_node, target)
    }

    /// Link two sockets given by ID
    pub fn connect_sockets(&mut self, tree_id: TreeId, from_socket: SocketId, to_socket: SocketId) -> Result<LinkId> {
        let from_node = self.socket_owner(tree_id, from_socket)?;
        let to_node = self.socket_owner(tree_id, to_socket)?;
        self.tree_mut(tree_id)?
            .connect(from_node, from_socket, to_node, to_socket)
    }

    /// Remove a link, then drop auto-removed items it left unlinked
    pub fn disconnect(&mut self, tree_id: TreeId, link_id: LinkId) -> Result<()> {
        self.tree_mut(tree_id)?
            .disconnect(link_id)
            .ok_or(GraphError::LinkNotFound(link_id))?;
        self.apply_auto_remove(tree_id)
    }

    /// Exchange the multi-input positions of two links
    pub fn swap_links(&mut self, tree_id: TreeId, a: LinkId, b: LinkId) -> Result<()> {
        self.tree_mut(tree_id)?.swap_multi_input_sort_id(a, b)
    }

    /// Mute or unmute a link
    pub fn set_link_muted(&mut self, tree_id: TreeId, link_id: LinkId, muted: bool) -> Result<()> {
        self.tree_mut(tree_id)?
            .link_mut(link_id)
            .ok_or(GraphError::LinkNotFound(link_id))?
            .is_muted = muted;
        Ok(())
    }

    // ========================================================================
    // Interface
    // ========================================================================

    /// Add an interface socket
    pub fn interface_new_socket(
        &mut self,
        tree_id: TreeId,
        name: &str,
        in_out: SocketDirection,
        socket_type: SocketType,
        parent: Option<ItemId>,
    ) -> Result<ItemId> {
        let item = self
            .tree_mut(tree_id)?
            .interface
            .new_socket(name, in_out, socket_type, parent);
        self.refresh_interface_users(tree_id)?;
        Ok(item)
    }

    /// Add an interface panel
    pub fn interface_new_panel(&mut self, tree_id: TreeId, name: &str) -> Result<ItemId> {
        Ok(self.tree_mut(tree_id)?.interface.new_panel(name))
    }

    /// Remove every interface item
    pub fn interface_clear(&mut self, tree_id: TreeId) -> Result<()> {
        self.tree_mut(tree_id)?.interface.clear();
        self.refresh_interface_users(tree_id)
    }

    /// Edit an interface item, then update the sockets that mirror it
    pub fn update_interface_item(
        &mut self,
        tree_id: TreeId,
        item_id: ItemId,
        edit: impl FnOnce(&mut InterfaceItem),
    ) -> Result<()> {
        let item = self
            .tree_mut(tree_id)?
            .interface
            .item_mut(item_id)
            .ok_or(GraphError::TreeIdNotFound(tree_id))?;
        edit(item);
        self.refresh_interface_users(tree_id)
    }

    /// Refresh boundary nodes of a tree and group nodes using it anywhere
    fn refresh_interface_users(&mut self, tree_id: TreeId) -> Result<()> {
        let mut targets: Vec<(TreeId, NodeId)> = Vec::new();
        for (id, tree) in &self.trees {
            for node in tree.nodes() {
                let affected = match self.role(node) {
                    NodeRole::GroupInput | NodeRole::GroupOutput => *id == tree_id,
                    NodeRole::Group => node.node_tree == Some(tree_id),
                    _ => false,
                };
                if affected {
                    targets.push((*id, node.id));
                }
            }
        }
        for (tree, node) in targets {
            self.refresh_node(tree, node)?;
        }
        Ok(())
    }

    // ========================================================================
    // Socket derivation
    // ========================================================================

    fn interface_sockets(tree: &NodeTree, in_out: SocketDirection, direction: SocketDirection) -> Vec<Socket> {
        tree.interface
            .sockets(in_out)
            .map(|(identifier, name, ty)| Socket::new(identifier, name, ty, direction))
            .collect()
    }

    fn item_sockets(items: &[NodeItem], direction: SocketDirection) -> Vec<Socket> {
        items
            .iter()
            .map(|i| Socket::new(i.socket_identifier(), i.name.clone(), i.socket_type, direction))
            .collect()
    }

    /// Sockets a node should have right now
    fn desired_sockets(&self, tree: &NodeTree, node: &Node) -> (Vec<Socket>, Vec<Socket>) {
        let Some(kind) = self.kinds.get(&node.node_type) else {
            return (node.inputs.clone(), node.outputs.clone());
        };
        let mut inputs = kind.inputs.clone();
        let mut outputs = kind.outputs.clone();
        match kind.role {
            NodeRole::GroupInput => {
                outputs.extend(Self::interface_sockets(tree, SocketDirection::Input, SocketDirection::Output));
            }
            NodeRole::GroupOutput => {
                inputs.extend(Self::interface_sockets(tree, SocketDirection::Output, SocketDirection::Input));
            }
            NodeRole::Group => {
                if let Some(group) = node.node_tree.and_then(|id| self.trees.get(&id)) {
                    inputs.extend(Self::interface_sockets(group, SocketDirection::Input, SocketDirection::Input));
                    outputs.extend(Self::interface_sockets(group, SocketDirection::Output, SocketDirection::Output));
                }
            }
            NodeRole::RepeatInput => {
                if let Some(paired) = node.paired_output.and_then(|id| tree.node(id)) {
                    inputs.extend(Self::item_sockets(&paired.items, SocketDirection::Input));
                    outputs.extend(Self::item_sockets(&paired.items, SocketDirection::Output));
                }
            }
            NodeRole::RepeatOutput => {
                inputs.extend(Self::item_sockets(&node.items, SocketDirection::Input));
                outputs.extend(Self::item_sockets(&node.items, SocketDirection::Output));
            }
            NodeRole::MenuSwitch | NodeRole::Viewer => {
                inputs.extend(Self::item_sockets(&node.items, SocketDirection::Input));
            }
            NodeRole::Plain | NodeRole::Frame => {}
        }
        (inputs, outputs)
    }

    /// Bring a node's sockets in line with what it should have.
    ///
    /// Sockets are kept, with their ID and value, when a socket with the same
    /// identifier and type is still wanted; links of dropped sockets go away.
    fn refresh_node(&mut self, tree_id: TreeId, node_id: NodeId) -> Result<()> {
        let tree = self.tree(tree_id)?;
        let node = tree.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let (inputs, outputs) = self.desired_sockets(tree, node);

        let tree = self.tree_mut(tree_id)?;
        let node = tree.node_mut(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        merge_sockets(&mut node.inputs, inputs);
        merge_sockets(&mut node.outputs, outputs);
        tree.prune_links();
        Ok(())
    }
}

fn merge_sockets(existing: &mut Vec<Socket>, desired: Vec<Socket>) {
    let mut merged = Vec::with_capacity(desired.len());
    for wanted in desired {
        let kept = existing
            .iter()
            .find(|s| s.identifier == wanted.identifier && s.socket_type == wanted.socket_type);
        merged.push(match kept {
            Some(old) => Socket {
                name: wanted.name,
                multi_input: wanted.multi_input,
                ..old.clone()
            },
            None => Socket::fresh(&wanted),
        });
    }
    *existing = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry_library() -> (Library, TreeId) {
        let mut library = Library::new();
        let tree = library.new_tree("Geometry Nodes", TreeKind::Geometry);
        (library, tree)
    }

    #[test]
    fn test_tree_names_are_unique() {
        let mut library = Library::new();
        let first = library.new_tree("Tree", TreeKind::Geometry);
        let second = library.new_tree("Tree", TreeKind::Geometry);
        assert_eq!(library.tree(first).unwrap().name, "Tree");
        assert_eq!(library.tree(second).unwrap().name, "Tree.001");
        // Embedded trees do not take names
        library.new_material("Material");
        library.new_material("Material");
        assert_eq!(library.trees().count(), 2);
        assert!(library.material_by_name("Material.001").is_some());
    }

    #[test]
    fn test_node_kind_must_fit_tree() {
        let mut library = Library::new();
        let material = library.new_material("Material");
        let tree = library.material(material).unwrap().node_tree;
        assert_eq!(library.tree(tree).unwrap().node_count(), 1);
        assert!(matches!(
            library.add_node(tree, "Join"),
            Err(GraphError::NodeNotAllowed { .. })
        ));
        assert!(matches!(
            library.add_node(tree, "Nope"),
            Err(GraphError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn test_interface_drives_boundary_and_group_sockets() {
        let (mut library, outer) = geometry_library();
        let inner = library.new_tree("Inner", TreeKind::Geometry);
        let group_input = library.add_node(inner, "GroupInput").unwrap();
        let group = library.add_node(outer, "Group").unwrap();
        library.set_group_tree(outer, group, Some(inner)).unwrap();
        assert!(library.node(outer, group).unwrap().inputs.is_empty());

        library
            .interface_new_socket(inner, "Size", SocketDirection::Input, SocketType::Float, None)
            .unwrap();
        let boundary = library.node(inner, group_input).unwrap();
        assert_eq!(boundary.outputs[0].identifier, "Socket_0");
        let group_node = library.node(outer, group).unwrap();
        assert_eq!(group_node.inputs[0].name, "Size");
        assert_eq!(group_node.inputs[0].identifier, "Socket_0");

        let nested = library.add_node(inner, "Group").unwrap();
        assert_eq!(
            library.set_group_tree(inner, nested, Some(outer)),
            Err(GraphError::RecursiveGroup("Inner".into()))
        );
    }

    #[test]
    fn test_zone_pairing_creates_sockets() {
        let (mut library, tree) = geometry_library();
        let input = library.add_node(tree, "RepeatInput").unwrap();
        let output = library.add_node(tree, "RepeatOutput").unwrap();
        assert_eq!(library.node(tree, input).unwrap().inputs.len(), 1);
        assert!(library.node(tree, input).unwrap().outputs.is_empty());

        library.pair_zone(tree, input, output).unwrap();
        let node = library.node(tree, input).unwrap();
        assert_eq!(node.inputs.len(), 2);
        assert_eq!(node.outputs[0].identifier, "Item_0");

        library.new_node_item(tree, output, "Count", SocketType::Int).unwrap();
        assert_eq!(library.node(tree, input).unwrap().outputs.len(), 2);
        assert!(library.pair_zone(tree, output, input).is_err());
    }

    #[test]
    fn test_menu_domain() {
        let (mut library, tree) = geometry_library();
        let switch = library.add_node(tree, "MenuSwitch").unwrap();
        let menu = library.node(tree, switch).unwrap().input("Menu").unwrap().id;
        assert_eq!(library.menu_domain(tree, switch, menu).unwrap(), ["A", "B"]);
        assert_eq!(
            library.node(tree, switch).unwrap().input("Menu").unwrap().value,
            SocketValue::Menu("A".into())
        );

        library.new_node_item(tree, switch, "C", SocketType::Geometry).unwrap();
        library
            .set_socket_value(tree, switch, menu, SocketValue::Menu("C".into()))
            .unwrap();
        let err = library
            .set_socket_value(tree, switch, menu, SocketValue::Menu("D".into()))
            .unwrap_err();
        assert!(matches!(err, GraphError::NotInMenuDomain { ref choices, .. } if choices.len() == 3));
        // Menu entries always drive float inputs
        assert_eq!(library.node(tree, switch).unwrap().inputs[3].socket_type, SocketType::Float);
    }

    #[test]
    fn test_menu_domain_through_group() {
        let mut library = Library::new();
        let inner = library.new_tree("Inner", TreeKind::Geometry);
        library
            .interface_new_socket(inner, "Mode", SocketDirection::Input, SocketType::Menu, None)
            .unwrap();
        let group_input = library.add_node(inner, "GroupInput").unwrap();
        let switch = library.add_node(inner, "MenuSwitch").unwrap();
        library.connect(inner, group_input, "Socket_0", switch, "Menu").unwrap();

        let outer = library.new_tree("Outer", TreeKind::Geometry);
        let group = library.add_node(outer, "Group").unwrap();
        library.set_group_tree(outer, group, Some(inner)).unwrap();
        let mode = library.node(outer, group).unwrap().input("Socket_0").unwrap().id;
        assert_eq!(library.menu_domain(outer, group, mode).unwrap(), ["A", "B"]);
        library
            .set_socket_value(outer, group, mode, SocketValue::Menu("B".into()))
            .unwrap();
    }

    #[test]
    fn test_viewer_auto_remove() {
        let (mut library, tree) = geometry_library();
        let viewer = library.add_node(tree, "Viewer").unwrap();
        let math = library.add_node(tree, "Math").unwrap();
        let kept = library.new_node_item(tree, viewer, "Value", SocketType::Float).unwrap();
        let dropped = library.new_node_item(tree, viewer, "Other", SocketType::Float).unwrap();
        let link = library.connect(tree, math, "Value", viewer, "Item_0").unwrap();

        library.update_node_item(tree, viewer, kept, |i| i.auto_remove = true).unwrap();
        library.update_node_item(tree, viewer, dropped, |i| i.auto_remove = true).unwrap();
        let items: Vec<_> = library.node(tree, viewer).unwrap().items.iter().map(|i| i.id).collect();
        assert_eq!(items, vec![kept]);

        library.disconnect(tree, link).unwrap();
        assert!(library.node(tree, viewer).unwrap().items.is_empty());
    }

    #[test]
    fn test_linked_trees_are_read_only() {
        let mut library = Library::new();
        let linked = library.link_tree("Shared", TreeKind::Geometry, "assets.lib");
        assert_eq!(
            library.add_node(linked, "Cube"),
            Err(GraphError::LinkedData("Shared".into()))
        );
    }
}
