// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reflective access to a [`Library`].
//!
//! Handles are plain ID paths, so they stay cheap to clone and compare and a
//! handle to a removed object reports itself as stale instead of dangling.

use crate::datablock::DatablockKind;
use crate::error::GraphError;
use crate::ids::{DatablockId, ItemId, LinkId, MaterialId, NodeId, SocketId, TreeId};
use crate::interface::{InterfaceItem, InterfaceItemKind};
use crate::kinds::{NodeRole, PointerTarget};
use crate::library::Library;
use crate::node::{ItemsKind, Node, NodeItem};
use crate::schema::{self, TYPE_TAG};
use crate::socket::{SocketType, SocketValue};
use crate::tree::{NodeTree, TreeKind};
use nodeclip_engine::{ModelError, ObjectModel, Property, RuntimeType, Scalar, Schema, TreeLibrary};

/// Collection owned by a tree or node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionRef {
    /// Nodes of the tree
    Nodes,
    /// Links of the tree
    Links,
    /// Interface items of the tree
    InterfaceItems,
    /// Input sockets of a node
    Inputs(NodeId),
    /// Output sockets of a node
    Outputs(NodeId),
    /// Item list of a node
    NodeItems(NodeId),
}

/// Handle to a reflected object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    /// A tree, embedded ones included
    Tree(TreeId),
    /// A material
    Material(MaterialId),
    /// An image, object or text
    Datablock(DatablockId),
    /// The interface of a tree
    Interface(TreeId),
    /// An interface socket or panel
    InterfaceItem(TreeId, ItemId),
    /// A node
    Node(TreeId, NodeId),
    /// A node socket
    Socket(TreeId, NodeId, SocketId),
    /// A link
    Link(TreeId, LinkId),
    /// An entry of a node's item list
    NodeItem(TreeId, NodeId, ItemId),
    /// A collection wrapper
    Collection(TreeId, CollectionRef),
}

impl Handle {
    /// Tree containing the object, if it lives inside one
    pub fn tree_id(&self) -> Option<TreeId> {
        match *self {
            Self::Tree(t)
            | Self::Interface(t)
            | Self::InterfaceItem(t, _)
            | Self::Node(t, _)
            | Self::Socket(t, _, _)
            | Self::Link(t, _)
            | Self::NodeItem(t, _, _)
            | Self::Collection(t, _) => Some(t),
            Self::Material(_) | Self::Datablock(_) => None,
        }
    }
}

fn stale(handle: &Handle) -> ModelError {
    ModelError::Stale(format!("{handle:?}"))
}

fn wrong(identifier: &str, expected: &str) -> ModelError {
    ModelError::WrongValue {
        identifier: identifier.to_owned(),
        expected: expected.to_owned(),
    }
}

fn string(value: impl Into<String>) -> Property<Handle> {
    Property::Scalar(Scalar::String(value.into()))
}

fn enumeration(value: impl Into<String>) -> Property<Handle> {
    Property::Scalar(Scalar::Enum(value.into()))
}

fn boolean(value: bool) -> Property<Handle> {
    Property::Scalar(Scalar::Bool(value))
}

fn as_string(identifier: &str, value: Property<Handle>) -> Result<String, ModelError> {
    match value {
        Property::Scalar(Scalar::String(s) | Scalar::Enum(s)) => Ok(s),
        _ => Err(wrong(identifier, "string")),
    }
}

fn as_bool(identifier: &str, value: Property<Handle>) -> Result<bool, ModelError> {
    match value {
        Property::Scalar(Scalar::Bool(v)) => Ok(v),
        _ => Err(wrong(identifier, "boolean")),
    }
}

fn as_int(identifier: &str, value: Property<Handle>) -> Result<i64, ModelError> {
    match value {
        Property::Scalar(Scalar::Int(v)) => Ok(v),
        _ => Err(wrong(identifier, "integer")),
    }
}

fn as_float(identifier: &str, value: Property<Handle>) -> Result<f64, ModelError> {
    match value {
        Property::Scalar(Scalar::Float(v)) => Ok(v),
        Property::Scalar(Scalar::Int(v)) => Ok(v as f64),
        _ => Err(wrong(identifier, "float")),
    }
}

fn as_pointer(identifier: &str, value: Property<Handle>) -> Result<Option<Handle>, ModelError> {
    match value {
        Property::Pointer(target) => Ok(target),
        _ => Err(wrong(identifier, "pointer")),
    }
}

impl Library {
    fn tree_of(&self, handle: &Handle, tree_id: TreeId) -> Result<&NodeTree, ModelError> {
        self.tree(tree_id).map_err(|_| stale(handle))
    }

    fn node_of(&self, handle: &Handle, tree_id: TreeId, node_id: NodeId) -> Result<&Node, ModelError> {
        self.node(tree_id, node_id).map_err(|_| stale(handle))
    }

    fn interface_item_of(&self, handle: &Handle, tree_id: TreeId, item_id: ItemId) -> Result<&InterfaceItem, ModelError> {
        self.tree_of(handle, tree_id)?
            .interface
            .item(item_id)
            .ok_or_else(|| stale(handle))
    }

    fn node_item_of(&self, handle: &Handle, tree_id: TreeId, node_id: NodeId, item_id: ItemId) -> Result<&NodeItem, ModelError> {
        self.node_of(handle, tree_id, node_id)?
            .item(item_id)
            .ok_or_else(|| stale(handle))
    }

    fn items_kind(&self, handle: &Handle, tree_id: TreeId, node_id: NodeId) -> Result<ItemsKind, ModelError> {
        let node = self.node_of(handle, tree_id, node_id)?;
        self.kinds()
            .get(&node.node_type)
            .and_then(|k| k.items)
            .ok_or_else(|| stale(handle))
    }

    fn datablock_target(&self, identifier: &str, target: Option<Handle>, kind: DatablockKind) -> Result<Option<DatablockId>, ModelError> {
        match target {
            None => Ok(None),
            Some(Handle::Datablock(id)) if self.datablock(id).is_some_and(|d| d.kind == kind) => Ok(Some(id)),
            Some(_) => Err(wrong(identifier, kind.type_name())),
        }
    }

    fn no_such_property(&self, handle: &Handle, identifier: &str) -> ModelError {
        let type_name = self
            .runtime_type(handle)
            .map(|ty| ty.to_string())
            .unwrap_or_else(|_| format!("{handle:?}"));
        ModelError::NoSuchProperty {
            type_name,
            identifier: identifier.to_owned(),
        }
    }

    fn get_node(&self, handle: &Handle, tree_id: TreeId, node_id: NodeId, identifier: &str) -> Result<Property<Handle>, ModelError> {
        let node = self.node_of(handle, tree_id, node_id)?;
        let kind = self.kinds().get(&node.node_type);
        Ok(match identifier {
            "name" => string(node.name.clone()),
            "label" => string(node.label.clone()),
            TYPE_TAG => string(node.node_type.clone()),
            "location" => Property::Scalar(Scalar::FloatArray(node.location.to_vec())),
            "width" => Property::Scalar(Scalar::Float(node.width)),
            "hide" => boolean(node.hide),
            "mute" => boolean(node.mute),
            "select" => boolean(node.select),
            "parent" => Property::Pointer(node.parent.map(|p| Handle::Node(tree_id, p))),
            "inputs" => Property::Collection(Handle::Collection(tree_id, CollectionRef::Inputs(node_id))),
            "outputs" => Property::Collection(Handle::Collection(tree_id, CollectionRef::Outputs(node_id))),
            "paired_output" if kind.is_some_and(|k| k.role == NodeRole::RepeatInput) => {
                Property::Pointer(node.paired_output.map(|p| Handle::Node(tree_id, p)))
            }
            other => {
                if let Some(value) = node.properties.get(other) {
                    return Ok(Property::Scalar(value.to_scalar()));
                }
                if let Some(pointer) = kind.and_then(|k| k.pointer.as_ref()).filter(|p| p.identifier == other) {
                    return Ok(Property::Pointer(match pointer.target {
                        PointerTarget::Tree => node.node_tree.map(Handle::Tree),
                        PointerTarget::Datablock(_) => node.datablock.map(Handle::Datablock),
                    }));
                }
                if kind.and_then(|k| k.items).is_some_and(|items| items.identifier() == other) {
                    return Ok(Property::Collection(Handle::Collection(
                        tree_id,
                        CollectionRef::NodeItems(node_id),
                    )));
                }
                return Err(self.no_such_property(handle, identifier));
            }
        })
    }

    fn set_node(
        &mut self,
        handle: &Handle,
        tree_id: TreeId,
        node_id: NodeId,
        identifier: &str,
        value: Property<Handle>,
    ) -> Result<(), ModelError> {
        match identifier {
            "name" => {
                self.set_node_name(tree_id, node_id, &as_string(identifier, value)?)?;
            }
            TYPE_TAG | "inputs" | "outputs" | "paired_output" => {
                return Err(ModelError::ReadOnly(identifier.to_owned()));
            }
            "parent" => {
                let parent = match as_pointer(identifier, value)? {
                    None => None,
                    Some(Handle::Node(t, p)) if t == tree_id => Some(p),
                    Some(_) => return Err(wrong(identifier, "node in the same tree")),
                };
                self.set_node_parent(tree_id, node_id, parent)?;
            }
            other => {
                let node = self.node_of(handle, tree_id, node_id)?;
                let kind = self.kinds().get(&node.node_type);
                if let Some(current) = node.properties.get(other) {
                    let Property::Scalar(scalar) = value else {
                        return Err(wrong(identifier, "simple value"));
                    };
                    let new = current
                        .with_scalar(&scalar)
                        .ok_or_else(|| wrong(identifier, "value of the property's type"))?;
                    self.set_node_property(tree_id, node_id, other, new)?;
                    return Ok(());
                }
                if let Some(pointer) = kind.and_then(|k| k.pointer.as_ref()).filter(|p| p.identifier == other) {
                    let target = pointer.target;
                    let target_handle = as_pointer(identifier, value)?;
                    match target {
                        PointerTarget::Tree => {
                            let group = match target_handle {
                                None => None,
                                Some(Handle::Tree(t)) => Some(t),
                                Some(_) => return Err(wrong(identifier, "NodeTree")),
                            };
                            self.set_group_tree(tree_id, node_id, group)?;
                        }
                        PointerTarget::Datablock(kind) => {
                            let datablock = self.datablock_target(identifier, target_handle, kind)?;
                            self.set_datablock(tree_id, node_id, datablock)?;
                        }
                    }
                    return Ok(());
                }

                let node = self.tree_mut(tree_id)?
                    .node_mut(node_id)
                    .ok_or_else(|| stale(handle))?;
                match other {
                    "label" => node.label = as_string(identifier, value)?,
                    "location" => {
                        let Property::Scalar(Scalar::FloatArray(v)) = value else {
                            return Err(wrong(identifier, "float array"));
                        };
                        node.location = <[f64; 2]>::try_from(v.as_slice())
                            .map_err(|_| wrong(identifier, "two floats"))?;
                    }
                    "width" => node.width = as_float(identifier, value)?,
                    "hide" => node.hide = as_bool(identifier, value)?,
                    "mute" => node.mute = as_bool(identifier, value)?,
                    "select" => node.select = as_bool(identifier, value)?,
                    _ => return Err(self.no_such_property(handle, identifier)),
                }
            }
        }
        Ok(())
    }

    fn get_socket(&self, handle: &Handle, identifier: &str) -> Result<Property<Handle>, ModelError> {
        let Handle::Socket(tree_id, node_id, socket_id) = *handle else {
            return Err(stale(handle));
        };
        let (_, socket) = self
            .tree_of(handle, tree_id)?
            .socket(node_id, socket_id)
            .map_err(|_| stale(handle))?;
        Ok(match identifier {
            "name" => string(socket.name.clone()),
            "identifier" => string(socket.identifier.clone()),
            "hide" => boolean(socket.hide),
            "is_multi_input" => boolean(socket.multi_input),
            "is_output" => boolean(socket.is_output()),
            "default_value" => match socket.value.to_scalar() {
                Some(scalar) => Property::Scalar(scalar),
                None => return Err(self.no_such_property(handle, identifier)),
            },
            _ => return Err(self.no_such_property(handle, identifier)),
        })
    }

    fn set_socket(&mut self, handle: &Handle, identifier: &str, value: Property<Handle>) -> Result<(), ModelError> {
        let Handle::Socket(tree_id, node_id, socket_id) = *handle else {
            return Err(stale(handle));
        };
        match identifier {
            "hide" => self.set_socket_hide(tree_id, node_id, socket_id, as_bool(identifier, value)?)?,
            "default_value" => {
                let (_, socket) = self
                    .tree_of(handle, tree_id)?
                    .socket(node_id, socket_id)
                    .map_err(|_| stale(handle))?;
                let Property::Scalar(scalar) = value else {
                    return Err(wrong(identifier, "simple value"));
                };
                let socket_type = socket.socket_type;
                let new = SocketValue::from_scalar(socket_type, &scalar)
                    .ok_or_else(|| wrong(identifier, socket_type.tag()))?;
                self.set_socket_value(tree_id, node_id, socket_id, new)?;
            }
            "name" | "identifier" | "is_multi_input" | "is_output" => {
                return Err(ModelError::ReadOnly(identifier.to_owned()));
            }
            _ => return Err(self.no_such_property(handle, identifier)),
        }
        Ok(())
    }

    fn get_interface_item(&self, handle: &Handle, identifier: &str) -> Result<Property<Handle>, ModelError> {
        let Handle::InterfaceItem(tree_id, item_id) = *handle else {
            return Err(stale(handle));
        };
        let item = self.interface_item_of(handle, tree_id, item_id)?;
        Ok(match (identifier, &item.kind) {
            ("item_type", _) => enumeration(item.item_type()),
            ("parent", _) => Property::Pointer(item.parent.map(|p| Handle::InterfaceItem(tree_id, p))),
            ("name", _) => string(item.name.clone()),
            ("description", _) => string(item.description.clone()),
            ("in_out", InterfaceItemKind::Socket { in_out, .. }) => enumeration(in_out.tag()),
            ("socket_type", InterfaceItemKind::Socket { socket_type, .. }) => enumeration(socket_type.tag()),
            ("identifier", InterfaceItemKind::Socket { identifier, .. }) => string(identifier.clone()),
            ("hide_value", InterfaceItemKind::Socket { hide_value, .. }) => boolean(*hide_value),
            ("default_closed", InterfaceItemKind::Panel { default_closed }) => boolean(*default_closed),
            _ => return Err(self.no_such_property(handle, identifier)),
        })
    }

    fn set_interface_item(&mut self, handle: &Handle, identifier: &str, value: Property<Handle>) -> Result<(), ModelError> {
        let Handle::InterfaceItem(tree_id, item_id) = *handle else {
            return Err(stale(handle));
        };
        let is_socket = !self.interface_item_of(handle, tree_id, item_id)?.is_panel();
        match (identifier, is_socket) {
            ("name", _) => {
                let name = as_string(identifier, value)?;
                self.update_interface_item(tree_id, item_id, |item| item.name = name)?;
            }
            ("description", _) => {
                let description = as_string(identifier, value)?;
                self.update_interface_item(tree_id, item_id, |item| item.description = description)?;
            }
            ("hide_value", true) => {
                let hide = as_bool(identifier, value)?;
                self.update_interface_item(tree_id, item_id, |item| {
                    if let InterfaceItemKind::Socket { hide_value, .. } = &mut item.kind {
                        *hide_value = hide;
                    }
                })?;
            }
            ("default_closed", false) => {
                let closed = as_bool(identifier, value)?;
                self.update_interface_item(tree_id, item_id, |item| {
                    if let InterfaceItemKind::Panel { default_closed } = &mut item.kind {
                        *default_closed = closed;
                    }
                })?;
            }
            ("item_type" | "parent", _) | ("in_out" | "socket_type" | "identifier", true) => {
                return Err(ModelError::ReadOnly(identifier.to_owned()));
            }
            _ => return Err(self.no_such_property(handle, identifier)),
        }
        Ok(())
    }

    fn get_node_item(&self, handle: &Handle, identifier: &str) -> Result<Property<Handle>, ModelError> {
        let Handle::NodeItem(tree_id, node_id, item_id) = *handle else {
            return Err(stale(handle));
        };
        let kind = self.items_kind(handle, tree_id, node_id)?;
        let item = self.node_item_of(handle, tree_id, node_id, item_id)?;
        Ok(match (identifier, kind) {
            ("name", _) => string(item.name.clone()),
            ("socket_type", ItemsKind::Repeat | ItemsKind::Viewer) => enumeration(item.socket_type.tag()),
            ("description", ItemsKind::Enum) => string(item.description.clone()),
            ("auto_remove", ItemsKind::Viewer) => boolean(item.auto_remove),
            _ => return Err(self.no_such_property(handle, identifier)),
        })
    }

    fn set_node_item(&mut self, handle: &Handle, identifier: &str, value: Property<Handle>) -> Result<(), ModelError> {
        let Handle::NodeItem(tree_id, node_id, item_id) = *handle else {
            return Err(stale(handle));
        };
        let kind = self.items_kind(handle, tree_id, node_id)?;
        self.node_item_of(handle, tree_id, node_id, item_id)?;
        match (identifier, kind) {
            ("name", _) => {
                let name = as_string(identifier, value)?;
                self.update_node_item(tree_id, node_id, item_id, |item| item.name = name)?;
            }
            ("socket_type", ItemsKind::Repeat | ItemsKind::Viewer) => {
                let tag = as_string(identifier, value)?;
                let socket_type = SocketType::from_tag(&tag).ok_or_else(|| wrong(identifier, "socket type tag"))?;
                self.update_node_item(tree_id, node_id, item_id, |item| item.socket_type = socket_type)?;
            }
            ("description", ItemsKind::Enum) => {
                let description = as_string(identifier, value)?;
                self.update_node_item(tree_id, node_id, item_id, |item| item.description = description)?;
            }
            ("auto_remove", ItemsKind::Viewer) => {
                let auto_remove = as_bool(identifier, value)?;
                self.update_node_item(tree_id, node_id, item_id, |item| item.auto_remove = auto_remove)?;
            }
            _ => return Err(self.no_such_property(handle, identifier)),
        }
        Ok(())
    }

    fn get_link(&self, handle: &Handle, identifier: &str) -> Result<Property<Handle>, ModelError> {
        let Handle::Link(tree_id, link_id) = *handle else {
            return Err(stale(handle));
        };
        let link = self
            .tree_of(handle, tree_id)?
            .link(link_id)
            .ok_or_else(|| stale(handle))?;
        Ok(match identifier {
            "from_node" => Property::Pointer(Some(Handle::Node(tree_id, link.from_node))),
            "to_node" => Property::Pointer(Some(Handle::Node(tree_id, link.to_node))),
            "from_socket" => Property::Pointer(Some(Handle::Socket(tree_id, link.from_node, link.from_socket))),
            "to_socket" => Property::Pointer(Some(Handle::Socket(tree_id, link.to_node, link.to_socket))),
            "is_muted" => boolean(link.is_muted),
            "multi_input_sort_id" => Property::Scalar(Scalar::Int(link.multi_input_sort_id)),
            _ => return Err(self.no_such_property(handle, identifier)),
        })
    }

    fn get_tree(&self, handle: &Handle, tree_id: TreeId, identifier: &str) -> Result<Property<Handle>, ModelError> {
        let tree = self.tree_of(handle, tree_id)?;
        Ok(match identifier {
            "name" => string(tree.name.clone()),
            TYPE_TAG => string(tree.kind.tag()),
            "description" => string(tree.description.clone()),
            "use_fake_user" => boolean(tree.use_fake_user),
            "color_tag" => enumeration(tree.color_tag.clone()),
            "annotation" => Property::Pointer(tree.annotation.map(Handle::Datablock)),
            "interface" => Property::Pointer(Some(Handle::Interface(tree_id))),
            "nodes" => Property::Collection(Handle::Collection(tree_id, CollectionRef::Nodes)),
            "links" => Property::Collection(Handle::Collection(tree_id, CollectionRef::Links)),
            _ => return Err(self.no_such_property(handle, identifier)),
        })
    }

    fn set_tree(&mut self, handle: &Handle, tree_id: TreeId, identifier: &str, value: Property<Handle>) -> Result<(), ModelError> {
        match identifier {
            "annotation" => {
                let text = self.datablock_target(identifier, as_pointer(identifier, value)?, DatablockKind::Text)?;
                self.set_annotation(tree_id, text)?;
                return Ok(());
            }
            "name" => {
                let name = as_string(identifier, value)?;
                let taken = self.trees().any(|t| t.name == name && t.id != tree_id);
                if taken {
                    return Err(ModelError::Rejected(format!("tree name '{name}' is taken")));
                }
                self.tree_mut(tree_id)?.name = name;
                return Ok(());
            }
            TYPE_TAG | "interface" | "nodes" | "links" => {
                return Err(ModelError::ReadOnly(identifier.to_owned()));
            }
            _ => {}
        }
        let tree = self.tree_mut(tree_id)?;
        match identifier {
            "description" => tree.description = as_string(identifier, value)?,
            "use_fake_user" => tree.use_fake_user = as_bool(identifier, value)?,
            "color_tag" => {
                let tag = as_string(identifier, value)?;
                if !schema::COLOR_TAGS.contains(&tag.as_str()) {
                    return Err(wrong(identifier, "color tag"));
                }
                tree.color_tag = tag;
            }
            _ => return Err(self.no_such_property(handle, identifier)),
        }
        Ok(())
    }

    fn collection_handles(&self, collection: &Handle) -> Result<Vec<Handle>, ModelError> {
        let Handle::Collection(tree_id, which) = *collection else {
            return Err(ModelError::Rejected(format!("{collection:?} is not a collection")));
        };
        let tree = self.tree_of(collection, tree_id)?;
        Ok(match which {
            CollectionRef::Nodes => tree.node_ids().map(|n| Handle::Node(tree_id, n)).collect(),
            CollectionRef::Links => tree.links().map(|l| Handle::Link(tree_id, l.id)).collect(),
            CollectionRef::InterfaceItems => tree
                .interface
                .items
                .iter()
                .map(|i| Handle::InterfaceItem(tree_id, i.id))
                .collect(),
            CollectionRef::Inputs(node_id) => self
                .node_of(collection, tree_id, node_id)?
                .inputs
                .iter()
                .map(|s| Handle::Socket(tree_id, node_id, s.id))
                .collect(),
            CollectionRef::Outputs(node_id) => self
                .node_of(collection, tree_id, node_id)?
                .outputs
                .iter()
                .map(|s| Handle::Socket(tree_id, node_id, s.id))
                .collect(),
            CollectionRef::NodeItems(node_id) => self
                .node_of(collection, tree_id, node_id)?
                .items
                .iter()
                .map(|i| Handle::NodeItem(tree_id, node_id, i.id))
                .collect(),
        })
    }
}

impl ObjectModel for Library {
    type Handle = Handle;
    type Key = Handle;

    const SELF_DESCRIPTOR: Option<&'static str> = Some("rna_type");

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn runtime_type(&self, obj: &Handle) -> Result<RuntimeType, ModelError> {
        let name = match *obj {
            Handle::Tree(t) => self.tree_of(obj, t)?.kind.tag().to_owned(),
            Handle::Material(m) => {
                self.material(m).ok_or_else(|| stale(obj))?;
                schema::MATERIAL.to_owned()
            }
            Handle::Datablock(d) => self
                .datablock(d)
                .ok_or_else(|| stale(obj))?
                .kind
                .type_name()
                .to_owned(),
            Handle::Interface(t) => {
                self.tree_of(obj, t)?;
                schema::INTERFACE.to_owned()
            }
            Handle::InterfaceItem(t, i) => match self.interface_item_of(obj, t, i)?.kind {
                InterfaceItemKind::Socket { .. } => schema::INTERFACE_SOCKET.to_owned(),
                InterfaceItemKind::Panel { .. } => schema::INTERFACE_PANEL.to_owned(),
            },
            Handle::Node(t, n) => self.node_of(obj, t, n)?.node_type.clone(),
            Handle::Socket(t, n, s) => self
                .tree_of(obj, t)?
                .socket(n, s)
                .map_err(|_| stale(obj))?
                .1
                .socket_type
                .type_name()
                .to_owned(),
            Handle::Link(t, l) => {
                self.tree_of(obj, t)?.link(l).ok_or_else(|| stale(obj))?;
                schema::LINK.to_owned()
            }
            Handle::NodeItem(t, n, _) => self.items_kind(obj, t, n)?.element_type().to_owned(),
            Handle::Collection(t, which) => {
                self.tree_of(obj, t)?;
                match which {
                    CollectionRef::Nodes => schema::NODES,
                    CollectionRef::Links => schema::LINKS,
                    CollectionRef::InterfaceItems => schema::INTERFACE_ITEMS,
                    CollectionRef::Inputs(_) => schema::NODE_INPUTS,
                    CollectionRef::Outputs(_) => schema::NODE_OUTPUTS,
                    CollectionRef::NodeItems(n) => self.items_kind(obj, t, n)?.wrapper_type(),
                }
                .to_owned()
            }
        };
        Ok(RuntimeType::Typed(name))
    }

    fn canonical_key(&self, obj: &Handle) -> Handle {
        *obj
    }

    fn owner_key(&self, obj: &Handle) -> Option<Handle> {
        Some(match obj.tree_id() {
            Some(t) => Handle::Tree(t),
            None => *obj,
        })
    }

    fn get(&self, obj: &Handle, identifier: &str) -> Result<Property<Handle>, ModelError> {
        if identifier == "rna_type" {
            return Ok(Property::Pointer(None));
        }
        match *obj {
            Handle::Tree(t) => self.get_tree(obj, t, identifier),
            Handle::Material(m) => {
                let material = self.material(m).ok_or_else(|| stale(obj))?;
                Ok(match identifier {
                    "name" => string(material.name.clone()),
                    "pass_index" => Property::Scalar(Scalar::Int(material.pass_index)),
                    "node_tree" => Property::Pointer(Some(Handle::Tree(material.node_tree))),
                    _ => return Err(self.no_such_property(obj, identifier)),
                })
            }
            Handle::Datablock(d) => {
                let datablock = self.datablock(d).ok_or_else(|| stale(obj))?;
                match identifier {
                    "name" => Ok(string(datablock.name.clone())),
                    "body" if datablock.kind == DatablockKind::Text => Ok(string(datablock.body.clone())),
                    _ => Err(self.no_such_property(obj, identifier)),
                }
            }
            Handle::Interface(t) => {
                let tree = self.tree_of(obj, t)?;
                match identifier {
                    "active_index" => Ok(Property::Scalar(Scalar::Int(tree.interface.active_index))),
                    "items_tree" => Ok(Property::Collection(Handle::Collection(t, CollectionRef::InterfaceItems))),
                    _ => Err(self.no_such_property(obj, identifier)),
                }
            }
            Handle::InterfaceItem(..) => self.get_interface_item(obj, identifier),
            Handle::Node(t, n) => self.get_node(obj, t, n, identifier),
            Handle::Socket(..) => self.get_socket(obj, identifier),
            Handle::Link(..) => self.get_link(obj, identifier),
            Handle::NodeItem(..) => self.get_node_item(obj, identifier),
            Handle::Collection(t, CollectionRef::Nodes) if identifier == "active" => {
                let tree = self.tree_of(obj, t)?;
                Ok(Property::Pointer(tree.active_node.map(|n| Handle::Node(t, n))))
            }
            Handle::Collection(..) => Err(self.no_such_property(obj, identifier)),
        }
    }

    fn set(&mut self, obj: &Handle, identifier: &str, value: Property<Handle>) -> Result<(), ModelError> {
        if identifier == "rna_type" {
            return Err(ModelError::ReadOnly(identifier.to_owned()));
        }
        match *obj {
            Handle::Tree(t) => self.set_tree(obj, t, identifier, value),
            Handle::Material(m) => {
                let material = self.material_mut(m).ok_or_else(|| stale(obj))?;
                match identifier {
                    "pass_index" => material.pass_index = as_int(identifier, value)?,
                    "node_tree" => return Err(ModelError::ReadOnly(identifier.to_owned())),
                    _ => return Err(self.no_such_property(obj, identifier)),
                }
                Ok(())
            }
            Handle::Datablock(_) => Err(ModelError::Rejected(
                "datablocks are edited outside node trees".to_owned(),
            )),
            Handle::Interface(t) => match identifier {
                "active_index" => {
                    self.tree_mut(t)?.interface.active_index = as_int(identifier, value)?;
                    Ok(())
                }
                "items_tree" => Err(ModelError::ReadOnly(identifier.to_owned())),
                _ => Err(self.no_such_property(obj, identifier)),
            },
            Handle::InterfaceItem(..) => self.set_interface_item(obj, identifier, value),
            Handle::Node(t, n) => self.set_node(obj, t, n, identifier, value),
            Handle::Socket(..) => self.set_socket(obj, identifier, value),
            Handle::Link(t, l) => match identifier {
                "is_muted" => {
                    self.set_link_muted(t, l, as_bool(identifier, value)?)?;
                    Ok(())
                }
                "from_socket" | "to_socket" => Err(ModelError::Rejected(
                    "links are re-created through the links collection".to_owned(),
                )),
                "from_node" | "to_node" | "multi_input_sort_id" => {
                    Err(ModelError::ReadOnly(identifier.to_owned()))
                }
                _ => Err(self.no_such_property(obj, identifier)),
            },
            Handle::NodeItem(..) => self.set_node_item(obj, identifier, value),
            Handle::Collection(t, CollectionRef::Nodes) if identifier == "active" => {
                let node = match as_pointer(identifier, value)? {
                    None => None,
                    Some(Handle::Node(tree, n)) if tree == t => Some(n),
                    Some(_) => return Err(wrong(identifier, "node in the same tree")),
                };
                self.set_active_node(t, node)?;
                Ok(())
            }
            Handle::Collection(..) => Err(self.no_such_property(obj, identifier)),
        }
    }

    fn collection_len(&self, collection: &Handle) -> Result<usize, ModelError> {
        self.collection_handles(collection).map(|items| items.len())
    }

    fn collection_item(&self, collection: &Handle, index: usize) -> Result<Handle, ModelError> {
        let items = self.collection_handles(collection)?;
        let len = items.len();
        items
            .into_iter()
            .nth(index)
            .ok_or(ModelError::OutOfRange { index, len })
    }

    fn host_version(&self) -> String {
        self.version.clone()
    }
}

impl TreeLibrary for Library {
    const TYPE_TAG_PROPERTY: &'static str = TYPE_TAG;

    fn find_tree(&self, name: &str) -> Option<Handle> {
        self.tree_by_name(name).map(|t| Handle::Tree(t.id))
    }

    fn find_container(&self, name: &str) -> Option<Handle> {
        self.material_by_name(name).map(|m| Handle::Material(m.id))
    }

    fn container_tree(&self, container: &Handle) -> Option<Handle> {
        match *container {
            Handle::Material(m) => self.material(m).map(|m| Handle::Tree(m.node_tree)),
            _ => None,
        }
    }

    fn referenced_trees(&self, tree: &Handle) -> Result<Vec<Handle>, ModelError> {
        let Handle::Tree(tree_id) = *tree else {
            return Err(ModelError::Rejected(format!("{tree:?} is not a tree")));
        };
        Ok(self.group_trees(tree_id)?.into_iter().map(Handle::Tree).collect())
    }

    fn is_local(&self, obj: &Handle) -> bool {
        match *obj {
            Handle::Tree(t) => self.tree(t).is_ok_and(NodeTree::is_local),
            Handle::Material(m) => self.material(m).is_some_and(|m| m.library.is_none()),
            Handle::Datablock(d) => self.datablock(d).is_some_and(|d| d.library.is_none()),
            _ => true,
        }
    }

    fn create_tree(&mut self, name: &str, type_tag: &str) -> Result<String, ModelError> {
        let kind = TreeKind::from_tag(type_tag)
            .ok_or_else(|| ModelError::Rejected(format!("unknown tree type '{type_tag}'")))?;
        let id = self.new_tree(name, kind);
        Ok(self.tree(id)?.name.clone())
    }

    fn create_container(&mut self, name: &str) -> Result<String, ModelError> {
        let id = self.new_material(name);
        self.material(id)
            .map(|m| m.name.clone())
            .ok_or_else(|| GraphError::MaterialNotFound(name.to_owned()).into())
    }
}
