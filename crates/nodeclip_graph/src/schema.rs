// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reflected type schema of the node library.
//!
//! Every reflected object derives from `Struct`, whose `rna_type` pointer is the
//! self-descriptor. Node kinds and socket types become subtypes of `Node` and
//! `NodeSocket`, so handlers registered on the base types cover them and their
//! own properties fall to the generic fallback.

use crate::kinds::{KindRegistry, NodeRole};
use crate::node::{ItemsKind, PropValue};
use crate::socket::SocketType;
use crate::tree::TreeKind;
use nodeclip_engine::{PropertyDescriptor, Scalar, ScalarKind, Schema, TypeInfo};

/// Root of every reflected type
pub const STRUCT: &str = "Struct";
/// Named top-level data
pub const ID: &str = "ID";
/// Base of all tree types
pub const NODE_TREE: &str = "NodeTree";
/// Material container
pub const MATERIAL: &str = "Material";
/// Tree interface
pub const INTERFACE: &str = "Interface";
/// Interface item wrapper
pub const INTERFACE_ITEMS: &str = "InterfaceItems";
/// Base of interface sockets and panels
pub const INTERFACE_ITEM: &str = "InterfaceItem";
/// Interface socket
pub const INTERFACE_SOCKET: &str = "InterfaceSocket";
/// Interface panel
pub const INTERFACE_PANEL: &str = "InterfacePanel";
/// Base of all node kinds
pub const NODE: &str = "Node";
/// Node collection wrapper
pub const NODES: &str = "Nodes";
/// Input socket wrapper
pub const NODE_INPUTS: &str = "NodeInputs";
/// Output socket wrapper
pub const NODE_OUTPUTS: &str = "NodeOutputs";
/// Base of all socket types
pub const NODE_SOCKET: &str = "NodeSocket";
/// Link
pub const LINK: &str = "Link";
/// Link collection wrapper
pub const LINKS: &str = "Links";

/// Tree color tags
pub const COLOR_TAGS: [&str; 5] = ["NONE", "COLOR_01", "COLOR_02", "COLOR_03", "COLOR_04"];

/// Property holding the node kind or tree kind tag
pub const TYPE_TAG: &str = "type_tag";

fn name() -> PropertyDescriptor {
    PropertyDescriptor::simple("name", ScalarKind::String)
}

fn flag(identifier: &str) -> PropertyDescriptor {
    PropertyDescriptor::simple(identifier, ScalarKind::Bool).with_default(Scalar::Bool(false))
}

fn text(identifier: &str) -> PropertyDescriptor {
    PropertyDescriptor::simple(identifier, ScalarKind::String).with_default(Scalar::String(String::new()))
}

fn prop_descriptor(identifier: &str, default: &PropValue) -> PropertyDescriptor {
    let kind = match default {
        PropValue::Bool(_) => ScalarKind::Bool,
        PropValue::Int(_) => ScalarKind::Int,
        PropValue::Float(_) => ScalarKind::Float,
        PropValue::Enum(_) => ScalarKind::Enum,
    };
    PropertyDescriptor::simple(identifier, kind).with_default(default.to_scalar())
}

/// Build the schema for the built-in kinds
pub fn build() -> Schema {
    build_for(&KindRegistry::builtin())
}

/// Build the schema for a set of node kinds
pub fn build_for(kinds: &KindRegistry) -> Schema {
    let mut schema = Schema::new();

    schema.insert(TypeInfo::new(STRUCT).with(PropertyDescriptor::pointer("rna_type", STRUCT).readonly()));
    schema.insert(TypeInfo::new(ID).extends(STRUCT).with(name()));

    // ========================================================================
    // Trees & containers
    // ========================================================================

    schema.insert(
        TypeInfo::new(NODE_TREE)
            .extends(ID)
            .with(PropertyDescriptor::simple(TYPE_TAG, ScalarKind::String).readonly())
            .with(text("description"))
            .with(flag("use_fake_user"))
            .with(
                PropertyDescriptor::simple("color_tag", ScalarKind::Enum)
                    .with_default(Scalar::Enum(COLOR_TAGS[0].to_owned())),
            )
            .with(PropertyDescriptor::pointer("annotation", "Text"))
            .with(PropertyDescriptor::pointer("interface", INTERFACE).readonly())
            .with(PropertyDescriptor::collection("nodes", NODE))
            .with(PropertyDescriptor::collection("links", LINK)),
    );
    for kind in [TreeKind::Geometry, TreeKind::Shader] {
        schema.insert(TypeInfo::new(kind.tag()).extends(NODE_TREE));
    }

    schema.insert(
        TypeInfo::new(MATERIAL)
            .extends(ID)
            .with(PropertyDescriptor::simple("pass_index", ScalarKind::Int).with_default(Scalar::Int(0)))
            .with(PropertyDescriptor::pointer("node_tree", NODE_TREE).readonly()),
    );
    schema.insert(TypeInfo::new("Image").extends(ID));
    schema.insert(TypeInfo::new("Object").extends(ID));
    schema.insert(TypeInfo::new("Text").extends(ID).with(text("body")));

    // ========================================================================
    // Interface
    // ========================================================================

    schema.insert(
        TypeInfo::new(INTERFACE)
            .extends(STRUCT)
            .with(PropertyDescriptor::simple("active_index", ScalarKind::Int).with_default(Scalar::Int(0)))
            .with(PropertyDescriptor::collection("items_tree", INTERFACE_ITEM)),
    );
    schema.insert(TypeInfo::new(INTERFACE_ITEMS).extends(STRUCT).mutating());
    schema.insert(
        TypeInfo::new(INTERFACE_ITEM)
            .extends(STRUCT)
            .with(PropertyDescriptor::simple("item_type", ScalarKind::Enum).readonly())
            .with(PropertyDescriptor::pointer("parent", INTERFACE_PANEL).readonly()),
    );
    schema.insert(
        TypeInfo::new(INTERFACE_SOCKET)
            .extends(INTERFACE_ITEM)
            .with(name())
            .with(text("description"))
            .with(PropertyDescriptor::simple("in_out", ScalarKind::Enum).readonly())
            .with(PropertyDescriptor::simple("socket_type", ScalarKind::Enum).readonly())
            .with(PropertyDescriptor::simple("identifier", ScalarKind::String).readonly())
            .with(flag("hide_value")),
    );
    schema.insert(
        TypeInfo::new(INTERFACE_PANEL)
            .extends(INTERFACE_ITEM)
            .with(name())
            .with(text("description"))
            .with(flag("default_closed")),
    );

    // ========================================================================
    // Nodes
    // ========================================================================

    schema.insert(
        TypeInfo::new(NODE)
            .extends(STRUCT)
            .with(name())
            .with(text("label"))
            .with(PropertyDescriptor::simple(TYPE_TAG, ScalarKind::String).readonly())
            .with(
                PropertyDescriptor::simple("location", ScalarKind::Float)
                    .array()
                    .with_default(Scalar::FloatArray(vec![0.0, 0.0])),
            )
            .with(PropertyDescriptor::simple("width", ScalarKind::Float).with_default(Scalar::Float(140.0)))
            .with(flag("hide"))
            .with(flag("mute"))
            .with(flag("select"))
            .with(PropertyDescriptor::pointer("parent", NODE))
            .with(PropertyDescriptor::collection("inputs", NODE_SOCKET))
            .with(PropertyDescriptor::collection("outputs", NODE_SOCKET)),
    );
    schema.insert(
        TypeInfo::new(NODES)
            .extends(STRUCT)
            .mutating()
            .with(PropertyDescriptor::pointer("active", NODE)),
    );
    schema.insert(TypeInfo::new(NODE_INPUTS).extends(STRUCT).mutating());
    schema.insert(TypeInfo::new(NODE_OUTPUTS).extends(STRUCT).mutating());

    for kind in kinds.kinds() {
        let mut info = TypeInfo::new(kind.id.clone()).extends(NODE);
        for property in &kind.properties {
            info = info.with(prop_descriptor(&property.identifier, &property.default));
        }
        if let Some(pointer) = &kind.pointer {
            info = info.with(PropertyDescriptor::pointer(
                pointer.identifier.clone(),
                pointer.target.type_name(),
            ));
        }
        if let Some(items) = kind.items {
            info = info.with(PropertyDescriptor::collection(items.identifier(), items.element_type()));
        }
        if kind.role == NodeRole::RepeatInput {
            info = info.with(PropertyDescriptor::pointer("paired_output", NODE).readonly());
        }
        schema.insert(info);
    }

    // ========================================================================
    // Node items
    // ========================================================================

    for items in ItemsKind::ALL {
        schema.insert(TypeInfo::new(items.wrapper_type()).extends(STRUCT).mutating());
        let mut info = TypeInfo::new(items.element_type()).extends(STRUCT).with(name());
        info = match items {
            ItemsKind::Repeat => info.with(PropertyDescriptor::simple("socket_type", ScalarKind::Enum)),
            ItemsKind::Enum => info.with(text("description")),
            ItemsKind::Viewer => info
                .with(PropertyDescriptor::simple("socket_type", ScalarKind::Enum))
                .with(flag("auto_remove")),
        };
        schema.insert(info);
    }

    // ========================================================================
    // Sockets & links
    // ========================================================================

    schema.insert(
        TypeInfo::new(NODE_SOCKET)
            .extends(STRUCT)
            .with(name().readonly())
            .with(PropertyDescriptor::simple("identifier", ScalarKind::String).readonly())
            .with(flag("hide"))
            .with(PropertyDescriptor::simple("is_multi_input", ScalarKind::Bool).readonly())
            .with(PropertyDescriptor::simple("is_output", ScalarKind::Bool).readonly()),
    );
    for socket_type in SocketType::ALL {
        let mut info = TypeInfo::new(socket_type.type_name()).extends(NODE_SOCKET);
        // No declared default: socket defaults differ per node
        let value_kind = match socket_type {
            SocketType::Float | SocketType::Vector | SocketType::Color => Some(ScalarKind::Float),
            SocketType::Int => Some(ScalarKind::Int),
            SocketType::Bool => Some(ScalarKind::Bool),
            SocketType::String => Some(ScalarKind::String),
            SocketType::Menu => Some(ScalarKind::Enum),
            SocketType::Geometry => None,
        };
        if let Some(kind) = value_kind {
            let prop = PropertyDescriptor::simple("default_value", kind);
            info = info.with(match socket_type {
                SocketType::Vector | SocketType::Color => prop.array(),
                _ => prop,
            });
        }
        schema.insert(info);
    }

    schema.insert(
        TypeInfo::new(LINK)
            .extends(STRUCT)
            .with(PropertyDescriptor::pointer("from_node", NODE).readonly())
            .with(PropertyDescriptor::pointer("to_node", NODE).readonly())
            .with(PropertyDescriptor::pointer("from_socket", NODE_SOCKET))
            .with(PropertyDescriptor::pointer("to_socket", NODE_SOCKET))
            .with(flag("is_muted"))
            .with(PropertyDescriptor::simple("multi_input_sort_id", ScalarKind::Int).readonly()),
    );
    schema.insert(TypeInfo::new(LINKS).extends(STRUCT).mutating());

    schema
}
