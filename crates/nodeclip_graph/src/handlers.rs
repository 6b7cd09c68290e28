// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in export/import handlers for the node library.
//!
//! The reflection fallback covers plain properties. Handlers exist where the
//! library needs explicit construction calls: collections that must be
//! rebuilt through library operations, read-only pointers inside a tree, and
//! values that only validate once the rest of the tree exists.
//!
//! Deferred work runs in three phases:
//!
//! - after structure: node parents, the active node and repeat zone pairing
//! - after links: viewer items that remove themselves when unlinked
//! - after the enum domain: menu socket values, once menu choices are known

use crate::error::GraphError;
use crate::ids::{LinkId, SocketId, TreeId};
use crate::library::Library;
use crate::model::{CollectionRef, Handle};
use crate::node::ItemsKind;
use crate::schema::{
    INTERFACE, INTERFACE_ITEM, INTERFACE_ITEMS, INTERFACE_SOCKET, LINK, LINKS, NODE, NODES, NODE_INPUTS,
    NODE_OUTPUTS, NODE_SOCKET, NODE_TREE, TYPE_TAG,
};
use crate::socket::{SocketDirection, SocketType};
use nodeclip_engine::{
    no_clobber, DataValue, Error, ExportCx, Exporter, HandlerRegistry, ImportCx, Importer, ModelError,
    ObjectData, ObjectModel, PathTrail, Phase, Property, Result, RuntimeType, SerializedObject, WithPath,
};

/// Attach a path to library errors
trait GraphResultExt<T> {
    fn at(self, path: &PathTrail) -> Result<T>;
}

impl<T> GraphResultExt<T> for std::result::Result<T, GraphError> {
    fn at(self, path: &PathTrail) -> Result<T> {
        self.map_err(ModelError::from).at(path)
    }
}

/// Registry with every handler the node library needs
pub fn builtin_registry() -> HandlerRegistry<Library> {
    let mut registry = HandlerRegistry::new();

    // Editor selection is session state
    registry.forbid("select");

    // ========================================================================
    // Trees
    // ========================================================================

    registry.register_export(NODE_TREE, |exp, cx| {
        exp.export_all_simple_properties_and(cx, &[TYPE_TAG, "annotation", "interface", "nodes", "links"])
    });
    registry.register_import(NODE_TREE, import_tree);

    // ========================================================================
    // Interface
    // ========================================================================

    registry.register_export(INTERFACE, |exp, cx| exp.export_all_simple_properties_and(cx, &["items_tree"]));
    registry.register_import(INTERFACE, |imp, cx| {
        imp.import_properties(cx, &["items_tree"])?;
        imp.import_all_simple_properties(cx, &[])
    });
    registry.register_import(INTERFACE_ITEMS, import_interface_items);
    registry.register_export(INTERFACE_ITEM, export_interface_item);
    // Kind, direction, type and parent are fixed when the item list is rebuilt
    registry.register_import(INTERFACE_ITEM, |_, _| Ok(()));

    // ========================================================================
    // Nodes
    // ========================================================================

    registry.register_import(NODES, import_nodes);
    registry.register_export(NODE, export_node);
    registry.register_import(NODE, import_node);
    registry.register_export("RepeatInput", export_repeat_input);
    registry.register_import("RepeatInput", import_repeat_input);

    // Sockets are created by their node; only their values travel
    registry.register_import(NODE_INPUTS, |_, _| Ok(()));
    registry.register_import(NODE_OUTPUTS, |_, _| Ok(()));
    registry.register_export(NODE_SOCKET, |exp, cx| exp.export_all_simple_properties_and(cx, &["identifier"]));
    registry.register_export(SocketType::Menu.type_name(), |exp, cx| {
        let mut data = exp.export_all_simple_properties_and(cx, &["identifier"])?;
        if data.get("default_value").and_then(DataValue::as_str) == Some("") {
            data.shift_remove("default_value");
        }
        Ok(data)
    });
    registry.register_import(SocketType::Menu.type_name(), |imp, cx| {
        imp.import_all_simple_properties(cx, &["default_value"])?;
        defer_properties(imp, cx, Phase::AfterEnumDomain, &["default_value"])
    });

    for items in ItemsKind::ALL {
        registry.register_import(items.wrapper_type(), import_node_items);
        registry.register_export(items.element_type(), |exp, cx| exp.export_all_simple_properties(cx));
    }
    registry.register_import(ItemsKind::Viewer.element_type(), |imp, cx| {
        imp.import_all_simple_properties(cx, &["auto_remove"])?;
        defer_properties(imp, cx, Phase::AfterLinks, &["auto_remove"])
    });

    // ========================================================================
    // Links
    // ========================================================================

    registry.register_export(LINK, |exp, cx| {
        exp.export_all_simple_properties_and(cx, &["from_socket", "to_socket", "multi_input_sort_id"])
    });
    // Endpoints are set when the link list is rebuilt
    registry.register_import(LINK, |imp, cx| imp.import_all_simple_properties(cx, &[]));
    registry.register_import(LINKS, import_links);

    registry
}

// ============================================================================
// Helpers
// ============================================================================

fn unexpected(handle: &Handle, path: &PathTrail) -> Error {
    Error::schema(format!("unexpected object {handle:?}"), path)
}

fn tree_handle(imp: &Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<TreeId> {
    match cx.getter.get(imp.model()).at(&cx.path)? {
        Handle::Tree(tree) => Ok(tree),
        other => Err(unexpected(&other, &cx.path)),
    }
}

fn collection_handle(imp: &Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<(TreeId, CollectionRef)> {
    match cx.getter.get(imp.model()).at(&cx.path)? {
        Handle::Collection(tree, which) => Ok((tree, which)),
        other => Err(unexpected(&other, &cx.path)),
    }
}

/// Serialized items of a collection, each with its diagnostic path
fn serialized_items<'d>(cx: &ImportCx<'d, Library>) -> Result<Vec<(PathTrail, &'d SerializedObject)>> {
    cx.object
        .items()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let object = item.as_object();
            let path = cx.path.add_index(index, object.and_then(|o| o.str("name")));
            object
                .map(|o| (path.clone(), o))
                .ok_or_else(|| Error::schema(format!("item {index} is not an object"), &path))
        })
        .collect()
}

/// Queue named properties of the handled object for a later phase.
///
/// Absent properties are skipped; the value is applied exactly as serialized.
fn defer_properties(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>, phase: Phase, identifiers: &[&str]) -> Result<()> {
    let RuntimeType::Typed(type_name) = &cx.runtime_type else {
        return Err(Error::schema("cannot defer properties of an untyped collection", &cx.path));
    };
    for identifier in identifiers {
        let Some(value) = cx.data().get(*identifier).cloned() else {
            continue;
        };
        let prop = imp
            .model()
            .schema()
            .property(type_name, identifier)
            .cloned()
            .ok_or_else(|| Error::schema(format!("{type_name} has no property '{identifier}'"), &cx.path))?;
        let getter = cx.getter.clone();
        let path = cx.path.add_property(&prop);
        imp.defer(phase, move |imp| imp.import_property(&getter, &prop, &value, &path));
    }
    Ok(())
}

// ============================================================================
// Trees
// ============================================================================

fn import_tree(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<()> {
    let tree = tree_handle(imp, cx)?;
    imp.model_mut().clear_tree(tree).at(&cx.path)?;
    // The tree was created or reused under its final name
    imp.import_all_simple_properties(cx, &["name"])?;
    imp.import_properties(cx, &["annotation"])?;
    imp.import_staged_tree(cx, &["interface", "nodes"], &["links"])
}

// ============================================================================
// Interface
// ============================================================================

fn export_interface_item(exp: &mut Exporter<'_, Library>, cx: &ExportCx<Library>) -> Result<ObjectData> {
    let mut data = exp.export_properties(cx, &["item_type"])?;
    if cx.runtime_type == RuntimeType::Typed(INTERFACE_SOCKET.to_owned()) {
        for identifier in ["in_out", "socket_type"] {
            if let Some(value) = exp.export_property(cx, identifier)? {
                no_clobber(&mut data, identifier, value, &cx.path)?;
            }
        }
    }

    let Handle::InterfaceItem(tree, item) = cx.obj else {
        return Err(unexpected(&cx.obj, &cx.path));
    };
    let interface = &exp.model().tree(tree).at(&cx.path)?.interface;
    let parent_index = interface
        .item(item)
        .and_then(|i| i.parent)
        .and_then(|parent| interface.index_of(parent))
        .map_or(-1, |index| index as i64);
    no_clobber(&mut data, "parent_index", DataValue::Int(parent_index), &cx.path)?;
    Ok(data)
}

/// Rebuild the interface item list in serialized order, then restore panels
fn import_interface_items(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<()> {
    let (tree, CollectionRef::InterfaceItems) = collection_handle(imp, cx)? else {
        return Err(Error::schema("expected an interface item list", &cx.path));
    };
    let items = serialized_items(cx)?;
    imp.model_mut().interface_clear(tree).at(&cx.path)?;

    let mut created = Vec::with_capacity(items.len());
    for (path, item) in &items {
        let name = item.str("name").unwrap_or_default();
        let id = match item.str("item_type") {
            Some("PANEL") => imp.model_mut().interface_new_panel(tree, name).at(path)?,
            Some("SOCKET") => {
                let in_out = item
                    .str("in_out")
                    .and_then(SocketDirection::from_tag)
                    .ok_or_else(|| Error::schema("interface socket has no valid 'in_out'", path))?;
                let socket_type = item
                    .str("socket_type")
                    .and_then(SocketType::from_tag)
                    .ok_or_else(|| Error::schema("interface socket has no valid 'socket_type'", path))?;
                imp.model_mut()
                    .interface_new_socket(tree, name, in_out, socket_type, None)
                    .at(path)?
            }
            other => return Err(Error::schema(format!("unknown interface item type {other:?}"), path)),
        };
        created.push(id);
    }

    for ((path, item), id) in items.iter().zip(&created) {
        let parent = item
            .get("parent_index")
            .and_then(DataValue::as_int)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| created.get(index).copied());
        if let Some(parent) = parent {
            imp.model_mut()
                .update_interface_item(tree, *id, |entry| entry.parent = Some(parent))
                .at(path)?;
        }
    }
    Ok(())
}

// ============================================================================
// Nodes
// ============================================================================

/// Create every node by type tag under its serialized name
fn import_nodes(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<()> {
    let (tree, CollectionRef::Nodes) = collection_handle(imp, cx)? else {
        return Err(Error::schema("expected a node list", &cx.path));
    };
    for (path, item) in serialized_items(cx)? {
        let node_type = item
            .str(TYPE_TAG)
            .ok_or_else(|| Error::schema(format!("node has no '{TYPE_TAG}'"), &path))?;
        let node = imp.model_mut().add_node(tree, node_type).at(&path)?;
        if let Some(name) = item.str("name") {
            imp.model_mut().set_node_name(tree, node, name).at(&path)?;
        }
    }
    defer_properties(imp, cx, Phase::AfterStructureBeforeLinks, &["active"])
}

fn export_node(exp: &mut Exporter<'_, Library>, cx: &ExportCx<Library>) -> Result<ObjectData> {
    exp.export_all_simple_properties_and(cx, &[TYPE_TAG, "parent", "inputs", "outputs"])
}

fn import_node(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<()> {
    imp.import_all_simple_properties(cx, &[])?;
    defer_properties(imp, cx, Phase::AfterStructureBeforeLinks, &["parent"])?;
    imp.import_properties(cx, &["inputs", "outputs"])
}

/// Zone inputs name their paired output instead of pointing at it
fn export_repeat_input(exp: &mut Exporter<'_, Library>, cx: &ExportCx<Library>) -> Result<ObjectData> {
    let mut data = export_node(exp, cx)?;
    let model = exp.model();
    let paired = match model.get(&cx.obj, "paired_output").at(&cx.path)? {
        Property::Pointer(Some(output)) => model.display_name(&output).map_or(DataValue::Null, DataValue::String),
        _ => DataValue::Null,
    };
    no_clobber(&mut data, "paired_output", paired, &cx.path)?;
    Ok(data)
}

/// The input's sockets mirror its paired output, so they wait for the pairing
fn import_repeat_input(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<()> {
    imp.import_all_simple_properties(cx, &[])?;
    defer_properties(imp, cx, Phase::AfterStructureBeforeLinks, &["parent"])?;

    let paired = cx.data().get("paired_output").and_then(DataValue::as_str).map(str::to_owned);
    let getter = cx.getter.clone();
    let path = cx.path.clone();
    imp.defer(Phase::AfterStructureBeforeLinks, move |imp| {
        let Some(name) = paired else {
            return Ok(());
        };
        let (tree, input) = match getter.get(imp.model()).at(&path)? {
            Handle::Node(tree, node) => (tree, node),
            other => return Err(unexpected(&other, &path)),
        };
        let output = imp
            .model()
            .tree(tree)
            .at(&path)?
            .node_by_name(&name)
            .map(|node| node.id)
            .ok_or_else(|| Error::schema(format!("paired zone output '{name}' not found"), &path))?;
        imp.model_mut().pair_zone(tree, input, output).at(&path)
    });

    defer_properties(imp, cx, Phase::AfterStructureBeforeLinks, &["inputs", "outputs"])
}

/// Recreate the items of a repeat zone, menu switch or viewer
fn import_node_items(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<()> {
    let (tree, CollectionRef::NodeItems(node)) = collection_handle(imp, cx)? else {
        return Err(Error::schema("expected a node item list", &cx.path));
    };
    let items = serialized_items(cx)?;
    imp.model_mut().clear_node_items(tree, node).at(&cx.path)?;
    for (path, item) in items {
        let name = item.str("name").unwrap_or_default();
        let socket_type = match item.str("socket_type") {
            Some(tag) => SocketType::from_tag(tag)
                .ok_or_else(|| Error::schema(format!("unknown socket type '{tag}'"), &path))?,
            None => SocketType::Float,
        };
        imp.model_mut().new_node_item(tree, node, name, socket_type).at(&path)?;
    }
    Ok(())
}

// ============================================================================
// Links
// ============================================================================

fn link_endpoint(imp: &Importer<'_, Library>, item: &SerializedObject, key: &str, path: &PathTrail) -> Result<SocketId> {
    let identity = item
        .get(key)
        .and_then(DataValue::as_identity)
        .ok_or_else(|| Error::schema(format!("link has no '{key}'"), path))?;
    match imp.resolve_handle(identity, path)? {
        Some(Handle::Socket(_, _, socket)) => Ok(socket),
        other => Err(Error::schema(format!("'{key}' does not resolve to a socket: {other:?}"), path)),
    }
}

/// Connect in serialized order, then restore multi-input ordering
fn import_links(imp: &mut Importer<'_, Library>, cx: &ImportCx<'_, Library>) -> Result<()> {
    let (tree, CollectionRef::Links) = collection_handle(imp, cx)? else {
        return Err(Error::schema("expected a link list", &cx.path));
    };
    let mut created = Vec::new();
    for (path, item) in serialized_items(cx)? {
        let from = link_endpoint(imp, item, "from_socket", &path)?;
        let to = link_endpoint(imp, item, "to_socket", &path)?;
        let link = imp.model_mut().connect_sockets(tree, from, to).at(&path)?;
        let sort_id = item.get("multi_input_sort_id").and_then(DataValue::as_int);
        created.push((link, sort_id, path));
    }
    for (link, sort_id, path) in created {
        if let Some(sort_id) = sort_id {
            restore_sort_id(imp.model_mut(), tree, link, sort_id).at(&path)?;
        }
    }
    Ok(())
}

/// Swap sort ids with the sibling holding the wanted one.
///
/// Sort ids into a socket stay dense, so applying this in link order never
/// disturbs a link placed earlier.
fn restore_sort_id(library: &mut Library, tree: TreeId, link: LinkId, wanted: i64) -> crate::error::Result<()> {
    let graph = library.tree(tree)?;
    let current = graph.link(link).ok_or(GraphError::LinkNotFound(link))?;
    if current.multi_input_sort_id == wanted {
        return Ok(());
    }
    let count = graph.links_to(current.to_socket).count();
    let holder = graph
        .links_to(current.to_socket)
        .find(|other| other.multi_input_sort_id == wanted)
        .map(|other| other.id);
    match holder {
        Some(other) => library.swap_links(tree, link, other),
        None => Err(GraphError::SortIdOutOfRange { wanted, count }),
    }
}
