// SPDX-License-Identifier: MIT OR Apache-2.0
//! Copy/paste of node trees through the clipboard text form.

use nodeclip_engine::{
    export_subject, import_document, DataValue, Document, Error, ExportSettings, ExternalResolver, Getter,
    HandlerRegistry, ImportReport, ImportSettings, ObjectModel, Phase, Subject, TreeLibrary,
};
use nodeclip_graph::{
    builtin_registry, DatablockKind, Handle, Library, NodeId, PropValue, SocketDirection, SocketType, SocketValue,
    TreeId, TreeKind,
};
use serde_json::Value;
use std::collections::HashSet;

fn copy_with(library: &Library, subject: Subject, settings: &ExportSettings) -> Document {
    let registry = builtin_registry();
    let document = export_subject(library, &registry, settings, &subject).unwrap();
    let text = document.to_text(settings.compress, settings.indent).unwrap();
    Document::from_text(&text).unwrap()
}

fn copy(library: &Library, subject: Subject) -> Document {
    copy_with(library, subject, &ExportSettings::default())
}

fn paste_with(
    library: &mut Library,
    registry: &HandlerRegistry<Library>,
    document: &Document,
    settings: ImportSettings,
    externals: ExternalResolver<Library>,
) -> nodeclip_engine::Result<ImportReport> {
    import_document(library, registry, document, &settings, externals)
}

fn paste(library: &mut Library, document: &Document) -> ImportReport {
    paste_with(
        library,
        &builtin_registry(),
        document,
        ImportSettings::default(),
        ExternalResolver::new(),
    )
    .unwrap()
}

/// Structural equality with a small tolerance on floats
fn same_json(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < 1e-6,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same_json(x, y)),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(key, x)| y.get(key).is_some_and(|y| same_json(x, y)))
        }
        _ => a == b,
    }
}

fn tree_id(library: &Library, name: &str) -> TreeId {
    library.tree_by_name(name).unwrap().id
}

fn node_id(library: &Library, tree: TreeId, name: &str) -> NodeId {
    library.tree(tree).unwrap().node_by_name(name).unwrap().id
}

/// Names of the nodes feeding "Join Geometry", in multi-input order
fn join_order(library: &Library, tree: TreeId) -> Vec<String> {
    let graph = library.tree(tree).unwrap();
    let join = graph.node_by_name("Join Geometry").unwrap();
    let socket = join.input("Geometry").unwrap().id;
    graph
        .sorted_links_to(socket)
        .into_iter()
        .map(|link| graph.node(link.from_node).unwrap().name.clone())
        .collect()
}

/// Repeat input importer that pairs the zone and imports its sockets in `phase`
fn register_zone_input_at(registry: &mut HandlerRegistry<Library>, phase: Phase) {
    registry.register_import("RepeatInput", move |imp, cx| {
        imp.import_all_simple_properties(cx, &[])?;
        let paired = cx.data().get("paired_output").and_then(DataValue::as_str).map(str::to_owned);
        let sockets: Vec<_> = ["inputs", "outputs"]
            .into_iter()
            .filter_map(|id| {
                let prop = imp.model().schema().property("RepeatInput", id).cloned()?;
                Some((prop, cx.data().get(id).cloned()?))
            })
            .collect();
        let getter = cx.getter.clone();
        let path = cx.path.clone();
        imp.defer(phase, move |imp| {
            let Handle::Node(tree, input) = getter.get(imp.model()).unwrap() else {
                panic!("repeat input is not a node");
            };
            if let Some(name) = paired {
                let output = imp.model().tree(tree).unwrap().node_by_name(&name).unwrap().id;
                imp.model_mut().pair_zone(tree, input, output).unwrap();
            }
            for (prop, value) in &sockets {
                imp.import_property(&getter, prop, value, &path.add_property(prop))?;
            }
            Ok(())
        });
        Ok(())
    });
}

#[test]
fn test_single_node_round_trip() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let math = library.add_node(tree, "Math").unwrap();
    library
        .set_node_property(tree, math, "operation", PropValue::Enum("MULTIPLY".into()))
        .unwrap();
    library.tree_mut(tree).unwrap().node_mut(math).unwrap().location = [120.0, -40.0];
    let value = library.node(tree, math).unwrap().inputs[1].id;
    library
        .set_socket_value(tree, math, value, SocketValue::Float(2.5))
        .unwrap();

    let document = copy(&library, Subject::Tree("Tree".into()));
    let report = paste(&mut library, &document);
    assert_eq!(report.subject, "Tree.001");
    assert_eq!(report.renamed_subject, Some(("Tree".into(), "Tree.001".into())));

    let pasted = tree_id(&library, "Tree.001");
    let node = library.tree(pasted).unwrap().node_by_name("Math").unwrap();
    assert_eq!(node.properties["operation"], PropValue::Enum("MULTIPLY".into()));
    assert_eq!(node.properties["use_clamp"], PropValue::Bool(false));
    assert_eq!(node.location, [120.0, -40.0]);
    assert_eq!(node.inputs[0].value, SocketValue::Float(0.5));
    assert_eq!(node.inputs[1].value, SocketValue::Float(2.5));

    // Copying the pasted tree gives the same node data
    let again = copy(&library, Subject::Tree("Tree.001".into()));
    assert_eq!(
        again.primary().unwrap().get("nodes"),
        document.primary().unwrap().get("nodes")
    );
}

#[test]
fn test_skip_defaults_round_trip() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let math = library.add_node(tree, "Math").unwrap();
    library
        .set_node_property(tree, math, "operation", PropValue::Enum("MULTIPLY".into()))
        .unwrap();
    let settings = ExportSettings {
        skip_defaults: true,
        ..ExportSettings::default()
    };

    let math_data = |document: &Document| {
        let nodes = document.primary().unwrap().get("nodes").and_then(DataValue::as_object).unwrap();
        let math = nodes.items().unwrap()[0].as_object().unwrap();
        (math.get("operation").cloned(), math.get("use_clamp").cloned())
    };
    let document = copy_with(&library, Subject::Tree("Tree".into()), &settings);
    assert_eq!(math_data(&document), (Some(DataValue::String("MULTIPLY".into())), None));

    let mut target = Library::new();
    paste(&mut target, &document);
    let pasted = tree_id(&target, "Tree");
    let node = target.tree(pasted).unwrap().node_by_name("Math").unwrap();
    assert_eq!(node.properties["operation"], PropValue::Enum("MULTIPLY".into()));
    assert_eq!(node.properties["use_clamp"], PropValue::Bool(false));

    let again = copy_with(&target, Subject::Tree("Tree".into()), &settings);
    assert_eq!(math_data(&again), math_data(&document));
    let before = serde_json::to_value(&document.trees).unwrap();
    let after = serde_json::to_value(&again.trees).unwrap();
    assert!(same_json(&before, &after), "{before}\n{after}");
}

#[test]
fn test_full_round_trip_is_idempotent() {
    let mut library = Library::new();
    let inner = library.new_tree("Inner", TreeKind::Geometry);
    library
        .interface_new_socket(inner, "Count", SocketDirection::Input, SocketType::Int, None)
        .unwrap();
    library
        .interface_new_socket(inner, "Geometry", SocketDirection::Output, SocketType::Geometry, None)
        .unwrap();
    let group_input = library.add_node(inner, "GroupInput").unwrap();
    let group_output = library.add_node(inner, "GroupOutput").unwrap();
    let cube = library.add_node(inner, "Cube").unwrap();
    library.connect(inner, group_input, "Socket_0", cube, "Vertices X").unwrap();
    library.connect(inner, cube, "Mesh", group_output, "Socket_1").unwrap();

    let tree = library.new_tree("Outer", TreeKind::Geometry);
    let group = library.add_node(tree, "Group").unwrap();
    library.set_group_tree(tree, group, Some(inner)).unwrap();
    let join = library.add_node(tree, "Join").unwrap();
    let second = library.add_node(tree, "Cube").unwrap();
    let a = library.connect(tree, group, "Socket_1", join, "Geometry").unwrap();
    let b = library.connect(tree, second, "Mesh", join, "Geometry").unwrap();
    library.swap_links(tree, a, b).unwrap();
    let input = library.add_node(tree, "RepeatInput").unwrap();
    let output = library.add_node(tree, "RepeatOutput").unwrap();
    library.pair_zone(tree, input, output).unwrap();
    library.connect(tree, join, "Geometry", input, "Item_0").unwrap();
    library.connect(tree, input, "Item_0", output, "Item_0").unwrap();
    let math = library.add_node(tree, "Math").unwrap();
    library
        .set_node_property(tree, math, "operation", PropValue::Enum("DIVIDE".into()))
        .unwrap();
    library.tree_mut(tree).unwrap().node_mut(math).unwrap().location = [0.1, 0.7];
    let frame = library.add_node(tree, "Frame").unwrap();
    library.set_node_parent(tree, math, Some(frame)).unwrap();
    library.set_active_node(tree, Some(join)).unwrap();

    let first = copy(&library, Subject::Tree("Outer".into()));
    let mut target = Library::new();
    paste(&mut target, &first);
    let second = copy(&target, Subject::Tree("Outer".into()));

    let before = serde_json::to_value(&first.trees).unwrap();
    let after = serde_json::to_value(&second.trees).unwrap();
    assert!(same_json(&before, &after), "{before:#}\n!=\n{after:#}");
}

#[test]
fn test_identities_are_unique() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let cube = library.add_node(tree, "Cube").unwrap();
    let join = library.add_node(tree, "Join").unwrap();
    library.connect(tree, cube, "Mesh", join, "Geometry").unwrap();
    library
        .interface_new_socket(tree, "Geometry", SocketDirection::Output, SocketType::Geometry, None)
        .unwrap();

    let document = copy(&library, Subject::Tree("Tree".into()));
    let mut seen = HashSet::new();
    for tree in &document.trees {
        tree.walk(&mut |object| assert!(seen.insert(object.identity), "identity {} reused", object.identity));
    }
    assert_eq!(seen.len(), document.object_count());
}

#[test]
fn test_external_pointer_needs_a_getter_when_described() {
    let mut source = Library::new();
    let tree = source.new_tree("Tree", TreeKind::Geometry);
    let cube = source.new_datablock("Cube", DatablockKind::Object);
    let info = source.add_node(tree, "ObjectInfo").unwrap();
    source.set_datablock(tree, info, Some(cube)).unwrap();

    let mut document = copy(&source, Subject::Tree("Tree".into()));
    assert_eq!(document.external.len(), 1);
    let (&id, entry) = document.external.iter().next().unwrap();
    assert_eq!(entry.fixed_type_name, "Object");
    assert_eq!(entry.description, None);
    document.set_external_descriptions([(id, "object 'Cube'")]).unwrap();

    let mut target = Library::new();
    let suzanne = target.new_datablock("Suzanne", DatablockKind::Object);
    let mut externals = ExternalResolver::new();
    externals.provide(id, Getter::fixed(Handle::Datablock(suzanne)));
    paste_with(&mut target, &builtin_registry(), &document, ImportSettings::default(), externals).unwrap();

    let pasted = tree_id(&target, "Tree");
    let info = node_id(&target, pasted, "Object Info");
    assert_eq!(target.node(pasted, info).unwrap().datablock, Some(suzanne));

    // The pointer is external again when copied from the target
    let again = copy(&target, Subject::Tree("Tree".into()));
    assert_eq!(again.external.len(), 1);
    assert_eq!(again.external.values().next().unwrap().fixed_type_name, "Object");
}

#[test]
fn test_external_pointer_back_to_the_same_object() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let cube = library.new_datablock("Cube", DatablockKind::Object);
    let info = library.add_node(tree, "ObjectInfo").unwrap();
    library.set_datablock(tree, info, Some(cube)).unwrap();

    let mut document = copy(&library, Subject::Tree("Tree".into()));
    let id = *document.external.keys().next().unwrap();
    document.set_external_descriptions([(id, "object 'Cube'")]).unwrap();

    let mut externals = ExternalResolver::new();
    externals.provide(id, Getter::fixed(Handle::Datablock(cube)));
    let report = paste_with(&mut library, &builtin_registry(), &document, ImportSettings::default(), externals).unwrap();
    assert_eq!(report.subject, "Tree.001");

    let pasted = tree_id(&library, "Tree.001");
    let info = node_id(&library, pasted, "Object Info");
    assert_eq!(library.node(pasted, info).unwrap().datablock, Some(cube));
    let original = node_id(&library, tree, "Object Info");
    assert_eq!(library.node(tree, original).unwrap().datablock, Some(cube));

    let again = copy(&library, Subject::Tree("Tree.001".into()));
    assert_eq!(again.external.len(), 1);
    assert_eq!(again.external.values().next().unwrap().fixed_type_name, "Object");
}

#[test]
fn test_externals_chosen_by_type() {
    let mut source = Library::new();
    let tree = source.new_tree("Tree", TreeKind::Geometry);
    let cube = source.new_datablock("Cube", DatablockKind::Object);
    let info = source.add_node(tree, "ObjectInfo").unwrap();
    source.set_datablock(tree, info, Some(cube)).unwrap();
    let notes = source.new_datablock("Notes", DatablockKind::Text);
    source.set_annotation(tree, Some(notes)).unwrap();

    let mut document = copy(&source, Subject::Tree("Tree".into()));
    let ids: Vec<u64> = document.external.keys().copied().collect();
    document.set_external_descriptions(ids.iter().map(|&id| (id, "local stand-in"))).unwrap();

    let mut target = Library::new();
    let suzanne = target.new_datablock("Suzanne", DatablockKind::Object);
    let readme = target.new_datablock("Readme", DatablockKind::Text);
    let mut externals = ExternalResolver::new();
    externals.choose_with(move |entry| match entry.fixed_type_name.as_str() {
        "Object" => Some(Getter::fixed(Handle::Datablock(suzanne))),
        "Text" => Some(Getter::fixed(Handle::Datablock(readme))),
        _ => None,
    });
    paste_with(&mut target, &builtin_registry(), &document, ImportSettings::default(), externals).unwrap();

    let pasted = tree_id(&target, "Tree");
    let info = node_id(&target, pasted, "Object Info");
    assert_eq!(target.node(pasted, info).unwrap().datablock, Some(suzanne));
    assert_eq!(target.tree(pasted).unwrap().annotation, Some(readme));

    // A text stand-in for the object entry fails before any tree is created
    let mut target = Library::new();
    let readme = target.new_datablock("Readme", DatablockKind::Text);
    let mut externals = ExternalResolver::new();
    externals.choose_with(move |_| Some(Getter::fixed(Handle::Datablock(readme))));
    let err = paste_with(&mut target, &builtin_registry(), &document, ImportSettings::default(), externals)
        .unwrap_err();
    assert!(
        matches!(&err, Error::ExternalTypeMismatch { expected, found, .. } if expected == "Object" && found == "Text"),
        "{err}"
    );
    assert_eq!(target.trees().count(), 0);
}

#[test]
fn test_undescribed_external_pointer_is_cleared() {
    let mut source = Library::new();
    let tree = source.new_tree("Tree", TreeKind::Geometry);
    let cube = source.new_datablock("Cube", DatablockKind::Object);
    let info = source.add_node(tree, "ObjectInfo").unwrap();
    source.set_datablock(tree, info, Some(cube)).unwrap();
    let document = copy(&source, Subject::Tree("Tree".into()));

    let mut target = Library::new();
    paste(&mut target, &document);
    let pasted = tree_id(&target, "Tree");
    let info = node_id(&target, pasted, "Object Info");
    assert_eq!(target.node(pasted, info).unwrap().datablock, None);
}

#[test]
fn test_pointers_to_one_external_collapse() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let cube = library.new_datablock("Cube", DatablockKind::Object);
    for _ in 0..3 {
        let info = library.add_node(tree, "ObjectInfo").unwrap();
        library.set_datablock(tree, info, Some(cube)).unwrap();
    }
    let notes = library.new_datablock("Notes", DatablockKind::Text);
    library.set_annotation(tree, Some(notes)).unwrap();

    let document = copy(&library, Subject::Tree("Tree".into()));
    let mut types: Vec<_> = document.external.values().map(|e| e.fixed_type_name.as_str()).collect();
    types.sort_unstable();
    assert_eq!(types, ["Object", "Text"]);
}

#[test]
fn test_missing_getter_fails_before_any_change() {
    let mut source = Library::new();
    let tree = source.new_tree("Tree", TreeKind::Geometry);
    let cube = source.new_datablock("Cube", DatablockKind::Object);
    let info = source.add_node(tree, "ObjectInfo").unwrap();
    source.set_datablock(tree, info, Some(cube)).unwrap();
    let mut document = copy(&source, Subject::Tree("Tree".into()));
    let id = *document.external.keys().next().unwrap();
    document.set_external_descriptions([(id, "object 'Cube'")]).unwrap();

    let mut target = Library::new();
    let err = paste_with(&mut target, &builtin_registry(), &document, ImportSettings::default(), ExternalResolver::new())
        .unwrap_err();
    assert!(matches!(err, Error::MissingExternal { external_id, .. } if external_id == id));
    assert_eq!(target.trees().count(), 0);
}

#[test]
fn test_repeat_zone_round_trip() {
    let mut library = Library::new();
    let tree = library.new_tree("Zone", TreeKind::Geometry);
    let input = library.add_node(tree, "RepeatInput").unwrap();
    let output = library.add_node(tree, "RepeatOutput").unwrap();
    library.pair_zone(tree, input, output).unwrap();
    library.new_node_item(tree, output, "Count", SocketType::Int).unwrap();
    library.connect(tree, input, "Item_0", output, "Item_0").unwrap();
    library.connect(tree, input, "Item_1", output, "Item_1").unwrap();

    let document = copy(&library, Subject::Tree("Zone".into()));
    let mut target = Library::new();
    paste(&mut target, &document);

    let pasted = tree_id(&target, "Zone");
    let input = target.tree(pasted).unwrap().node_by_name("Repeat Input").unwrap();
    let output = target.tree(pasted).unwrap().node_by_name("Repeat Output").unwrap();
    assert_eq!(input.paired_output, Some(output.id));
    let names: Vec<_> = output.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["Geometry", "Count"]);
    assert_eq!(input.outputs.len(), 2);
    assert_eq!(target.tree(pasted).unwrap().link_count(), 2);
}

#[test]
fn test_zone_sockets_must_exist_before_links() {
    let mut library = Library::new();
    let tree = library.new_tree("Zone", TreeKind::Geometry);
    let input = library.add_node(tree, "RepeatInput").unwrap();
    let output = library.add_node(tree, "RepeatOutput").unwrap();
    library.pair_zone(tree, input, output).unwrap();
    library.connect(tree, input, "Item_0", output, "Item_0").unwrap();
    let document = copy(&library, Subject::Tree("Zone".into()));

    // Pairing ahead of the links lets them find the zone's sockets
    let mut registry = builtin_registry();
    register_zone_input_at(&mut registry, Phase::AfterStructureBeforeLinks);
    let mut target = Library::new();
    paste_with(&mut target, &registry, &document, ImportSettings::default(), ExternalResolver::new()).unwrap();
    assert_eq!(target.tree(tree_id(&target, "Zone")).unwrap().link_count(), 1);

    // Pairing after the links leaves the link endpoints unknown
    let mut registry = builtin_registry();
    register_zone_input_at(&mut registry, Phase::AfterLinks);
    let mut target = Library::new();
    let err = paste_with(&mut target, &registry, &document, ImportSettings::default(), ExternalResolver::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvedIdentity { .. }), "{err}");
    assert!(err.to_string().contains("links"), "{err}");
}

#[test]
fn test_multi_input_order_survives() {
    const PERMUTATIONS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    const NAMES: [&str; 3] = ["Cube", "Cube.001", "Cube.002"];

    for permutation in PERMUTATIONS {
        let mut library = Library::new();
        let tree = library.new_tree("Tree", TreeKind::Geometry);
        let cubes: Vec<_> = (0..3).map(|_| library.add_node(tree, "Cube").unwrap()).collect();
        let join = library.add_node(tree, "Join").unwrap();
        let links: Vec<_> = cubes
            .iter()
            .map(|&cube| library.connect(tree, cube, "Mesh", join, "Geometry").unwrap())
            .collect();

        // Put links[permutation[p]] at position p
        for (position, &wanted) in permutation.iter().enumerate() {
            let graph = library.tree(tree).unwrap();
            let holder = links
                .iter()
                .copied()
                .find(|&l| graph.link(l).unwrap().multi_input_sort_id == position as i64)
                .unwrap();
            if holder != links[wanted] {
                library.swap_links(tree, holder, links[wanted]).unwrap();
            }
        }
        let expected: Vec<_> = permutation.iter().map(|&i| NAMES[i]).collect();
        assert_eq!(join_order(&library, tree), expected);

        let document = copy(&library, Subject::Tree("Tree".into()));
        let mut target = Library::new();
        paste(&mut target, &document);
        let pasted = tree_id(&target, "Tree");
        assert_eq!(join_order(&target, pasted), expected, "permutation {permutation:?}");

        let graph = target.tree(pasted).unwrap();
        let mut sort_ids: Vec<_> = graph.links().map(|link| link.multi_input_sort_id).collect();
        sort_ids.sort_unstable();
        assert_eq!(sort_ids, [0, 1, 2]);
    }
}

#[test]
fn test_overwrite_reuses_local_tree() {
    let mut source = Library::new();
    let tree = source.new_tree("Tree", TreeKind::Geometry);
    source.add_node(tree, "Cube").unwrap();
    let document = copy(&source, Subject::Tree("Tree".into()));

    let mut target = Library::new();
    let existing = target.new_tree("Tree", TreeKind::Geometry);
    target.add_node(existing, "Math").unwrap();
    target.add_node(existing, "Math").unwrap();

    let settings = ImportSettings {
        overwrite: true,
        ..ImportSettings::default()
    };
    let report = paste_with(&mut target, &builtin_registry(), &document, settings, ExternalResolver::new()).unwrap();
    assert_eq!(report.renamed_subject, None);
    assert_eq!(target.trees().count(), 1);
    let graph = target.tree(existing).unwrap();
    assert_eq!(graph.node_count(), 1);
    assert!(graph.node_by_name("Cube").is_some());

    let report = paste(&mut target, &document);
    assert_eq!(report.subject, "Tree.001");
    assert_eq!(target.trees().count(), 2);
}

#[test]
fn test_version_mismatch() {
    let mut source = Library::new();
    source.new_tree("Tree", TreeKind::Geometry);
    let document = copy(&source, Subject::Tree("Tree".into()));

    let mut target = Library::new();
    target.version = "nodeclip-graph 99.0.0".into();
    let err = paste_with(&mut target, &builtin_registry(), &document, ImportSettings::default(), ExternalResolver::new())
        .unwrap_err();
    assert!(matches!(err, Error::VersionMismatch(_)));
    assert_eq!(target.trees().count(), 0);

    let settings = ImportSettings {
        allow_version_mismatch: true,
        ..ImportSettings::default()
    };
    paste_with(&mut target, &builtin_registry(), &document, settings, ExternalResolver::new()).unwrap();
    assert!(target.tree_by_name("Tree").is_some());
}

#[test]
fn test_material_subject() {
    let mut source = Library::new();
    let material = source.new_material("Wood");
    let tree = source.material(material).unwrap().node_tree;
    let texture = source.add_node(tree, "ImageTexture").unwrap();
    let output = node_id(&source, tree, "Material Output");
    source.connect(tree, texture, "Color", output, "Surface").unwrap();
    let grain = source.new_datablock("grain.png", DatablockKind::Image);
    source.set_datablock(tree, texture, Some(grain)).unwrap();

    let document = copy(&source, Subject::Container("Wood".into()));
    assert_eq!(document.subject_name.as_deref(), Some("Wood"));
    assert_eq!(document.external.values().next().unwrap().fixed_type_name, "Image");

    let mut target = Library::new();
    target.new_material("Wood");
    let report = paste(&mut target, &document);
    assert!(report.subject_is_container);
    assert_eq!(report.subject, "Wood.001");

    let pasted = target.material_by_name("Wood.001").unwrap().node_tree;
    let graph = target.tree(pasted).unwrap();
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.link_count(), 1);
    // Embedded trees are not listed on their own
    assert_eq!(target.trees().count(), 0);
}

#[test]
fn test_nested_groups_come_first() {
    let mut library = Library::new();
    let inner = library.new_tree("Inner", TreeKind::Geometry);
    let panel = library.interface_new_panel(inner, "Settings").unwrap();
    library
        .interface_new_socket(inner, "Size", SocketDirection::Input, SocketType::Float, Some(panel))
        .unwrap();
    library
        .interface_new_socket(inner, "Geometry", SocketDirection::Output, SocketType::Geometry, None)
        .unwrap();
    let group_input = library.add_node(inner, "GroupInput").unwrap();
    let group_output = library.add_node(inner, "GroupOutput").unwrap();
    let cube = library.add_node(inner, "Cube").unwrap();
    library.connect(inner, cube, "Mesh", group_output, "Socket_1").unwrap();
    library.connect(inner, group_input, "Socket_0", cube, "Vertices X").unwrap();

    let middle = library.new_tree("Middle", TreeKind::Geometry);
    let uses_inner = library.add_node(middle, "Group").unwrap();
    library.set_group_tree(middle, uses_inner, Some(inner)).unwrap();
    let outer = library.new_tree("Outer", TreeKind::Geometry);
    let uses_middle = library.add_node(outer, "Group").unwrap();
    library.set_group_tree(outer, uses_middle, Some(middle)).unwrap();
    let also_inner = library.add_node(outer, "Group").unwrap();
    library.set_group_tree(outer, also_inner, Some(inner)).unwrap();
    let size = library.node(outer, also_inner).unwrap().input("Socket_0").unwrap().id;
    library.set_socket_value(outer, also_inner, size, SocketValue::Float(3.0)).unwrap();

    let document = copy(&library, Subject::Tree("Outer".into()));
    let names: Vec<_> = document.trees.iter().map(|t| t.str("name").unwrap()).collect();
    assert_eq!(names, ["Inner", "Middle", "Outer"]);

    let mut target = Library::new();
    let report = paste(&mut target, &document);
    assert_eq!(report.trees_imported, 3);

    let inner = tree_id(&target, "Inner");
    let graph = target.tree(inner).unwrap();
    assert_eq!(graph.link_count(), 2);
    let items = &graph.interface.items;
    assert_eq!(items.len(), 3);
    assert!(items[0].is_panel());
    assert_eq!(items[1].name, "Size");
    assert_eq!(items[1].parent, Some(items[0].id));
    assert_eq!(items[2].parent, None);

    let outer = tree_id(&target, "Outer");
    let groups: Vec<_> = target
        .tree(outer)
        .unwrap()
        .nodes()
        .map(|n| (n.node_tree.unwrap(), n.inputs.first().map(|s| s.value.clone())))
        .collect();
    assert_eq!(groups[0], (tree_id(&target, "Middle"), None));
    assert_eq!(groups[1], (inner, Some(SocketValue::Float(3.0))));
}

#[test]
fn test_renamed_dependency_is_reported() {
    let mut library = Library::new();
    let inner = library.new_tree("Inner", TreeKind::Geometry);
    let outer = library.new_tree("Outer", TreeKind::Geometry);
    let group = library.add_node(outer, "Group").unwrap();
    library.set_group_tree(outer, group, Some(inner)).unwrap();
    let document = copy(&library, Subject::Tree("Outer".into()));

    let report = paste(&mut library, &document);
    assert_eq!(report.renamed_trees.get("Inner").map(String::as_str), Some("Inner.001"));
    let pasted = tree_id(&library, "Outer.001");
    let group = library.tree(pasted).unwrap().node_by_name("Group").unwrap();
    assert_eq!(group.node_tree, Some(tree_id(&library, "Inner.001")));
}

#[test]
fn test_subtrees_left_out_become_external() {
    let mut library = Library::new();
    let inner = library.new_tree("Inner", TreeKind::Geometry);
    let outer = library.new_tree("Outer", TreeKind::Geometry);
    let group = library.add_node(outer, "Group").unwrap();
    library.set_group_tree(outer, group, Some(inner)).unwrap();

    let settings = ExportSettings {
        include_subtrees: false,
        ..ExportSettings::default()
    };
    let mut document = copy_with(&library, Subject::Tree("Outer".into()), &settings);
    assert_eq!(document.trees.len(), 1);
    let id = *document.external.keys().next().unwrap();
    document.set_external_descriptions([(id, "tree 'Inner'")]).unwrap();

    let mut externals = ExternalResolver::new();
    externals.provide(id, Library::tree_getter("Inner".to_owned()));
    paste_with(&mut library, &builtin_registry(), &document, ImportSettings::default(), externals).unwrap();
    let pasted = tree_id(&library, "Outer.001");
    let group = library.tree(pasted).unwrap().node_by_name("Group").unwrap();
    assert_eq!(group.node_tree, Some(inner));
}

#[test]
fn test_frames_and_active_node() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let math = library.add_node(tree, "Math").unwrap();
    let frame = library.add_node(tree, "Frame").unwrap();
    library.set_node_parent(tree, math, Some(frame)).unwrap();
    library.set_active_node(tree, Some(math)).unwrap();
    library.tree_mut(tree).unwrap().node_mut(math).unwrap().select = true;

    let document = copy(&library, Subject::Tree("Tree".into()));
    let mut target = Library::new();
    paste(&mut target, &document);

    let pasted = tree_id(&target, "Tree");
    let graph = target.tree(pasted).unwrap();
    let math = graph.node_by_name("Math").unwrap();
    let frame = graph.node_by_name("Frame").unwrap();
    assert_eq!(math.parent, Some(frame.id));
    assert_eq!(graph.active_node, Some(math.id));
    // Selection stays behind
    assert!(!math.select);
}

#[test]
fn test_viewer_items_survive_auto_remove() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let math = library.add_node(tree, "Math").unwrap();
    let viewer = library.add_node(tree, "Viewer").unwrap();
    let item = library.new_node_item(tree, viewer, "Value", SocketType::Float).unwrap();
    library.connect(tree, math, "Value", viewer, "Item_0").unwrap();
    library.update_node_item(tree, viewer, item, |i| i.auto_remove = true).unwrap();

    let document = copy(&library, Subject::Tree("Tree".into()));
    let mut target = Library::new();
    paste(&mut target, &document);

    let pasted = tree_id(&target, "Tree");
    let graph = target.tree(pasted).unwrap();
    let viewer = graph.node_by_name("Viewer").unwrap();
    assert_eq!(viewer.items.len(), 1);
    assert!(viewer.items[0].auto_remove);
    assert_eq!(graph.link_count(), 1);
}

#[test]
fn test_menu_value_waits_for_choices() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    let switch = library.add_node(tree, "MenuSwitch").unwrap();
    let items: Vec<_> = library.node(tree, switch).unwrap().items.iter().map(|i| i.id).collect();
    library.update_node_item(tree, switch, items[0], |i| i.name = "Low".into()).unwrap();
    library.update_node_item(tree, switch, items[1], |i| i.name = "High".into()).unwrap();
    let menu = library.node(tree, switch).unwrap().input("Menu").unwrap().id;
    library
        .set_socket_value(tree, switch, menu, SocketValue::Menu("High".into()))
        .unwrap();

    let document = copy(&library, Subject::Tree("Tree".into()));
    let mut target = Library::new();
    paste(&mut target, &document);

    let pasted = tree_id(&target, "Tree");
    let switch = target.tree(pasted).unwrap().node_by_name("Menu Switch").unwrap();
    let names: Vec<_> = switch.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["Low", "High"]);
    assert_eq!(switch.input("Menu").unwrap().value, SocketValue::Menu("High".into()));
}

#[test]
fn test_plain_json_and_paths() {
    let mut library = Library::new();
    let tree = library.new_tree("Tree", TreeKind::Geometry);
    library.add_node(tree, "Cube").unwrap();

    let settings = ExportSettings {
        compress: false,
        indent: 2,
        write_paths: true,
        skip_defaults: true,
        ..ExportSettings::default()
    };
    let document = copy_with(&library, Subject::Tree("Tree".into()), &settings);
    let nodes = document.primary().unwrap().get("nodes").unwrap().as_object().unwrap();
    let cube = nodes.items().unwrap()[0].as_object().unwrap();
    assert!(cube.path.as_deref().is_some_and(|p| p.contains("nodes")));
    // Defaults are left out, so the pasted node keeps its own
    assert!(cube.get("location").is_none());

    let mut target = Library::new();
    paste(&mut target, &document);
    let pasted = tree_id(&target, "Tree");
    assert!(target.tree(pasted).unwrap().node_by_name("Cube").is_some());
}
