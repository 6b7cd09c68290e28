// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sample copy/paste round trip against the reference library.

use anyhow::{Context, Result};
use nodeclip_engine::{
    export_subject, import_document, ClipSettings, Document, ExportSettings, ExternalResolver, Getter,
    ImportReport, ModelError, Subject,
};
use nodeclip_graph::{
    builtin_registry, DatablockKind, Handle, Library, PropValue, SocketDirection, SocketType, TreeKind,
};
use std::path::Path;

const SUBJECT: &str = "Scatter";
const TARGET: &str = "Target";

/// Library with a subject tree that uses a group, a repeat zone and an object
fn sample_library() -> Result<Library> {
    let mut library = Library::new();
    let target = library.new_datablock(TARGET, DatablockKind::Object);

    let ripple = library.new_tree("Ripple", TreeKind::Geometry);
    library.interface_new_socket(ripple, "Scale", SocketDirection::Input, SocketType::Float, None)?;
    library.interface_new_socket(ripple, "Geometry", SocketDirection::Output, SocketType::Geometry, None)?;
    let group_input = library.add_node(ripple, "GroupInput")?;
    let group_output = library.add_node(ripple, "GroupOutput")?;
    let cube = library.add_node(ripple, "Cube")?;
    library.connect(ripple, group_input, "Socket_0", cube, "Vertices X")?;
    library.connect(ripple, cube, "Mesh", group_output, "Socket_1")?;

    let tree = library.new_tree(SUBJECT, TreeKind::Geometry);
    let info = library.add_node(tree, "ObjectInfo")?;
    library.set_datablock(tree, info, Some(target))?;
    let group = library.add_node(tree, "Group")?;
    library.set_group_tree(tree, group, Some(ripple))?;
    let join = library.add_node(tree, "Join")?;
    library.connect(tree, group, "Socket_1", join, "Geometry")?;
    library.connect(tree, info, "Geometry", join, "Geometry")?;

    let repeat_in = library.add_node(tree, "RepeatInput")?;
    let repeat_out = library.add_node(tree, "RepeatOutput")?;
    library.pair_zone(tree, repeat_in, repeat_out)?;
    library.connect(tree, join, "Geometry", repeat_in, "Item_0")?;
    library.connect(tree, repeat_in, "Item_0", repeat_out, "Item_0")?;

    let math = library.add_node(tree, "Math")?;
    library.set_node_property(tree, math, "operation", PropValue::Enum("MULTIPLY".to_owned()))?;
    library.connect(tree, math, "Value", group, "Socket_0")?;
    let frame = library.add_node(tree, "Frame")?;
    library.set_node_parent(tree, math, Some(frame))?;
    library.set_active_node(tree, Some(join))?;
    Ok(library)
}

/// Export the sample subject and describe its object references
pub fn copy_sample(settings: &ExportSettings) -> Result<Document> {
    let library = sample_library()?;
    let mut document = export_subject(&library, &builtin_registry(), settings, &Subject::Tree(SUBJECT.to_owned()))?;
    let objects: Vec<u64> = document
        .external
        .iter()
        .filter(|(_, entry)| entry.fixed_type_name == DatablockKind::Object.type_name())
        .map(|(id, _)| *id)
        .collect();
    document.set_external_descriptions(objects.into_iter().map(|id| (id, format!("object '{TARGET}'"))))?;
    Ok(document)
}

fn object_getter(name: &'static str) -> Getter<Library> {
    Getter::new(move |library: &Library| {
        library
            .datablock_by_name(DatablockKind::Object, name)
            .map(|d| Handle::Datablock(d.id))
            .ok_or_else(|| ModelError::Stale(format!("object '{name}' does not exist")))
    })
}

/// Paste a document, pointing described objects at the library's own objects
fn paste(library: &mut Library, document: &Document, settings: &ClipSettings) -> Result<ImportReport> {
    let mut externals = ExternalResolver::new();
    for (id, entry) in &document.external {
        if entry.description.is_some() {
            externals.provide(*id, object_getter(TARGET));
        }
    }
    Ok(import_document(library, &builtin_registry(), document, &settings.import, externals)?)
}

fn print_report(label: &str, report: &ImportReport) {
    println!("{label}: pasted {} tree(s) as '{}'", report.trees_imported, report.subject);
    if let Some((from, to)) = &report.renamed_subject {
        println!("  subject renamed: {from} -> {to}");
    }
    for (from, to) in &report.renamed_trees {
        println!("  tree renamed:    {from} -> {to}");
    }
}

/// Copy the sample, round-trip it through text and paste it twice
pub fn run(settings: &ClipSettings, save: Option<&Path>) -> Result<()> {
    let export = &settings.export;
    let document = copy_sample(export)?;
    let text = document.to_text(export.compress, export.indent)?;
    tracing::info!(
        "Copied '{SUBJECT}': {} tree(s), {} object(s), {} bytes",
        document.trees.len(),
        document.object_count(),
        text.len()
    );
    if let Some(path) = save {
        std::fs::write(path, &text).with_context(|| format!("writing {}", path.display()))?;
    }

    let document = Document::from_text(&text)?;
    let mut target = Library::new();
    target.new_datablock(TARGET, DatablockKind::Object);

    let first = paste(&mut target, &document, settings)?;
    print_report("first paste", &first);
    let second = paste(&mut target, &document, settings)?;
    print_report("second paste", &second);

    let pasted = target
        .tree_by_name(&second.subject)
        .with_context(|| format!("tree '{}' missing after paste", second.subject))?;
    println!(
        "'{}' has {} nodes and {} links",
        pasted.name,
        pasted.node_count(),
        pasted.link_count()
    );
    Ok(())
}
