// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-subject export and import.
//!
//! A subject is either a named tree or a container that embeds one (such as a
//! material). Exporting a subject also exports the trees its group nodes use,
//! dependencies first, so the subject is always the last tree of a document.

use crate::document::Document;
use crate::error::{Error, Result, WithPath};
use crate::export::Exporter;
use crate::external::{check_binding_types, ExternalResolver};
use crate::getter::Getter;
use crate::import::{check_version, Importer, Phase};
use crate::path::PathTrail;
use crate::reflect::{ModelError, ObjectModel, Property, Scalar};
use crate::registry::HandlerRegistry;
use crate::settings::{ExportSettings, ImportSettings};
use crate::value::SerializedObject;
use indexmap::IndexMap;
use std::collections::HashSet;

/// What to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// A top-level tree, by name
    Tree(String),
    /// A container embedding a tree, by container name
    Container(String),
}

/// Subject-level operations a host provides on top of reflection
pub trait TreeLibrary: ObjectModel + Sized {
    /// Property holding a tree's name
    const NAME_PROPERTY: &'static str = "name";
    /// Property holding a tree's type tag
    const TYPE_TAG_PROPERTY: &'static str;

    /// Top-level tree by name
    fn find_tree(&self, name: &str) -> Option<Self::Handle>;

    /// Container by name
    fn find_container(&self, name: &str) -> Option<Self::Handle>;

    /// Tree embedded in a container
    fn container_tree(&self, container: &Self::Handle) -> Option<Self::Handle>;

    /// Trees used directly by group nodes of `tree`, in node order
    fn referenced_trees(&self, tree: &Self::Handle) -> std::result::Result<Vec<Self::Handle>, ModelError>;

    /// Whether a tree or container is owned by the current file rather than linked in
    fn is_local(&self, obj: &Self::Handle) -> bool;

    /// Create a tree; returns the name it actually received
    fn create_tree(&mut self, name: &str, type_tag: &str) -> std::result::Result<String, ModelError>;

    /// Create a container with its embedded tree; returns the name it actually received
    fn create_container(&mut self, name: &str) -> std::result::Result<String, ModelError>;

    /// Getter re-deriving a top-level tree by name
    fn tree_getter(name: String) -> Getter<Self> {
        Getter::new(move |model: &Self| {
            model
                .find_tree(&name)
                .ok_or_else(|| ModelError::Stale(format!("tree '{name}' no longer exists")))
        })
    }

    /// Getter re-deriving the tree embedded in a container
    fn container_tree_getter(name: String) -> Getter<Self> {
        Getter::new(move |model: &Self| {
            model
                .find_container(&name)
                .and_then(|container| model.container_tree(&container))
                .ok_or_else(|| ModelError::Stale(format!("container '{name}' has no tree")))
        })
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Name the subject (tree or container) ended up with
    pub subject: String,
    /// Whether the subject is a container
    pub subject_is_container: bool,
    /// Serialized and actual subject name, when the subject was renamed
    pub renamed_subject: Option<(String, String)>,
    /// Serialized name to actual name of renamed dependency trees
    pub renamed_trees: IndexMap<String, String>,
    /// Number of trees imported
    pub trees_imported: usize,
}

/// Export a subject and, if enabled, the trees it depends on
pub fn export_subject<L: TreeLibrary>(
    model: &L,
    registry: &HandlerRegistry<L>,
    settings: &ExportSettings,
    subject: &Subject,
) -> Result<Document> {
    let root_path = PathTrail::default();
    let (root, subject_name) = match subject {
        Subject::Tree(name) => (
            model
                .find_tree(name)
                .ok_or_else(|| Error::schema(format!("no tree named '{name}'"), &root_path))?,
            None,
        ),
        Subject::Container(name) => {
            let container = model
                .find_container(name)
                .ok_or_else(|| Error::schema(format!("no container named '{name}'"), &root_path))?;
            let tree = model
                .container_tree(&container)
                .ok_or_else(|| Error::schema(format!("container '{name}' has no tree"), &root_path))?;
            (tree, Some(name.clone()))
        }
    };

    let mut roots = Vec::new();
    if settings.include_subtrees {
        let mut done = HashSet::new();
        let mut visiting = HashSet::new();
        for tree in model.referenced_trees(&root).at(&root_path)? {
            collect_subtrees(model, &tree, &mut done, &mut visiting, &mut roots)?;
        }
        // The subject itself may be reachable through a cycle
        let root_key = model.canonical_key(&root);
        roots.retain(|tree| model.canonical_key(tree) != root_key);
    }
    roots.push(root);

    let mut document = Exporter::new(model, registry, settings).export(&roots)?;
    document.subject_name = subject_name;
    Ok(document)
}

fn collect_subtrees<L: TreeLibrary>(
    model: &L,
    tree: &L::Handle,
    done: &mut HashSet<L::Key>,
    visiting: &mut HashSet<L::Key>,
    out: &mut Vec<L::Handle>,
) -> Result<()> {
    let key = model.canonical_key(tree);
    if done.contains(&key) {
        return Ok(());
    }
    if !visiting.insert(key.clone()) {
        let name = model.display_name(tree).unwrap_or_default();
        return Err(Error::schema(
            format!("tree '{name}' uses itself through group nodes"),
            &PathTrail::default(),
        ));
    }
    for child in model.referenced_trees(tree).at(&PathTrail::default())? {
        collect_subtrees(model, &child, done, visiting, out)?;
    }
    visiting.remove(&key);
    done.insert(key);
    out.push(tree.clone());
    Ok(())
}

fn string_field<'o>(object: &'o SerializedObject, key: &str, path: &PathTrail) -> Result<&'o str> {
    object
        .str(key)
        .ok_or_else(|| Error::schema(format!("tree record has no '{key}'"), path))
}

/// Name for an imported tree: the existing local one when overwriting, else a fresh tree
fn prepare_tree<L: TreeLibrary>(model: &mut L, name: &str, type_tag: &str, overwrite: bool) -> Result<String> {
    if overwrite {
        if let Some(existing) = model.find_tree(name) {
            let same_kind = matches!(
                model.get(&existing, L::TYPE_TAG_PROPERTY),
                Ok(Property::Scalar(Scalar::String(ref tag))) if tag == type_tag
            );
            if model.is_local(&existing) && same_kind {
                tracing::debug!("Overwriting tree '{name}'");
                return Ok(name.to_owned());
            }
        }
    }
    model.create_tree(name, type_tag).at(&PathTrail::default())
}

fn prepare_container<L: TreeLibrary>(model: &mut L, name: &str, overwrite: bool) -> Result<String> {
    if overwrite {
        if let Some(existing) = model.find_container(name) {
            if model.is_local(&existing) && model.container_tree(&existing).is_some() {
                tracing::debug!("Overwriting container '{name}'");
                return Ok(name.to_owned());
            }
        }
    }
    model.create_container(name).at(&PathTrail::default())
}

/// Apply a document: version check, external completeness check, then every
/// tree in document order with the last one as the subject
pub fn import_document<L: TreeLibrary>(
    model: &mut L,
    registry: &HandlerRegistry<L>,
    document: &Document,
    settings: &ImportSettings,
    externals: ExternalResolver<L>,
) -> Result<ImportReport> {
    check_version(document, &model.host_version(), settings.allow_version_mismatch)?;
    let bindings = externals.bind(document)?;
    check_binding_types(&*model, document, &bindings)?;

    let root_path = PathTrail::default();
    let Some((subject, dependencies)) = document.trees.split_last() else {
        return Err(Error::schema("document has no trees", &root_path));
    };
    for tree in &document.trees {
        string_field(tree, L::NAME_PROPERTY, &root_path)?;
        string_field(tree, L::TYPE_TAG_PROPERTY, &root_path)?;
    }

    let mut report = ImportReport::default();
    let mut importer = Importer::new(model, registry, settings.clone(), bindings);

    for tree in dependencies {
        let name = string_field(tree, L::NAME_PROPERTY, &root_path)?;
        let tag = string_field(tree, L::TYPE_TAG_PROPERTY, &root_path)?;
        let actual = prepare_tree(importer.model_mut(), name, tag, settings.overwrite)?;
        if actual != name {
            report.renamed_trees.insert(name.to_owned(), actual.clone());
        }
        let path = PathTrail::root(format!("{tag} ({actual})"));
        importer.import_tree(L::tree_getter(actual), tree, &path)?;
        report.trees_imported += 1;
    }

    let name = string_field(subject, L::NAME_PROPERTY, &root_path)?;
    let tag = string_field(subject, L::TYPE_TAG_PROPERTY, &root_path)?;
    let (getter, wanted, actual) = match &document.subject_name {
        Some(container) => {
            let actual = prepare_container(importer.model_mut(), container, settings.overwrite)?;
            report.subject_is_container = true;
            (L::container_tree_getter(actual.clone()), container.as_str(), actual)
        }
        None => {
            let actual = prepare_tree(importer.model_mut(), name, tag, settings.overwrite)?;
            (L::tree_getter(actual.clone()), name, actual)
        }
    };
    if actual != wanted {
        report.renamed_subject = Some((wanted.to_owned(), actual.clone()));
    }
    let path = PathTrail::root(format!("{tag} ({actual})"));
    importer.import_tree(getter, subject, &path)?;
    report.trees_imported += 1;
    report.subject = actual;

    importer.ensure_drained(&Phase::ALL)?;
    tracing::info!(
        "Imported {} tree(s) into '{}' ({} renamed)",
        report.trees_imported,
        report.subject,
        report.renamed_trees.len() + usize::from(report.renamed_subject.is_some())
    );
    Ok(report)
}
