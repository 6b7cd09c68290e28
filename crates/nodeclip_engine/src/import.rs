// SPDX-License-Identifier: MIT OR Apache-2.0
//! Importer: applies a [`Document`] to a live model.
//!
//! Objects are reached through [`Getter`]s. Every serialized identity is bound
//! to the getter of the object it was imported into, so later pointers can be
//! resolved. Operations that depend on state built later in the tree are queued
//! in a [`Phase`] and run when that phase is drained.

use crate::document::{Document, FORMAT_VERSION};
use crate::error::{Error, Result, WithPath};
use crate::getter::{Binding, Getter};
use crate::path::PathTrail;
use crate::reflect::{ObjectModel, Property, PropertyDescriptor, PropertyKind, RuntimeType, Scalar};
use crate::registry::HandlerRegistry;
use crate::settings::ImportSettings;
use crate::value::{DataValue, ObjectData, SerializedObject};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Ordering point for deferred import work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// After a tree's interface and nodes exist, before its links are created
    AfterStructureBeforeLinks,
    /// After a tree's links exist
    AfterLinks,
    /// After everything that determines enum domains, at the end of each tree
    AfterEnumDomain,
}

impl Phase {
    /// All phases in drain order
    pub const ALL: [Phase; 3] = [
        Phase::AfterStructureBeforeLinks,
        Phase::AfterLinks,
        Phase::AfterEnumDomain,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AfterStructureBeforeLinks => "after-structure-before-links",
            Self::AfterLinks => "after-links",
            Self::AfterEnumDomain => "after-enum-domain",
        })
    }
}

/// A queued import operation
pub type Deferred<M> = Box<dyn FnOnce(&mut Importer<'_, M>) -> Result<()>>;

/// Context handed to an import handler
pub struct ImportCx<'d, M: ObjectModel> {
    /// Re-derives the object being imported
    pub getter: Getter<M>,
    /// Its serialized form
    pub object: &'d SerializedObject,
    /// The type whose properties the handler is responsible for
    pub assumed: Option<String>,
    /// Its runtime type
    pub runtime_type: RuntimeType,
    /// Diagnostic path
    pub path: PathTrail,
}

impl<'d, M: ObjectModel> ImportCx<'d, M> {
    /// Serialized property map
    pub fn data(&self) -> &'d ObjectData {
        &self.object.data
    }
}

/// Compare document and host versions.
///
/// A mismatch is an error unless explicitly allowed, in which case it is logged.
pub fn check_version(document: &Document, host_version: &str, allow_mismatch: bool) -> Result<()> {
    let mut problems = Vec::new();
    if document.host_version != host_version {
        problems.push(format!(
            "host version {} differs from {}",
            document.host_version, host_version
        ));
    }
    if document.format_version != FORMAT_VERSION {
        problems.push(format!(
            "format version {} differs from {}",
            document.format_version, FORMAT_VERSION
        ));
    }
    if problems.is_empty() {
        return Ok(());
    }
    let message = format!("Version mismatch: {}", problems.join("; "));
    if allow_mismatch {
        tracing::warn!("{message}");
        Ok(())
    } else {
        Err(Error::VersionMismatch(message))
    }
}

/// Import state for one document
pub struct Importer<'a, M: ObjectModel> {
    model: &'a mut M,
    registry: &'a HandlerRegistry<M>,
    settings: ImportSettings,
    bindings: HashMap<u64, Binding<M>>,
    queues: HashMap<Phase, VecDeque<Deferred<M>>>,
    current_tree: Option<Getter<M>>,
}

impl<'a, M: ObjectModel> Importer<'a, M> {
    /// Create an importer with pre-bound external identities
    pub fn new(
        model: &'a mut M,
        registry: &'a HandlerRegistry<M>,
        settings: ImportSettings,
        bindings: HashMap<u64, Binding<M>>,
    ) -> Self {
        Self {
            model,
            registry,
            settings,
            bindings,
            queues: HashMap::new(),
            current_tree: None,
        }
    }

    /// Read access to the model
    pub fn model(&self) -> &M {
        &*self.model
    }

    /// Write access to the model
    pub fn model_mut(&mut self) -> &mut M {
        &mut *self.model
    }

    /// The active settings
    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Getter of the tree being imported
    pub fn current_tree(&self) -> Option<Getter<M>> {
        self.current_tree.clone()
    }

    /// Set the tree being imported
    pub fn set_current_tree(&mut self, tree: Option<Getter<M>>) {
        self.current_tree = tree;
    }

    /// Import a top-level tree and drain the enum-domain phase afterwards
    pub fn import_tree(&mut self, getter: Getter<M>, object: &SerializedObject, path: &PathTrail) -> Result<()> {
        self.current_tree = Some(getter.clone());
        self.import_obj(getter, object, path, false)?;
        self.drain(Phase::AfterEnumDomain)?;
        self.ensure_drained(&[Phase::AfterStructureBeforeLinks, Phase::AfterLinks])?;
        self.current_tree = None;
        Ok(())
    }

    /// Apply one serialized object: fallback for unhandled properties, then the handler
    pub fn import_obj(
        &mut self,
        getter: Getter<M>,
        object: &SerializedObject,
        path: &PathTrail,
        is_collection: bool,
    ) -> Result<()> {
        let registry = self.registry;
        let obj = getter.get(self.model).at(path)?;
        let ty = self.model.runtime_type(&obj).at(path)?;
        let resolved = registry.resolve_import(self.model.schema(), &ty).at(path)?;
        if is_collection && resolved.handler.is_none() {
            if let RuntimeType::Typed(name) = &ty {
                return Err(Error::handler_needed(
                    name.clone(),
                    "collections must be handled *specifically*",
                    path,
                ));
            }
        }

        self.register(object.identity, getter.clone(), path)?;

        for prop in self.unhandled_properties(&ty, resolved.assumed.as_deref(), path)? {
            self.fallback_property(&getter, &ty, &prop, object, path)?;
        }

        if let Some(handler) = resolved.handler {
            let cx = ImportCx {
                getter,
                object,
                assumed: resolved.assumed,
                runtime_type: ty,
                path: path.clone(),
            };
            handler(self, &cx)?;
        }
        Ok(())
    }

    fn register(&mut self, identity: u64, getter: Getter<M>, path: &PathTrail) -> Result<()> {
        if self.bindings.contains_key(&identity) {
            return Err(Error::DoubleRegistration {
                identity,
                path: path.to_string(),
            });
        }
        self.bindings.insert(identity, Binding::Live(getter));
        Ok(())
    }

    /// What an identity is bound to
    pub fn resolve(&self, identity: u64, path: &PathTrail) -> Result<Binding<M>> {
        self.bindings
            .get(&identity)
            .cloned()
            .ok_or_else(|| Error::UnresolvedIdentity {
                identity,
                path: path.to_string(),
            })
    }

    /// Resolve an identity straight to a live handle; `None` for skipped externals
    pub fn resolve_handle(&self, identity: u64, path: &PathTrail) -> Result<Option<M::Handle>> {
        match self.resolve(identity, path)? {
            Binding::Live(getter) => getter.get(self.model).map(Some).at(path),
            Binding::Null => Ok(None),
        }
    }

    fn unhandled_properties(
        &self,
        ty: &RuntimeType,
        assumed: Option<&str>,
        path: &PathTrail,
    ) -> Result<Vec<PropertyDescriptor>> {
        let schema = self.model.schema();
        let all = schema
            .properties_of_runtime(ty)
            .ok_or_else(|| Error::schema(format!("unknown type {ty}"), path))?;
        let handled = match assumed {
            Some(name) => schema
                .properties_of(name)
                .ok_or_else(|| Error::schema(format!("unknown type {name}"), path))?,
            None => Vec::new(),
        };
        Ok(all
            .into_iter()
            .filter(|p| Some(p.identifier.as_str()) != M::SELF_DESCRIPTOR)
            .filter(|p| !handled.iter().any(|h| h.identifier == p.identifier))
            .cloned()
            .collect())
    }

    fn fallback_property(
        &mut self,
        getter: &Getter<M>,
        ty: &RuntimeType,
        prop: &PropertyDescriptor,
        object: &SerializedObject,
        path: &PathTrail,
    ) -> Result<()> {
        if self.registry.is_forbidden(&prop.identifier) {
            return Ok(());
        }
        if prop.is_simple() && prop.is_readonly {
            return Ok(());
        }
        let prop_path = path.add_property(prop);
        let Some(value) = object.data.get(&prop.identifier) else {
            return match &prop.kind {
                PropertyKind::Simple(_) => Ok(()),
                PropertyKind::Pointer { .. } if !prop.is_readonly => Ok(()),
                _ => Err(Error::schema(
                    format!("{ty} is missing '{}' in the serialized data", prop.identifier),
                    &prop_path,
                )),
            };
        };
        self.import_property(getter, prop, value, &prop_path)
    }

    /// Apply one serialized value to a property
    pub fn import_property(
        &mut self,
        getter: &Getter<M>,
        prop: &PropertyDescriptor,
        value: &DataValue,
        path: &PathTrail,
    ) -> Result<()> {
        match &prop.kind {
            PropertyKind::Simple(_) => {
                if prop.is_readonly {
                    return Err(Error::schema(
                        format!("cannot import read-only property '{}'", prop.identifier),
                        path,
                    ));
                }
                let scalar = Scalar::from_data(prop, value).ok_or_else(|| {
                    Error::schema(format!("value {value:?} does not fit '{}'", prop.identifier), path)
                })?;
                let obj = getter.get(self.model).at(path)?;
                self.model
                    .set(&obj, &prop.identifier, Property::Scalar(scalar))
                    .at(path)
            }
            PropertyKind::Pointer { .. } => self.import_pointer(getter, prop, value, path),
            PropertyKind::Collection { .. } => {
                let Some(serialized) = value.as_object() else {
                    return Err(Error::schema("expected a serialized collection", path));
                };
                self.import_collection(getter.property(prop.identifier.clone()), serialized, path)
            }
        }
    }

    fn import_pointer(
        &mut self,
        getter: &Getter<M>,
        prop: &PropertyDescriptor,
        value: &DataValue,
        path: &PathTrail,
    ) -> Result<()> {
        let obj = getter.get(self.model).at(path)?;
        match value {
            DataValue::Null => {
                if prop.is_readonly {
                    return match self.model.get(&obj, &prop.identifier).at(path)? {
                        Property::Pointer(None) => Ok(()),
                        _ => Err(Error::schema(
                            "read-only pointer is set but the serialized value is null",
                            path,
                        )),
                    };
                }
                self.model
                    .set(&obj, &prop.identifier, Property::Pointer(None))
                    .at(path)
            }
            DataValue::Object(serialized) => {
                if let Property::Pointer(None) = self.model.get(&obj, &prop.identifier).at(path)? {
                    return Err(Error::schema("inlined pointer target does not exist", path));
                }
                self.import_obj(getter.property(prop.identifier.clone()), serialized, path, false)
            }
            other => {
                let Some(identity) = other.as_identity() else {
                    return Err(Error::schema(format!("invalid pointer value {other:?}"), path));
                };
                if prop.is_readonly {
                    return Err(Error::schema(
                        format!("read-only pointer '{}' cannot be assigned", prop.identifier),
                        path,
                    ));
                }
                let target = self.resolve_handle(identity, path)?;
                self.model
                    .set(&obj, &prop.identifier, Property::Pointer(target))
                    .at(path)
            }
        }
    }

    /// Import a serialized collection: wrapper first, then a length check, then items
    pub fn import_collection(
        &mut self,
        wrapper: Getter<M>,
        serialized: &SerializedObject,
        path: &PathTrail,
    ) -> Result<()> {
        self.import_obj(wrapper.clone(), serialized, path, true)?;

        let items = serialized.items().unwrap_or_default();
        let collection = wrapper.get(self.model).at(path)?;
        let live = self.model.collection_len(&collection).at(path)?;
        if live != items.len() {
            return Err(Error::schema(
                format!(
                    "expected {} items to be ready but the collection has {live}",
                    items.len()
                ),
                path,
            ));
        }

        for (index, item) in items.iter().enumerate() {
            let Some(item) = item.as_object() else {
                return Err(Error::schema(format!("item {index} is not an object"), path));
            };
            let item_path = path.add_index(index, item.str("name"));
            self.import_obj(wrapper.index(index), item, &item_path, false)?;
        }
        Ok(())
    }

    /// Import a named property from the handler's serialized data
    pub fn import_named(&mut self, cx: &ImportCx<'_, M>, identifier: &str) -> Result<()> {
        let prop = self.descriptor(&cx.runtime_type, identifier, &cx.path)?;
        let path = cx.path.add_property(&prop);
        let Some(value) = cx.data().get(identifier) else {
            return Err(Error::schema(format!("'{identifier}' missing from the serialized data"), &path));
        };
        self.import_property(&cx.getter, &prop, value, &path)
    }

    /// Import an explicit list of properties
    pub fn import_properties(&mut self, cx: &ImportCx<'_, M>, identifiers: &[&str]) -> Result<()> {
        for identifier in identifiers {
            self.import_named(cx, identifier)?;
        }
        Ok(())
    }

    /// Import every writable simple property of the assumed type present in the data
    pub fn import_all_simple_properties(&mut self, cx: &ImportCx<'_, M>, skip: &[&str]) -> Result<()> {
        let Some(assumed) = cx.assumed.as_deref() else {
            return Ok(());
        };
        let props: Vec<PropertyDescriptor> = self
            .model
            .schema()
            .properties_of(assumed)
            .ok_or_else(|| Error::schema(format!("unknown type {assumed}"), &cx.path))?
            .into_iter()
            .filter(|p| p.is_simple() && !p.is_readonly)
            .filter(|p| Some(p.identifier.as_str()) != M::SELF_DESCRIPTOR)
            .filter(|p| !self.registry.is_forbidden(&p.identifier))
            .filter(|p| !skip.contains(&p.identifier.as_str()))
            .cloned()
            .collect();
        for prop in props {
            if let Some(value) = cx.data().get(&prop.identifier) {
                let path = cx.path.add_property(&prop);
                self.import_property(&cx.getter, &prop, value, &path)?;
            }
        }
        Ok(())
    }

    /// Simple properties plus an explicit list
    pub fn import_all_simple_properties_and(
        &mut self,
        cx: &ImportCx<'_, M>,
        identifiers: &[&str],
    ) -> Result<()> {
        self.import_all_simple_properties(cx, &[])?;
        self.import_properties(cx, identifiers)
    }

    fn descriptor(&self, ty: &RuntimeType, identifier: &str, path: &PathTrail) -> Result<PropertyDescriptor> {
        let RuntimeType::Typed(name) = ty else {
            return Err(Error::schema(format!("untyped collection has no property '{identifier}'"), path));
        };
        self.model
            .schema()
            .property(name, identifier)
            .cloned()
            .ok_or_else(|| Error::schema(format!("{name} has no property '{identifier}'"), path))
    }

    /// Queue an operation for a phase
    pub fn defer(&mut self, phase: Phase, op: impl FnOnce(&mut Importer<'_, M>) -> Result<()> + 'static) {
        self.queues.entry(phase).or_default().push_back(Box::new(op));
    }

    /// Number of operations queued for a phase
    pub fn pending(&self, phase: Phase) -> usize {
        self.queues.get(&phase).map_or(0, VecDeque::len)
    }

    /// Run every operation queued for a phase, in insertion order.
    ///
    /// Operations queued for the same phase while it drains are left for the
    /// end-of-tree check.
    pub fn drain(&mut self, phase: Phase) -> Result<()> {
        let ops = self.queues.remove(&phase).unwrap_or_default();
        if !ops.is_empty() {
            tracing::trace!("Draining {} operation(s) in phase {phase}", ops.len());
        }
        for op in ops {
            op(self)?;
        }
        Ok(())
    }

    /// Fail if any of the phases still holds operations
    pub fn ensure_drained(&self, phases: &[Phase]) -> Result<()> {
        for phase in phases {
            let count = self.pending(*phase);
            if count > 0 {
                return Err(Error::UndrainedPhase { phase: *phase, count });
            }
        }
        Ok(())
    }

    /// Standard tree import: structure, then the structure phase, then links,
    /// then the links phase
    pub fn import_staged_tree(
        &mut self,
        cx: &ImportCx<'_, M>,
        structure: &[&str],
        links: &[&str],
    ) -> Result<()> {
        self.import_properties(cx, structure)?;
        self.drain(Phase::AfterStructureBeforeLinks)?;
        self.import_properties(cx, links)?;
        self.drain(Phase::AfterLinks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::Exporter;
    use crate::external::{check_binding_types, ExternalResolver};
    use crate::settings::ExportSettings;
    use crate::testing::{registry, MockHandle, MockModel, Slot};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Source model: items a -> b (forward pointer), both pointing at a blob
    fn source() -> (MockModel, usize) {
        let mut model = MockModel::new();
        let tree = model.add_tree("Tree");
        let a = model.add_item(tree, "a");
        let b = model.add_item(tree, "b");
        let blob = model.add_blob("Blob");
        model.set_slot(a, "target", Slot::Pointer(Some(b)));
        model.set_slot(a, "value", Slot::Scalar(Scalar::Int(3)));
        model.set_slot(b, "blob", Slot::Pointer(Some(blob)));
        model.set_slot(tree, "favorite", Slot::Pointer(Some(b)));
        (model, tree)
    }

    fn exported() -> Document {
        let (model, tree) = source();
        let registry = registry(true);
        let settings = ExportSettings::default();
        let doc = Exporter::new(&model, &registry, &settings)
            .export(&[MockHandle::Obj(tree)])
            .unwrap();
        Document::from_text(&doc.to_text(true, 0).unwrap()).unwrap()
    }

    fn import_into(
        model: &mut MockModel,
        registry: &HandlerRegistry<MockModel>,
        doc: &Document,
        bindings: HashMap<u64, Binding<MockModel>>,
    ) -> Result<usize> {
        let tree = model.add_tree("Target");
        let mut importer = Importer::new(model, registry, ImportSettings::default(), bindings);
        importer.import_tree(
            Getter::fixed(MockHandle::Obj(tree)),
            &doc.trees[0],
            &PathTrail::root("Tree"),
        )?;
        importer.ensure_drained(&Phase::ALL)?;
        Ok(tree)
    }

    #[test]
    fn test_roundtrip_through_text() {
        let doc = exported();
        let ext_id = *doc.external.keys().next().unwrap();

        let mut model = MockModel::new();
        let blob = model.add_blob("Local blob");
        let mut resolver = ExternalResolver::new();
        resolver.provide(ext_id, Getter::fixed(MockHandle::Obj(blob)));
        let bindings = resolver.bind(&doc).unwrap();

        let tree = import_into(&mut model, &registry(true), &doc, bindings).unwrap();

        let items = model.items(tree);
        assert_eq!(items.len(), 2);
        let (a, b) = (items[0], items[1]);
        assert_eq!(model.scalar(a, "name"), Some(&Scalar::String("a".into())));
        assert_eq!(model.scalar(a, "value"), Some(&Scalar::Int(3)));
        assert_eq!(model.pointer(a, "target"), Some(b));
        assert_eq!(model.pointer(b, "blob"), Some(blob));
        assert_eq!(model.pointer(tree, "favorite"), Some(b));
        assert_eq!(model.scalar(tree, "name"), Some(&Scalar::String("Tree".into())));
    }

    #[test]
    fn test_forward_pointer_without_deferral_fails() {
        let doc = exported();
        let mut model = MockModel::new();
        let bindings = ExternalResolver::new().bind(&doc).unwrap();

        let err = import_into(&mut model, &registry(false), &doc, bindings).unwrap_err();
        let message = err.to_string();
        let Error::UnresolvedIdentity { identity, .. } = err else {
            panic!("unexpected error: {message}");
        };
        let items = doc.trees[0].get("items").and_then(DataValue::as_object).unwrap();
        let b = items.items().unwrap()[1].as_object().unwrap();
        assert_eq!(identity, b.identity);
        assert!(message.contains("not deserialized or provided yet"));
        assert!(message.contains("POINTER (target)"));
    }

    #[test]
    fn test_described_external_needs_getter() {
        let mut doc = exported();
        let ext_id = *doc.external.keys().next().unwrap();
        doc.set_external_descriptions([(ext_id, "shared blob")]).unwrap();

        let err = ExternalResolver::<MockModel>::new().bind(&doc).unwrap_err();
        assert!(matches!(err, Error::MissingExternal { external_id, .. } if external_id == ext_id));
    }

    #[test]
    fn test_chooser_picks_getter_from_entry_type() {
        let mut doc = exported();
        let ext_id = *doc.external.keys().next().unwrap();
        doc.set_external_descriptions([(ext_id, "shared blob")]).unwrap();

        let mut model = MockModel::new();
        let blob = model.add_blob("Local blob");
        let mut resolver = ExternalResolver::new();
        resolver.choose_with(move |entry| (entry.fixed_type_name == "Blob").then(|| Getter::fixed(MockHandle::Obj(blob))));
        let bindings = resolver.bind(&doc).unwrap();
        check_binding_types(&model, &doc, &bindings).unwrap();

        let tree = import_into(&mut model, &registry(true), &doc, bindings).unwrap();
        let b = model.items(tree)[1];
        assert_eq!(model.pointer(b, "blob"), Some(blob));
    }

    #[test]
    fn test_getter_of_wrong_type_is_rejected() {
        let doc = exported();
        let ext_id = *doc.external.keys().next().unwrap();

        let mut model = MockModel::new();
        let tree = model.add_tree("Elsewhere");
        let item = model.add_loose_item(tree, "not a blob");
        let mut resolver = ExternalResolver::new();
        resolver.provide(ext_id, Getter::fixed(MockHandle::Obj(item)));
        let bindings = resolver.bind(&doc).unwrap();

        let err = check_binding_types(&model, &doc, &bindings).unwrap_err();
        match err {
            Error::ExternalTypeMismatch { external_id, expected, found } => {
                assert_eq!(external_id, ext_id);
                assert_eq!(expected, "Blob");
                assert_eq!(found, "Item");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undescribed_external_clears_pointer() {
        let doc = exported();
        let mut model = MockModel::new();
        let bindings = ExternalResolver::new().bind(&doc).unwrap();

        let tree = import_into(&mut model, &registry(true), &doc, bindings).unwrap();
        let b = model.items(tree)[1];
        assert_eq!(model.pointer(b, "blob"), None);
    }

    #[test]
    fn test_duplicate_identity_is_fatal() {
        let mut doc = exported();
        let dup = doc.trees[0].identity;
        if let Some(DataValue::Object(items)) = doc.trees[0].data.get_mut("items") {
            items.identity = dup;
        }
        let mut model = MockModel::new();
        let bindings = ExternalResolver::new().bind(&doc).unwrap();

        let err = import_into(&mut model, &registry(true), &doc, bindings).unwrap_err();
        assert!(matches!(err, Error::DoubleRegistration { identity, .. } if identity == dup));
    }

    #[test]
    fn test_collection_count_mismatch() {
        let doc = exported();
        let mut model = MockModel::new();
        let mut registry = registry(true);
        // Creates nothing, so the wrapper stays empty
        registry.register_collection_import("Item", |_, _| Ok(()));
        let bindings = ExternalResolver::new().bind(&doc).unwrap();

        let err = import_into(&mut model, &registry, &doc, bindings).unwrap_err();
        assert!(err.to_string().contains("expected 2 items to be ready"));
    }

    #[test]
    fn test_typed_collection_without_handler() {
        let mut source = MockModel::new().with_pool();
        let tree = source.add_tree("Tree");
        let mut registry = registry(true);
        registry.register_export("Blob", |exporter, cx| exporter.export_all_simple_properties(cx));
        let settings = ExportSettings::default();
        let doc = Exporter::new(&source, &registry, &settings)
            .export(&[MockHandle::Obj(tree)])
            .unwrap();

        registry.register_import("Tree", |imp, cx| {
            imp.import_staged_tree(cx, &["pool"], &[])
        });
        let mut target = MockModel::new().with_pool();
        let err = import_into(&mut target, &registry, &doc, HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("collections must be handled *specifically*"));
    }

    #[test]
    fn test_drain_order_is_fifo() {
        let mut model = MockModel::new();
        let registry = registry(true);
        let mut importer = Importer::new(&mut model, &registry, ImportSettings::default(), HashMap::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        for step in 0..3 {
            let log = Rc::clone(&log);
            importer.defer(Phase::AfterLinks, move |_| {
                log.borrow_mut().push(step);
                Ok(())
            });
        }
        assert_eq!(importer.pending(Phase::AfterLinks), 3);
        importer.drain(Phase::AfterLinks).unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(importer.ensure_drained(&Phase::ALL).is_ok());
    }

    #[test]
    fn test_same_phase_deferral_is_reported() {
        let mut model = MockModel::new();
        let registry = registry(true);
        let mut importer = Importer::new(&mut model, &registry, ImportSettings::default(), HashMap::new());

        importer.defer(Phase::AfterEnumDomain, |imp| {
            imp.defer(Phase::AfterEnumDomain, |_| Ok(()));
            Ok(())
        });
        importer.drain(Phase::AfterEnumDomain).unwrap();
        let err = importer.ensure_drained(&Phase::ALL).unwrap_err();
        assert!(matches!(
            err,
            Error::UndrainedPhase { phase: Phase::AfterEnumDomain, count: 1 }
        ));
    }

    #[test]
    fn test_version_check() {
        let doc = exported();
        assert!(check_version(&doc, "1.0", false).is_ok());

        let err = check_version(&doc, "2.0", false).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch(ref m) if m.contains("1.0") && m.contains("2.0")));
        assert!(check_version(&doc, "2.0", true).is_ok());
    }
}
