// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exporter: walks live trees and produces a [`Document`].
//!
//! Each object gets a fresh identity. Pointers are inlined only when they are
//! read-only and point inside the tree being exported; every other pointer
//! becomes a placeholder that the post-pass rewrites to an internal identity
//! or to an external ledger entry.

use crate::document::{Document, FORMAT_VERSION};
use crate::error::{Error, Result, WithPath};
use crate::external::{ExternalEntry, PointerSite};
use crate::path::PathTrail;
use crate::reflect::{ObjectModel, Property, PropertyDescriptor, PropertyKind, RuntimeType};
use crate::registry::HandlerRegistry;
use crate::settings::ExportSettings;
use crate::value::{merge_no_clobber, no_clobber, DataValue, ObjectData, Reference, SerializedObject, ITEMS_KEY};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};

/// Context handed to an export handler
pub struct ExportCx<M: ObjectModel> {
    /// The object being exported
    pub obj: M::Handle,
    /// Its runtime type
    pub runtime_type: RuntimeType,
    /// The type whose properties the handler is responsible for
    pub assumed: Option<String>,
    /// Diagnostic path
    pub path: PathTrail,
}

struct PendingSite {
    slot: usize,
    fixed_type: String,
    site: PointerSite,
}

/// Export state for one document
pub struct Exporter<'a, M: ObjectModel> {
    model: &'a M,
    registry: &'a HandlerRegistry<M>,
    settings: &'a ExportSettings,
    next_id: u64,
    serialized: HashMap<M::Key, u64>,
    pointers: IndexMap<M::Key, Vec<PendingSite>>,
    slots: usize,
    current_tree: Option<M::Key>,
}

impl<'a, M: ObjectModel> Exporter<'a, M> {
    /// Create an exporter
    pub fn new(model: &'a M, registry: &'a HandlerRegistry<M>, settings: &'a ExportSettings) -> Self {
        Self {
            model,
            registry,
            settings,
            next_id: 0,
            serialized: HashMap::new(),
            pointers: IndexMap::new(),
            slots: 0,
            current_tree: None,
        }
    }

    /// The model being exported
    pub fn model(&self) -> &'a M {
        self.model
    }

    /// The active settings
    pub fn settings(&self) -> &'a ExportSettings {
        self.settings
    }

    /// Export trees in order and resolve all pointers.
    ///
    /// Each root is a top-level tree; its canonical key bounds which read-only
    /// pointers may be inlined while it is being walked.
    pub fn export(mut self, roots: &[M::Handle]) -> Result<Document> {
        let mut trees = Vec::with_capacity(roots.len());
        for root in roots {
            let ty = self.model.runtime_type(root).at(&PathTrail::default())?;
            let label = match self.model.display_name(root) {
                Some(name) => format!("{ty} ({name})"),
                None => ty.to_string(),
            };
            tracing::debug!("Exporting {label}");
            self.current_tree = Some(self.model.canonical_key(root));
            trees.push(self.export_obj(root, &PathTrail::root(label), false)?);
        }
        self.current_tree = None;

        let external = self.resolve_pointers(&mut trees);
        tracing::info!(
            "Exported {} tree(s), {} object(s), {} external item(s)",
            trees.len(),
            self.serialized.len(),
            external.len()
        );
        Ok(Document {
            host_version: self.model.host_version(),
            format_version: FORMAT_VERSION.to_owned(),
            subject_name: None,
            trees,
            external,
        })
    }

    /// Serialize one object: identity, handler output, then the generic fallback
    pub fn export_obj(
        &mut self,
        obj: &M::Handle,
        path: &PathTrail,
        is_collection: bool,
    ) -> Result<SerializedObject> {
        let model = self.model;
        let registry = self.registry;
        let ty = model.runtime_type(obj).at(path)?;
        let resolved = registry.resolve_export(model.schema(), &ty).at(path)?;

        let key = model.canonical_key(obj);
        if self.serialized.contains_key(&key) {
            return Err(Error::DoubleSerialization {
                path: path.to_string(),
            });
        }
        let identity = self.next_id;
        self.next_id += 1;
        self.serialized.insert(key, identity);

        let cx = ExportCx {
            obj: obj.clone(),
            runtime_type: ty.clone(),
            assumed: resolved.assumed.clone(),
            path: path.clone(),
        };
        let mut data = match resolved.handler {
            Some(handler) => handler(self, &cx)?,
            None => ObjectData::new(),
        };

        for prop in self.unhandled_properties(&ty, resolved.assumed.as_deref(), path)? {
            if let Some(value) = self.fallback_property(obj, &ty, &prop, path, is_collection)? {
                no_clobber(&mut data, prop.identifier.clone(), value, path)?;
            }
        }

        let path = self.settings.write_paths.then(|| path.to_string());
        Ok(SerializedObject {
            identity,
            data,
            path,
        })
    }

    /// Properties of the runtime type not declared by the assumed type
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
        obj: &M::Handle,
        ty: &RuntimeType,
        prop: &PropertyDescriptor,
        path: &PathTrail,
        is_collection: bool,
    ) -> Result<Option<DataValue>> {
        if self.registry.is_forbidden(&prop.identifier) {
            return Ok(None);
        }
        let prop_path = path.add_property(prop);
        match &prop.kind {
            PropertyKind::Simple(_) => {
                if prop.is_readonly {
                    return Ok(None);
                }
                self.export_simple(obj, prop, &prop_path)
            }
            PropertyKind::Pointer { .. } => {
                let Property::Pointer(target) = self.model.get(obj, &prop.identifier).at(&prop_path)? else {
                    return Err(Error::schema("expected a pointer", &prop_path));
                };
                let Some(target) = target else {
                    return Ok(Some(DataValue::Null));
                };
                if prop.is_readonly && !self.is_in_current_tree(&target) {
                    return Err(Error::handler_needed(
                        ty.to_string(),
                        "readonly pointer to external",
                        &prop_path,
                    ));
                }
                self.export_pointer(obj, prop, &prop_path).map(Some)
            }
            PropertyKind::Collection { element_type } => {
                let wrapper_mutates = match self.model.get(obj, &prop.identifier).at(&prop_path)? {
                    Property::Collection(wrapper) => {
                        match self.model.runtime_type(&wrapper).at(&prop_path)? {
                            RuntimeType::Typed(name) => self
                                .model
                                .schema()
                                .get(&name)
                                .map(|info| info.has_mutating_functions)
                                .unwrap_or(false),
                            RuntimeType::Collection { .. } => false,
                        }
                    }
                    _ => return Err(Error::schema("expected a collection", &prop_path)),
                };
                if wrapper_mutates && !self.registry.has_exact_export(element_type) {
                    let reason = if is_collection {
                        "nested collection with functions and no element handler"
                    } else {
                        "collection with function that requires args and the elements aren't specifically handled"
                    };
                    return Err(Error::handler_needed(ty.to_string(), reason, &prop_path));
                }
                self.export_collection(obj, prop, &prop_path).map(Some)
            }
        }
    }

    fn is_in_current_tree(&self, target: &M::Handle) -> bool {
        match (&self.current_tree, self.model.owner_key(target)) {
            (Some(tree), Some(owner)) => *tree == owner,
            _ => false,
        }
    }

    /// Export a simple property; `None` when skipped as a default
    pub fn export_simple(
        &self,
        obj: &M::Handle,
        prop: &PropertyDescriptor,
        path: &PathTrail,
    ) -> Result<Option<DataValue>> {
        let Property::Scalar(value) = self.model.get(obj, &prop.identifier).at(path)? else {
            return Err(Error::schema("expected a simple value", path));
        };
        if self.settings.skip_defaults && prop.default.as_ref() == Some(&value) {
            return Ok(None);
        }
        Ok(Some(value.to_data()))
    }

    /// Export a pointer property: inline, null, or a placeholder for the post-pass
    pub fn export_pointer(
        &mut self,
        obj: &M::Handle,
        prop: &PropertyDescriptor,
        path: &PathTrail,
    ) -> Result<DataValue> {
        let Property::Pointer(target) = self.model.get(obj, &prop.identifier).at(path)? else {
            return Err(Error::schema("expected a pointer", path));
        };
        let Some(target) = target else {
            return Ok(DataValue::Null);
        };
        if prop.is_readonly && self.is_in_current_tree(&target) {
            let inlined = self.export_obj(&target, path, false)?;
            return Ok(DataValue::Object(Box::new(inlined)));
        }

        let PropertyKind::Pointer { fixed_type } = &prop.kind else {
            return Err(Error::schema("expected a pointer", path));
        };
        let slot = self.slots;
        self.slots += 1;
        self.pointers
            .entry(self.model.canonical_key(&target))
            .or_default()
            .push(PendingSite {
                slot,
                fixed_type: fixed_type.clone(),
                site: PointerSite {
                    path: path.to_string(),
                    identifier: prop.identifier.clone(),
                },
            });
        Ok(DataValue::Pointer(Reference::Pending(slot)))
    }

    /// Export a collection: the wrapper object plus its items
    pub fn export_collection(
        &mut self,
        obj: &M::Handle,
        prop: &PropertyDescriptor,
        path: &PathTrail,
    ) -> Result<DataValue> {
        let Property::Collection(wrapper) = self.model.get(obj, &prop.identifier).at(path)? else {
            return Err(Error::schema("expected a collection", path));
        };
        let mut serialized = self.export_obj(&wrapper, path, true)?;
        let len = self.model.collection_len(&wrapper).at(path)?;
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            let item = self.model.collection_item(&wrapper, index).at(path)?;
            let name = self.model.display_name(&item);
            let item_path = path.add_index(index, name.as_deref());
            items.push(DataValue::Object(Box::new(self.export_obj(&item, &item_path, false)?)));
        }
        no_clobber(&mut serialized.data, ITEMS_KEY, DataValue::List(items), path)?;
        Ok(DataValue::Object(Box::new(serialized)))
    }

    /// Export one named property of any kind, looked up on the runtime type.
    ///
    /// Null pointers are written as null; simple defaults may be skipped.
    pub fn export_property(&mut self, cx: &ExportCx<M>, identifier: &str) -> Result<Option<DataValue>> {
        let prop = self.descriptor(&cx.runtime_type, identifier, &cx.path)?;
        let path = cx.path.add_property(&prop);
        match prop.kind {
            PropertyKind::Simple(_) => self.export_simple(&cx.obj, &prop, &path),
            PropertyKind::Pointer { .. } => self.export_pointer(&cx.obj, &prop, &path).map(Some),
            PropertyKind::Collection { .. } => self.export_collection(&cx.obj, &prop, &path).map(Some),
        }
    }

    /// Export an explicit list of properties
    pub fn export_properties(&mut self, cx: &ExportCx<M>, identifiers: &[&str]) -> Result<ObjectData> {
        let mut data = ObjectData::new();
        for identifier in identifiers {
            if let Some(value) = self.export_property(cx, identifier)? {
                no_clobber(&mut data, *identifier, value, &cx.path)?;
            }
        }
        Ok(data)
    }

    /// Export every writable simple property the assumed type declares
    pub fn export_all_simple_properties(&mut self, cx: &ExportCx<M>) -> Result<ObjectData> {
        let mut data = ObjectData::new();
        let Some(assumed) = cx.assumed.as_deref() else {
            return Ok(data);
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
            .cloned()
            .collect();
        for prop in props {
            let path = cx.path.add_property(&prop);
            if let Some(value) = self.export_simple(&cx.obj, &prop, &path)? {
                no_clobber(&mut data, prop.identifier.clone(), value, &cx.path)?;
            }
        }
        Ok(data)
    }

    /// Simple properties plus an explicit list
    pub fn export_all_simple_properties_and(
        &mut self,
        cx: &ExportCx<M>,
        identifiers: &[&str],
    ) -> Result<ObjectData> {
        let mut data = self.export_all_simple_properties(cx)?;
        let extra = self.export_properties(cx, identifiers)?;
        merge_no_clobber(&mut data, extra, &cx.path)?;
        Ok(data)
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

    /// Rewrite placeholders: serialized targets become internal references,
    /// the rest collapse into one external entry per distinct target
    fn resolve_pointers(&mut self, trees: &mut [SerializedObject]) -> BTreeMap<u64, ExternalEntry> {
        let mut resolved = vec![None; self.slots];
        let mut external = BTreeMap::new();
        for (key, sites) in std::mem::take(&mut self.pointers) {
            let reference = match self.serialized.get(&key) {
                Some(&identity) => Reference::Internal(identity),
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    let fixed_type = sites
                        .first()
                        .map(|s| s.fixed_type.clone())
                        .unwrap_or_default();
                    let mut entry = ExternalEntry::new(id, fixed_type);
                    entry.referenced_from = sites.iter().map(|s| s.site.clone()).collect();
                    tracing::debug!("External item {id} ({}) from {} site(s)", entry.fixed_type_name, sites.len());
                    external.insert(id, entry);
                    Reference::External(id)
                }
            };
            for site in &sites {
                resolved[site.slot] = Some(reference);
            }
        }
        for tree in trees.iter_mut() {
            tree.resolve_pending(&resolved);
        }
        external
    }
}
