// SPDX-License-Identifier: MIT OR Apache-2.0
//! Small reflective object store used by the engine's unit tests.

use crate::reflect::{
    ModelError, ObjectModel, Property, PropertyDescriptor, RuntimeType, Scalar, ScalarKind, Schema,
    TypeInfo,
};
use indexmap::IndexMap;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Scalar(Scalar),
    Pointer(Option<usize>),
    Collection(Vec<usize>),
}

#[derive(Debug, Clone)]
pub(crate) struct MockObject {
    pub type_name: String,
    pub owner: usize,
    pub values: IndexMap<String, Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MockHandle {
    Obj(usize),
    Coll(usize, String),
}

/// Types: `Tree` owns an untyped `items` collection of `Item`s and a typed
/// `pool` collection of `Blob`s; `Item`s point at each other and at `Blob`s.
pub(crate) struct MockModel {
    schema: Schema,
    pub objects: Vec<MockObject>,
    typed_collections: HashMap<String, String>,
    pub version: String,
}

impl MockModel {
    pub fn new() -> Self {
        let mut schema = Schema::new();
        schema.insert(
            TypeInfo::new("Struct").with(PropertyDescriptor::pointer("rna_type", "Struct").readonly()),
        );
        schema.insert(
            TypeInfo::new("Tree")
                .extends("Struct")
                .with(PropertyDescriptor::simple("name", ScalarKind::String))
                .with(
                    PropertyDescriptor::simple("scale", ScalarKind::Float)
                        .with_default(Scalar::Float(1.0)),
                )
                .with(PropertyDescriptor::collection("items", "Item"))
                .with(PropertyDescriptor::pointer("favorite", "Item"))
                .with(PropertyDescriptor::pointer("pinned", "Item").readonly()),
        );
        schema.insert(
            TypeInfo::new("Item")
                .extends("Struct")
                .with(PropertyDescriptor::simple("name", ScalarKind::String))
                .with(
                    PropertyDescriptor::simple("value", ScalarKind::Int)
                        .with_default(Scalar::Int(0)),
                )
                .with(PropertyDescriptor::pointer("target", "Item"))
                .with(PropertyDescriptor::pointer("blob", "Blob")),
        );
        schema.insert(
            TypeInfo::new("Blob")
                .extends("Struct")
                .with(PropertyDescriptor::simple("name", ScalarKind::String)),
        );
        schema.insert(
            TypeInfo::new("Pool")
                .extends("Struct")
                .mutating(),
        );
        Self {
            schema,
            objects: Vec::new(),
            typed_collections: HashMap::new(),
            version: "1.0".into(),
        }
    }

    /// Give the `pool` property a typed wrapper with mutating functions
    pub fn with_pool(mut self) -> Self {
        if let Some(tree) = self.schema.get("Tree").cloned() {
            self.schema
                .insert(tree.with(PropertyDescriptor::collection("pool", "Blob")));
        }
        self.typed_collections.insert("pool".into(), "Pool".into());
        self
    }

    fn add(&mut self, type_name: &str, owner: Option<usize>, name: &str) -> usize {
        let index = self.objects.len();
        let mut values = IndexMap::new();
        values.insert("name".to_owned(), Slot::Scalar(Scalar::String(name.into())));
        match type_name {
            "Tree" => {
                values.insert("scale".into(), Slot::Scalar(Scalar::Float(1.0)));
                values.insert("items".into(), Slot::Collection(Vec::new()));
                values.insert("pool".into(), Slot::Collection(Vec::new()));
                values.insert("favorite".into(), Slot::Pointer(None));
                values.insert("pinned".into(), Slot::Pointer(None));
            }
            "Item" => {
                values.insert("value".into(), Slot::Scalar(Scalar::Int(0)));
                values.insert("target".into(), Slot::Pointer(None));
                values.insert("blob".into(), Slot::Pointer(None));
            }
            _ => {}
        }
        self.objects.push(MockObject {
            type_name: type_name.into(),
            owner: owner.unwrap_or(index),
            values,
        });
        index
    }

    pub fn add_tree(&mut self, name: &str) -> usize {
        self.add("Tree", None, name)
    }

    pub fn add_blob(&mut self, name: &str) -> usize {
        self.add("Blob", None, name)
    }

    /// Item owned by `tree` but not listed in any collection
    pub fn add_loose_item(&mut self, tree: usize, name: &str) -> usize {
        self.add("Item", Some(tree), name)
    }

    /// Item appended to `tree.items`
    pub fn add_item(&mut self, tree: usize, name: &str) -> usize {
        let item = self.add("Item", Some(tree), name);
        if let Some(Slot::Collection(items)) = self.objects[tree].values.get_mut("items") {
            items.push(item);
        }
        item
    }

    /// Append a new item to a collection handle
    pub fn push_item(&mut self, collection: &MockHandle) -> Result<usize, ModelError> {
        let MockHandle::Coll(owner, identifier) = collection else {
            return Err(ModelError::Rejected("not a collection".into()));
        };
        let tree = self.objects[*owner].owner;
        let element = if identifier == "pool" { "Blob" } else { "Item" };
        let item = self.add(element, Some(tree), "");
        match self.objects[*owner].values.get_mut(identifier) {
            Some(Slot::Collection(items)) => {
                items.push(item);
                Ok(item)
            }
            _ => Err(ModelError::Rejected("no such collection".into())),
        }
    }

    pub fn set_slot(&mut self, obj: usize, identifier: &str, slot: Slot) {
        self.objects[obj].values.insert(identifier.into(), slot);
    }

    pub fn scalar(&self, obj: usize, identifier: &str) -> Option<&Scalar> {
        match self.objects[obj].values.get(identifier) {
            Some(Slot::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    pub fn pointer(&self, obj: usize, identifier: &str) -> Option<usize> {
        match self.objects[obj].values.get(identifier) {
            Some(Slot::Pointer(target)) => *target,
            _ => None,
        }
    }

    pub fn items(&self, obj: usize) -> Vec<usize> {
        match self.objects[obj].values.get("items") {
            Some(Slot::Collection(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn object(&self, index: usize) -> Result<&MockObject, ModelError> {
        self.objects
            .get(index)
            .ok_or_else(|| ModelError::Stale(format!("object {index}")))
    }
}

impl ObjectModel for MockModel {
    type Handle = MockHandle;
    type Key = MockHandle;

    const SELF_DESCRIPTOR: Option<&'static str> = Some("rna_type");

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn runtime_type(&self, obj: &MockHandle) -> Result<RuntimeType, ModelError> {
        match obj {
            MockHandle::Obj(index) => Ok(RuntimeType::Typed(self.object(*index)?.type_name.clone())),
            MockHandle::Coll(_, identifier) => Ok(match self.typed_collections.get(identifier) {
                Some(wrapper) => RuntimeType::Typed(wrapper.clone()),
                None => RuntimeType::Collection {
                    element_type: "Item".into(),
                },
            }),
        }
    }

    fn canonical_key(&self, obj: &MockHandle) -> MockHandle {
        obj.clone()
    }

    fn owner_key(&self, obj: &MockHandle) -> Option<MockHandle> {
        let (MockHandle::Obj(index) | MockHandle::Coll(index, _)) = obj;
        self.objects
            .get(*index)
            .map(|o| MockHandle::Obj(o.owner))
    }

    fn get(&self, obj: &MockHandle, identifier: &str) -> Result<Property<MockHandle>, ModelError> {
        let MockHandle::Obj(index) = obj else {
            return Err(ModelError::Rejected("collections have no properties".into()));
        };
        let object = self.object(*index)?;
        match object.values.get(identifier) {
            Some(Slot::Scalar(value)) => Ok(Property::Scalar(value.clone())),
            Some(Slot::Pointer(target)) => Ok(Property::Pointer(target.map(MockHandle::Obj))),
            Some(Slot::Collection(_)) => Ok(Property::Collection(MockHandle::Coll(
                *index,
                identifier.to_owned(),
            ))),
            None => Err(ModelError::NoSuchProperty {
                type_name: object.type_name.clone(),
                identifier: identifier.to_owned(),
            }),
        }
    }

    fn set(
        &mut self,
        obj: &MockHandle,
        identifier: &str,
        value: Property<MockHandle>,
    ) -> Result<(), ModelError> {
        let MockHandle::Obj(index) = obj else {
            return Err(ModelError::Rejected("collections have no properties".into()));
        };
        let slot = match value {
            Property::Scalar(value) => Slot::Scalar(value),
            Property::Pointer(None) => Slot::Pointer(None),
            Property::Pointer(Some(MockHandle::Obj(target))) => Slot::Pointer(Some(target)),
            _ => return Err(ModelError::ReadOnly(identifier.to_owned())),
        };
        self.set_slot(*index, identifier, slot);
        Ok(())
    }

    fn collection_len(&self, collection: &MockHandle) -> Result<usize, ModelError> {
        let MockHandle::Coll(owner, identifier) = collection else {
            return Err(ModelError::Rejected("not a collection".into()));
        };
        match self.object(*owner)?.values.get(identifier) {
            Some(Slot::Collection(items)) => Ok(items.len()),
            _ => Err(ModelError::Rejected("not a collection".into())),
        }
    }

    fn collection_item(&self, collection: &MockHandle, index: usize) -> Result<MockHandle, ModelError> {
        let MockHandle::Coll(owner, identifier) = collection else {
            return Err(ModelError::Rejected("not a collection".into()));
        };
        match self.object(*owner)?.values.get(identifier) {
            Some(Slot::Collection(items)) => items
                .get(index)
                .map(|i| MockHandle::Obj(*i))
                .ok_or(ModelError::OutOfRange {
                    index,
                    len: items.len(),
                }),
            _ => Err(ModelError::Rejected("not a collection".into())),
        }
    }

    fn host_version(&self) -> String {
        self.version.clone()
    }
}

/// Registry for the mock: the tree imports in stages and collections of items
/// are created on import. With `defer_targets`, item-to-item pointers wait for
/// the structure phase.
pub(crate) fn registry(defer_targets: bool) -> crate::HandlerRegistry<MockModel> {
    use crate::{Phase, WithPath};

    let mut registry: crate::HandlerRegistry<MockModel> = crate::HandlerRegistry::new();
    registry.register_import("Tree", |imp, cx| {
        imp.import_all_simple_properties(cx, &[])?;
        imp.import_staged_tree(cx, &["items"], &["favorite", "pinned"])
    });
    registry.register_collection_import("Item", |imp, cx| {
        let collection = cx.getter.get(imp.model()).at(&cx.path)?;
        let count = cx.object.items().map_or(0, <[_]>::len);
        for _ in 0..count {
            imp.model_mut().push_item(&collection).at(&cx.path)?;
        }
        Ok(())
    });
    if defer_targets {
        registry.register_import("Item", |imp, cx| {
            imp.import_all_simple_properties(cx, &[])?;
            imp.import_properties(cx, &["blob"])?;
            let getter = cx.getter.clone();
            let value = cx.data().get("target").cloned();
            let path = cx.path.clone();
            imp.defer(Phase::AfterStructureBeforeLinks, move |imp| {
                let Some(value) = value else {
                    return Ok(());
                };
                let prop = imp.model().schema().property("Item", "target").cloned().unwrap();
                imp.import_property(&getter, &prop, &value, &path)
            });
            Ok(())
        });
    }
    registry
}
