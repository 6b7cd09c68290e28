// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handler registry and type-based dispatch.
//!
//! Handlers are keyed by type name, or by element type for untyped collections.
//! Resolution walks single-base ancestry to the nearest registered handler; a
//! type with no handled ancestor gets a no-op handler that claims no properties,
//! which leaves everything to the generic fallback.

use crate::error::{DispatchError, Result};
use crate::export::{ExportCx, Exporter};
use crate::import::{ImportCx, Importer};
use crate::reflect::{ObjectModel, RuntimeType, Schema};
use crate::value::ObjectData;
use std::collections::{HashMap, HashSet};

/// Export handler: produces the serialized data for the properties of its type
pub type ExportFn<M> = Box<dyn Fn(&mut Exporter<'_, M>, &ExportCx<M>) -> Result<ObjectData>>;

/// Import handler: applies serialized data for the properties of its type
pub type ImportFn<M> = Box<dyn Fn(&mut Importer<'_, M>, &ImportCx<'_, M>) -> Result<()>>;

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    /// A described type
    Type(String),
    /// An untyped collection with this element type
    CollectionOf(String),
}

/// Outcome of resolving a handler
pub struct Resolved<'r, F> {
    /// Type whose properties the handler takes responsibility for; `None` for
    /// the no-op handler and for untyped collections
    pub assumed: Option<String>,
    /// The handler, `None` meaning no-op
    pub handler: Option<&'r F>,
}

/// Export and import handlers of one host
pub struct HandlerRegistry<M: ObjectModel> {
    exporters: HashMap<DispatchKey, ExportFn<M>>,
    importers: HashMap<DispatchKey, ImportFn<M>>,
    forbidden: HashSet<String>,
}

impl<M: ObjectModel> HandlerRegistry<M> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            exporters: HashMap::new(),
            importers: HashMap::new(),
            forbidden: HashSet::new(),
        }
    }

    /// Register an export handler for a type
    pub fn register_export<F>(&mut self, type_name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Exporter<'_, M>, &ExportCx<M>) -> Result<ObjectData> + 'static,
    {
        self.exporters
            .insert(DispatchKey::Type(type_name.into()), Box::new(handler));
    }

    /// Register an import handler for a type
    pub fn register_import<F>(&mut self, type_name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Importer<'_, M>, &ImportCx<'_, M>) -> Result<()> + 'static,
    {
        self.importers
            .insert(DispatchKey::Type(type_name.into()), Box::new(handler));
    }

    /// Register an export handler for untyped collections of an element type
    pub fn register_collection_export<F>(&mut self, element_type: impl Into<String>, handler: F)
    where
        F: Fn(&mut Exporter<'_, M>, &ExportCx<M>) -> Result<ObjectData> + 'static,
    {
        self.exporters
            .insert(DispatchKey::CollectionOf(element_type.into()), Box::new(handler));
    }

    /// Register an import handler for untyped collections of an element type
    pub fn register_collection_import<F>(&mut self, element_type: impl Into<String>, handler: F)
    where
        F: Fn(&mut Importer<'_, M>, &ImportCx<'_, M>) -> Result<()> + 'static,
    {
        self.importers
            .insert(DispatchKey::CollectionOf(element_type.into()), Box::new(handler));
    }

    /// Exclude a property identifier from generic export and import
    pub fn forbid(&mut self, identifier: impl Into<String>) {
        self.forbidden.insert(identifier.into());
    }

    /// Whether an identifier is excluded from generic processing
    pub fn is_forbidden(&self, identifier: &str) -> bool {
        self.forbidden.contains(identifier)
    }

    /// Whether an export handler is registered for exactly this type
    pub fn has_exact_export(&self, type_name: &str) -> bool {
        self.exporters
            .contains_key(&DispatchKey::Type(type_name.to_owned()))
    }

    /// Resolve the export handler for a runtime type
    pub fn resolve_export(
        &self,
        schema: &Schema,
        ty: &RuntimeType,
    ) -> std::result::Result<Resolved<'_, ExportFn<M>>, DispatchError> {
        resolve(&self.exporters, schema, ty)
    }

    /// Resolve the import handler for a runtime type
    pub fn resolve_import(
        &self,
        schema: &Schema,
        ty: &RuntimeType,
    ) -> std::result::Result<Resolved<'_, ImportFn<M>>, DispatchError> {
        resolve(&self.importers, schema, ty)
    }
}

impl<M: ObjectModel> Default for HandlerRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve<'r, F>(
    table: &'r HashMap<DispatchKey, F>,
    schema: &Schema,
    ty: &RuntimeType,
) -> std::result::Result<Resolved<'r, F>, DispatchError> {
    let mut current = match ty {
        RuntimeType::Collection { element_type } => {
            return Ok(Resolved {
                assumed: None,
                handler: table.get(&DispatchKey::CollectionOf(element_type.clone())),
            });
        }
        RuntimeType::Typed(name) => name.clone(),
    };

    loop {
        if let Some(handler) = table.get(&DispatchKey::Type(current.clone())) {
            return Ok(Resolved {
                assumed: Some(current),
                handler: Some(handler),
            });
        }
        let info = schema
            .get(&current)
            .ok_or_else(|| DispatchError::UnknownType(current.clone()))?;
        current = match info.bases.as_slice() {
            [] => {
                return Ok(Resolved {
                    assumed: None,
                    handler: None,
                })
            }
            [base] => base.clone(),
            bases => {
                return Err(DispatchError::MultipleInheritance {
                    type_name: current.clone(),
                    bases: bases.to_vec(),
                })
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::TypeInfo;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.insert(TypeInfo::new("Struct"));
        schema.insert(TypeInfo::new("Node").extends("Struct"));
        schema.insert(TypeInfo::new("MathNode").extends("Node"));
        schema.insert(TypeInfo::new("Mixin"));
        schema.insert(TypeInfo::new("Hybrid").extends("Node").extends("Mixin"));
        schema.insert(TypeInfo::new("HybridChild").extends("Hybrid"));
        schema
    }

    fn table() -> HashMap<DispatchKey, &'static str> {
        let mut table = HashMap::new();
        table.insert(DispatchKey::Type("Node".into()), "node");
        table.insert(DispatchKey::CollectionOf("Item".into()), "items");
        table
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        let table = table();
        let resolved = resolve(&table, &schema(), &RuntimeType::Typed("MathNode".into())).unwrap();
        assert_eq!(resolved.assumed.as_deref(), Some("Node"));
        assert_eq!(resolved.handler, Some(&"node"));
    }

    #[test]
    fn test_unhandled_type_gets_noop() {
        let table = table();
        let resolved = resolve(&table, &schema(), &RuntimeType::Typed("Struct".into())).unwrap();
        assert!(resolved.assumed.is_none());
        assert!(resolved.handler.is_none());
    }

    #[test]
    fn test_multiple_inheritance_is_fatal() {
        let table = table();
        let err = resolve(
            &table,
            &schema(),
            &RuntimeType::Typed("HybridChild".into()),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            DispatchError::MultipleInheritance { ref type_name, .. } if type_name == "Hybrid"
        ));
    }

    #[test]
    fn test_untyped_collection_dispatches_on_element() {
        let table = table();
        let found = resolve(
            &table,
            &schema(),
            &RuntimeType::Collection {
                element_type: "Item".into(),
            },
        )
        .unwrap();
        assert_eq!(found.handler, Some(&"items"));
        assert!(found.assumed.is_none());

        let missing = resolve(
            &table,
            &schema(),
            &RuntimeType::Collection {
                element_type: "Other".into(),
            },
        )
        .unwrap();
        assert!(missing.handler.is_none());
    }

    #[test]
    fn test_unknown_type() {
        let table = table();
        let err = resolve(&table, &schema(), &RuntimeType::Typed("Ghost".into()))
            .err()
            .unwrap();
        assert_eq!(err, DispatchError::UnknownType("Ghost".into()));
    }
}
