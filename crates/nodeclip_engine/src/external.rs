// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ledger of objects referenced from a document but not serialized in it.
//!
//! On export every distinct unserialized pointer target gets one entry. The
//! caller may describe an entry; on import a described entry must be backed by
//! a caller-supplied getter, and an undescribed one resolves to null.

use crate::document::Document;
use crate::error::{Error, Result, WithPath};
use crate::getter::{Binding, Getter};
use crate::path::PathTrail;
use crate::reflect::{ObjectModel, RuntimeType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One pointer site that refers to an external entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerSite {
    /// Diagnostic path of the object holding the pointer
    pub path: String,
    /// Pointer property identifier
    pub identifier: String,
}

/// An object referenced but not serialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEntry {
    /// Ledger identity, equal to the key in [`Document::external`]
    #[serde(skip)]
    pub external_id: u64,
    /// Declared type of the pointers referring to it
    pub fixed_type_name: String,
    /// Caller-supplied description; `None` means the pointers are cleared on import
    pub description: Option<String>,
    /// Pointer sites seen on export; not carried by the wire form
    #[serde(skip)]
    pub referenced_from: Vec<PointerSite>,
}

impl ExternalEntry {
    /// Create an undescribed entry
    pub fn new(external_id: u64, fixed_type_name: impl Into<String>) -> Self {
        Self {
            external_id,
            fixed_type_name: fixed_type_name.into(),
            description: None,
            referenced_from: Vec::new(),
        }
    }
}

impl Document {
    /// Attach caller descriptions to ledger entries, by identity.
    ///
    /// Nothing is changed when any id is missing from the ledger.
    pub fn set_external_descriptions<I, S>(&mut self, descriptions: I) -> Result<()>
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        let descriptions: Vec<(u64, S)> = descriptions.into_iter().collect();
        if let Some((id, _)) = descriptions.iter().find(|(id, _)| !self.external.contains_key(id)) {
            return Err(Error::UnknownExternal(*id));
        }
        for (id, description) in descriptions {
            if let Some(entry) = self.external.get_mut(&id) {
                entry.description = Some(description.into());
            }
        }
        Ok(())
    }
}

/// Picks a getter for an entry from the entry itself
type Chooser<M> = Box<dyn Fn(&ExternalEntry) -> Option<Getter<M>>>;

/// Collects caller getters for external entries before an import
pub struct ExternalResolver<M: ObjectModel> {
    getters: HashMap<u64, Getter<M>>,
    chooser: Option<Chooser<M>>,
}

impl<M: ObjectModel> ExternalResolver<M> {
    /// Create a resolver with no getters
    pub fn new() -> Self {
        Self {
            getters: HashMap::new(),
            chooser: None,
        }
    }

    /// Supply the getter for one external entry
    pub fn provide(&mut self, external_id: u64, getter: Getter<M>) -> &mut Self {
        self.getters.insert(external_id, getter);
        self
    }

    /// Choose getters at bind time for entries with no explicit getter.
    ///
    /// The chooser sees the whole entry, so one resolver can serve pointers of
    /// any type by switching on `fixed_type_name`.
    pub fn choose_with(&mut self, chooser: impl Fn(&ExternalEntry) -> Option<Getter<M>> + 'static) -> &mut Self {
        self.chooser = Some(Box::new(chooser));
        self
    }

    /// Check completeness and build the identity bindings for the ledger.
    ///
    /// Runs before any host mutation, so an incomplete resolver fails without
    /// side effects.
    pub fn bind(mut self, document: &Document) -> Result<HashMap<u64, Binding<M>>> {
        let mut bindings = HashMap::with_capacity(document.external.len());
        for (id, entry) in &document.external {
            let getter = self
                .getters
                .remove(id)
                .or_else(|| self.chooser.as_ref().and_then(|choose| choose(entry)));
            let binding = match (getter, &entry.description) {
                (Some(getter), _) => Binding::Live(getter),
                (None, None) => Binding::Null,
                (None, Some(description)) => {
                    return Err(Error::MissingExternal {
                        external_id: *id,
                        fixed_type_name: entry.fixed_type_name.clone(),
                        description: description.clone(),
                    })
                }
            };
            bindings.insert(*id, binding);
        }
        for id in self.getters.keys() {
            tracing::warn!("Getter supplied for unknown external id {id}, ignoring");
        }
        Ok(bindings)
    }
}

/// Check that every live binding resolves to an object of its entry's type.
///
/// Runs before any host mutation, like [`ExternalResolver::bind`].
pub fn check_binding_types<M: ObjectModel>(
    model: &M,
    document: &Document,
    bindings: &HashMap<u64, Binding<M>>,
) -> Result<()> {
    for (id, entry) in &document.external {
        let Some(Binding::Live(getter)) = bindings.get(id) else {
            continue;
        };
        let path = PathTrail::root(format!("external item {id}"));
        let target = getter.get(model).at(&path)?;
        let found = model.runtime_type(&target).at(&path)?;
        let compatible = match &found {
            RuntimeType::Typed(name) => model.schema().is_subtype(name, &entry.fixed_type_name),
            RuntimeType::Collection { .. } => false,
        };
        if !compatible {
            return Err(Error::ExternalTypeMismatch {
                external_id: *id,
                expected: entry.fixed_type_name.clone(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

impl<M: ObjectModel> Default for ExternalResolver<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FORMAT_VERSION;
    use std::collections::BTreeMap;

    fn ledger_document() -> Document {
        let mut external = BTreeMap::new();
        external.insert(7, ExternalEntry::new(7, "Object"));
        Document {
            host_version: "host 1.0".to_owned(),
            format_version: FORMAT_VERSION.to_owned(),
            subject_name: None,
            trees: Vec::new(),
            external,
        }
    }

    #[test]
    fn test_describing_an_unknown_id_changes_nothing() {
        let mut document = ledger_document();
        let err = document
            .set_external_descriptions([(7, "the cube"), (8, "nothing")])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownExternal(8)));
        assert_eq!(err.to_string(), "No external entry with id 8");
        assert!(document.external[&7].description.is_none());

        document.set_external_descriptions([(7, "the cube")]).unwrap();
        assert_eq!(document.external[&7].description.as_deref(), Some("the cube"));
    }
}
