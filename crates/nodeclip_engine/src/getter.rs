// SPDX-License-Identifier: MIT OR Apache-2.0
//! Re-derivable access to live objects during import.
//!
//! Import never holds on to host handles across mutations: adding nodes or
//! sockets may invalidate them. A [`Getter`] instead remembers how to reach an
//! object from the model (a tree by name, then a property, then an index) and
//! re-walks that route each time it is invoked.

use crate::reflect::{ModelError, ObjectModel, Property};
use std::fmt;
use std::rc::Rc;

/// A zero-argument accessor that re-derives a live object from the model
pub struct Getter<M: ObjectModel> {
    derive: Rc<dyn Fn(&M) -> Result<M::Handle, ModelError>>,
}

impl<M: ObjectModel> Getter<M> {
    /// Wrap a derivation function
    pub fn new(derive: impl Fn(&M) -> Result<M::Handle, ModelError> + 'static) -> Self {
        Self {
            derive: Rc::new(derive),
        }
    }

    /// Getter that always yields the same handle, for objects the host keeps stable
    pub fn fixed(handle: M::Handle) -> Self {
        Self::new(move |_| Ok(handle.clone()))
    }

    /// Re-derive the object
    pub fn get(&self, model: &M) -> Result<M::Handle, ModelError> {
        (self.derive)(model)
    }

    /// Getter for the object a pointer or collection property designates
    pub fn property(&self, identifier: impl Into<String>) -> Self {
        let parent = self.clone();
        let identifier = identifier.into();
        Self::new(move |model| {
            let obj = parent.get(model)?;
            match model.get(&obj, &identifier)? {
                Property::Pointer(Some(target)) | Property::Collection(target) => Ok(target),
                Property::Pointer(None) => Err(ModelError::Rejected(format!(
                    "pointer '{identifier}' is null"
                ))),
                Property::Scalar(_) => Err(ModelError::WrongValue {
                    identifier: identifier.clone(),
                    expected: "pointer or collection".into(),
                }),
            }
        })
    }

    /// Getter for an item of the collection this getter designates
    pub fn index(&self, index: usize) -> Self {
        let parent = self.clone();
        Self::new(move |model| {
            let collection = parent.get(model)?;
            model.collection_item(&collection, index)
        })
    }
}

impl<M: ObjectModel> Clone for Getter<M> {
    fn clone(&self) -> Self {
        Self {
            derive: Rc::clone(&self.derive),
        }
    }
}

impl<M: ObjectModel> fmt::Debug for Getter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Getter")
    }
}

/// What an identity resolves to during import
pub enum Binding<M: ObjectModel> {
    /// A live object
    Live(Getter<M>),
    /// A skipped external item; pointers to it are cleared
    Null,
}

impl<M: ObjectModel> Clone for Binding<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Live(getter) => Self::Live(getter.clone()),
            Self::Null => Self::Null,
        }
    }
}

impl<M: ObjectModel> fmt::Debug for Binding<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live(_) => f.write_str("Live"),
            Self::Null => f.write_str("Null"),
        }
    }
}
