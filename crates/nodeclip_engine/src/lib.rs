// SPDX-License-Identifier: MIT OR Apache-2.0
//! Export/import engine for reflective node graphs.
//!
//! This crate turns live node trees into a portable clipboard document and
//! back, without knowing the host's types:
//! - Reflection through [`ObjectModel`] and a [`Schema`]
//! - Handler dispatch by nearest ancestor type, with a generic fallback
//! - Identity assignment and pointer resolution on export
//! - Getter-based, phased import on the receiving side
//!
//! ## Architecture
//!
//! Export walks each tree with an [`Exporter`], serializing objects into
//! [`SerializedObject`]s. Pointers to objects outside the document collapse into
//! an external ledger that the receiving side fills with getters through an
//! [`ExternalResolver`]. The [`Importer`] then rebuilds the trees, queueing work
//! that must wait for later structure into [`Phase`]s.

pub mod document;
pub mod error;
pub mod export;
pub mod external;
pub mod getter;
pub mod import;
pub mod path;
pub mod reflect;
pub mod registry;
pub mod settings;
pub mod subject;
pub mod value;

#[cfg(test)]
mod testing;

pub use document::{Document, FORMAT_VERSION, MAGIC_PREFIX};
pub use error::{DispatchError, Error, Result, WithPath};
pub use export::{ExportCx, Exporter};
pub use external::{check_binding_types, ExternalEntry, ExternalResolver, PointerSite};
pub use getter::{Binding, Getter};
pub use import::{check_version, ImportCx, Importer, Phase};
pub use path::PathTrail;
pub use reflect::{
    ModelError, ObjectModel, Property, PropertyDescriptor, PropertyKind, RuntimeType, Scalar,
    ScalarKind, Schema, TypeInfo,
};
pub use registry::{DispatchKey, HandlerRegistry};
pub use settings::{ClipSettings, ExportSettings, ImportSettings};
pub use subject::{export_subject, import_document, ImportReport, Subject, TreeLibrary};
pub use value::{no_clobber, DataValue, ObjectData, Reference, SerializedObject};
