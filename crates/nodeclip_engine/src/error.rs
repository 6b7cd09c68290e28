// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for export and import.

use crate::import::Phase;
use crate::path::PathTrail;
use crate::reflect::ModelError;

/// Failure while choosing a handler for a runtime type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// An ancestor has several direct bases, so the nearest handled one is ambiguous
    #[error("Type {type_name} has multiple bases {bases:?}")]
    MultipleInheritance {
        /// The offending type
        type_name: String,
        /// Its direct bases
        bases: Vec<String>,
    },
    /// The schema does not describe the type
    #[error("Unknown type: {0}")]
    UnknownType(String),
}

/// Errors raised by the engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serialized data or live objects violate the schema
    #[error("{reason}\nFrom root: {path}")]
    Schema {
        /// What went wrong
        reason: String,
        /// Diagnostic path
        path: String,
    },

    /// The generic fallback cannot deal with a property and no handler covers it
    #[error("More specific handler needed for type: {type_name}\nReason: {reason}\nFrom root: {path}")]
    HandlerNeeded {
        /// Runtime type of the object
        type_name: String,
        /// Why the fallback gave up
        reason: String,
        /// Diagnostic path
        path: String,
    },

    /// A pointer names an identity that is neither imported yet nor supplied externally
    #[error("Id {identity} not deserialized or provided yet\nFrom root: {path}")]
    UnresolvedIdentity {
        /// Referenced identity
        identity: u64,
        /// Diagnostic path
        path: String,
    },

    /// An identity was registered twice during import
    #[error("Double deserialization of id {identity}\nFrom root: {path}")]
    DoubleRegistration {
        /// Offending identity
        identity: u64,
        /// Diagnostic path
        path: String,
    },

    /// The same live object was reached twice during export
    #[error("Double serialization\nFrom root: {path}")]
    DoubleSerialization {
        /// Diagnostic path of the second visit
        path: String,
    },

    /// Document and host versions differ and mismatches are not allowed
    #[error("{0}")]
    VersionMismatch(String),

    /// A described external item has no getter
    #[error("External item {external_id} ({fixed_type_name}) is described as '{description}' but no getter was provided")]
    MissingExternal {
        /// Ledger identity
        external_id: u64,
        /// Declared pointer type
        fixed_type_name: String,
        /// Caller-supplied description
        description: String,
    },

    /// No handler could be chosen
    #[error("{source}\nFrom root: {path}")]
    Dispatch {
        /// Underlying dispatch failure
        source: DispatchError,
        /// Diagnostic path
        path: String,
    },

    /// The host refused an access
    #[error("{source}\nFrom root: {path}")]
    Model {
        /// Underlying host failure
        source: ModelError,
        /// Diagnostic path
        path: String,
    },

    /// Deferred operations were left behind in a phase that had already been drained
    #[error("{count} deferred operation(s) left in phase {phase}")]
    UndrainedPhase {
        /// The phase
        phase: Phase,
        /// Number of pending operations
        count: usize,
    },

    /// A getter for an external item resolves to an object of another type
    #[error("External item {external_id} expects {expected} but its getter resolves to {found}")]
    ExternalTypeMismatch {
        /// Ledger identity
        external_id: u64,
        /// Declared pointer type from the ledger
        expected: String,
        /// Runtime type of the resolved object
        found: String,
    },

    /// An external entry was addressed that the ledger does not hold
    #[error("No external entry with id {0}")]
    UnknownExternal(u64),

    /// A settings file is not valid RON for the settings layout
    #[error("Invalid settings in {origin}: {source}")]
    Settings {
        /// File or other source the text came from
        origin: String,
        /// Parser failure with position
        source: ron::error::SpannedError,
    },

    /// Settings could not be rendered as RON
    #[error("Settings encoding failed: {0}")]
    SettingsEncode(#[from] ron::Error),

    /// Malformed clipboard text
    #[error("Codec error: {0}")]
    Codec(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Schema violation at a path
    pub fn schema(reason: impl Into<String>, path: &PathTrail) -> Self {
        Self::Schema {
            reason: reason.into(),
            path: path.to_string(),
        }
    }

    /// Missing handler at a path
    pub fn handler_needed(
        type_name: impl Into<String>,
        reason: impl Into<String>,
        path: &PathTrail,
    ) -> Self {
        Self::HandlerNeeded {
            type_name: type_name.into(),
            reason: reason.into(),
            path: path.to_string(),
        }
    }
}

/// Attach a diagnostic path to host and dispatch failures
pub trait WithPath<T> {
    /// Convert into an engine error located at `path`
    fn at(self, path: &PathTrail) -> Result<T>;
}

impl<T> WithPath<T> for std::result::Result<T, ModelError> {
    fn at(self, path: &PathTrail) -> Result<T> {
        self.map_err(|source| Error::Model {
            source,
            path: path.to_string(),
        })
    }
}

impl<T> WithPath<T> for std::result::Result<T, DispatchError> {
    fn at(self, path: &PathTrail) -> Result<T> {
        self.map_err(|source| Error::Dispatch {
            source,
            path: path.to_string(),
        })
    }
}
