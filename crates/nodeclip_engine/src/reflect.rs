// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reflection surface the engine walks.
//!
//! A host exposes its objects through [`ObjectModel`]: every object has a runtime
//! type, every type lists its properties in a [`Schema`], and properties are read
//! and written as [`Property`] values. The engine never touches host structs
//! directly.

use crate::value::DataValue;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;

/// Scalar category of a simple property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Floating point
    Float,
    /// String
    String,
    /// Enumeration (identifier string, or a set of them for flag enums)
    Enum,
}

/// What a property holds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Scalar value, or a fixed-length array of scalars
    Simple(ScalarKind),
    /// Reference to another object, possibly null
    Pointer {
        /// Declared target type
        fixed_type: String,
    },
    /// Ordered collection owned by the object
    Collection {
        /// Declared element type
        element_type: String,
    },
}

impl PropertyKind {
    /// Uppercase label used when building diagnostic paths
    pub fn label(&self) -> &'static str {
        match self {
            Self::Simple(ScalarKind::Bool) => "BOOLEAN",
            Self::Simple(ScalarKind::Int) => "INT",
            Self::Simple(ScalarKind::Float) => "FLOAT",
            Self::Simple(ScalarKind::String) => "STRING",
            Self::Simple(ScalarKind::Enum) => "ENUM",
            Self::Pointer { .. } => "POINTER",
            Self::Collection { .. } => "COLLECTION",
        }
    }
}

/// Metadata describing one property of a type
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Stable identifier, also the key in serialized data
    pub identifier: String,
    /// Kind of value
    pub kind: PropertyKind,
    /// Whether the host refuses writes
    pub is_readonly: bool,
    /// Fixed-length array of scalars
    pub is_array: bool,
    /// Enum that holds a set of identifiers
    pub is_enum_flag: bool,
    /// Default value, for simple properties
    pub default: Option<Scalar>,
}

impl PropertyDescriptor {
    fn new(identifier: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            is_readonly: false,
            is_array: false,
            is_enum_flag: false,
            default: None,
        }
    }

    /// Simple scalar property
    pub fn simple(identifier: impl Into<String>, kind: ScalarKind) -> Self {
        Self::new(identifier, PropertyKind::Simple(kind))
    }

    /// Pointer property
    pub fn pointer(identifier: impl Into<String>, fixed_type: impl Into<String>) -> Self {
        Self::new(
            identifier,
            PropertyKind::Pointer {
                fixed_type: fixed_type.into(),
            },
        )
    }

    /// Collection property
    pub fn collection(identifier: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self::new(
            identifier,
            PropertyKind::Collection {
                element_type: element_type.into(),
            },
        )
    }

    /// Mark as read-only
    pub fn readonly(mut self) -> Self {
        self.is_readonly = true;
        self
    }

    /// Mark as a fixed-length array
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Mark as a flag enum
    pub fn flags(mut self) -> Self {
        self.is_enum_flag = true;
        self
    }

    /// Set the default value
    pub fn with_default(mut self, default: Scalar) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether this is a simple property
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, PropertyKind::Simple(_))
    }
}

/// Value of a simple property
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    String(String),
    /// Enum identifier
    Enum(String),
    /// Flag enum, a set of identifiers
    Flags(BTreeSet<String>),
    /// Boolean array
    BoolArray(Vec<bool>),
    /// Integer array
    IntArray(Vec<i64>),
    /// Float array
    FloatArray(Vec<f64>),
}

impl Scalar {
    /// Convert to the serialized representation
    pub fn to_data(&self) -> DataValue {
        match self {
            Self::Bool(v) => DataValue::Bool(*v),
            Self::Int(v) => DataValue::Int(*v),
            Self::Float(v) => DataValue::Float(*v),
            Self::String(v) | Self::Enum(v) => DataValue::String(v.clone()),
            Self::Flags(set) => {
                DataValue::List(set.iter().cloned().map(DataValue::String).collect())
            }
            Self::BoolArray(v) => DataValue::List(v.iter().copied().map(DataValue::Bool).collect()),
            Self::IntArray(v) => DataValue::List(v.iter().copied().map(DataValue::Int).collect()),
            Self::FloatArray(v) => {
                DataValue::List(v.iter().copied().map(DataValue::Float).collect())
            }
        }
    }

    /// Interpret serialized data according to a property descriptor.
    ///
    /// Integers are accepted where floats are expected, since JSON does not keep
    /// the distinction for whole numbers.
    pub fn from_data(desc: &PropertyDescriptor, value: &DataValue) -> Option<Scalar> {
        let PropertyKind::Simple(kind) = desc.kind else {
            return None;
        };
        if desc.is_enum_flag {
            let DataValue::List(items) = value else {
                return None;
            };
            return items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect::<Option<BTreeSet<_>>>()
                .map(Scalar::Flags);
        }
        if desc.is_array {
            let DataValue::List(items) = value else {
                return None;
            };
            return match kind {
                ScalarKind::Bool => items
                    .iter()
                    .map(DataValue::as_bool)
                    .collect::<Option<Vec<_>>>()
                    .map(Scalar::BoolArray),
                ScalarKind::Int => items
                    .iter()
                    .map(DataValue::as_int)
                    .collect::<Option<Vec<_>>>()
                    .map(Scalar::IntArray),
                ScalarKind::Float => items
                    .iter()
                    .map(DataValue::as_float)
                    .collect::<Option<Vec<_>>>()
                    .map(Scalar::FloatArray),
                ScalarKind::String | ScalarKind::Enum => None,
            };
        }
        match kind {
            ScalarKind::Bool => value.as_bool().map(Scalar::Bool),
            ScalarKind::Int => value.as_int().map(Scalar::Int),
            ScalarKind::Float => value.as_float().map(Scalar::Float),
            ScalarKind::String => value.as_str().map(|s| Scalar::String(s.to_owned())),
            ScalarKind::Enum => value.as_str().map(|s| Scalar::Enum(s.to_owned())),
        }
    }

    /// String content of a string or enum scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }
}

/// A property value as read from or written to the host
#[derive(Debug, Clone, PartialEq)]
pub enum Property<H> {
    /// Simple value
    Scalar(Scalar),
    /// Pointer target, `None` when null
    Pointer(Option<H>),
    /// Handle of the collection wrapper
    Collection(H),
}

/// Runtime type of a live object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeType {
    /// A described type
    Typed(String),
    /// An untyped collection wrapper, dispatched by its element type
    Collection {
        /// Declared element type
        element_type: String,
    },
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typed(name) => f.write_str(name),
            Self::Collection { element_type } => write!(f, "collection of {element_type}"),
        }
    }
}

/// Description of one reflected type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    /// Type name
    pub name: String,
    /// Direct bases
    pub bases: Vec<String>,
    /// Properties declared by this type (not its bases)
    pub properties: Vec<PropertyDescriptor>,
    /// Whether the host exposes mutating functions on this type, such as a
    /// collection's `new`
    pub has_mutating_functions: bool,
}

impl TypeInfo {
    /// Create a root type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            properties: Vec::new(),
            has_mutating_functions: false,
        }
    }

    /// Add a direct base
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    /// Declare a property
    pub fn with(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Mark as exposing mutating functions
    pub fn mutating(mut self) -> Self {
        self.has_mutating_functions = true;
        self
    }
}

/// The set of types a host exposes
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: IndexMap<String, TypeInfo>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a type
    pub fn insert(&mut self, info: TypeInfo) {
        self.types.insert(info.name.clone(), info);
    }

    /// Look up a type
    pub fn get(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    /// Whether a type is known
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// All type names in registration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// All properties of a type, inherited ones first.
    ///
    /// Returns `None` for unknown types. A property redeclared by a derived
    /// type replaces the inherited one in place.
    pub fn properties_of(&self, name: &str) -> Option<Vec<&PropertyDescriptor>> {
        let info = self.types.get(name)?;
        let mut out: Vec<&PropertyDescriptor> = Vec::new();
        for base in &info.bases {
            for prop in self.properties_of(base)? {
                if !out.iter().any(|p| p.identifier == prop.identifier) {
                    out.push(prop);
                }
            }
        }
        for prop in &info.properties {
            match out.iter_mut().find(|p| p.identifier == prop.identifier) {
                Some(slot) => *slot = prop,
                None => out.push(prop),
            }
        }
        Some(out)
    }

    /// Properties of a runtime type; untyped collections have none
    pub fn properties_of_runtime(&self, ty: &RuntimeType) -> Option<Vec<&PropertyDescriptor>> {
        match ty {
            RuntimeType::Typed(name) => self.properties_of(name),
            RuntimeType::Collection { .. } => Some(Vec::new()),
        }
    }

    /// Find one property of a type, including inherited ones
    pub fn property(&self, type_name: &str, identifier: &str) -> Option<&PropertyDescriptor> {
        self.properties_of(type_name)?
            .into_iter()
            .find(|p| p.identifier == identifier)
    }

    /// Whether `name` is `ancestor` or derives from it
    pub fn is_subtype(&self, name: &str, ancestor: &str) -> bool {
        if name == ancestor {
            return true;
        }
        self.types
            .get(name)
            .map(|info| info.bases.iter().any(|b| self.is_subtype(b, ancestor)))
            .unwrap_or(false)
    }
}

/// Failure reported by the host while reading or writing an object
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The object has no property with that identifier
    #[error("{type_name} has no property '{identifier}'")]
    NoSuchProperty {
        /// Runtime type of the object
        type_name: String,
        /// Requested identifier
        identifier: String,
    },
    /// The supplied value does not fit the property
    #[error("Wrong value for '{identifier}': expected {expected}")]
    WrongValue {
        /// Property identifier
        identifier: String,
        /// What the host expected
        expected: String,
    },
    /// The property cannot be written
    #[error("Property '{0}' is read-only")]
    ReadOnly(String),
    /// The handle no longer designates a live object
    #[error("Stale handle: {0}")]
    Stale(String),
    /// Collection index out of range
    #[error("Index {index} out of range for collection of length {len}")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Collection length
        len: usize,
    },
    /// Any other refusal by the host
    #[error("{0}")]
    Rejected(String),
}

/// Reflective access to a host's object graph
pub trait ObjectModel: 'static {
    /// Handle to a live object or collection wrapper
    type Handle: Clone + fmt::Debug + 'static;
    /// Canonical identity of an object; two handles to the same object map to
    /// the same key
    type Key: Clone + Eq + Hash + fmt::Debug + 'static;

    /// Identifier of the self-descriptor property every type carries, if any.
    /// It is never exported or imported.
    const SELF_DESCRIPTOR: Option<&'static str> = None;

    /// The host's type schema
    fn schema(&self) -> &Schema;

    /// Runtime type of an object
    fn runtime_type(&self, obj: &Self::Handle) -> Result<RuntimeType, ModelError>;

    /// Canonical identity of an object
    fn canonical_key(&self, obj: &Self::Handle) -> Self::Key;

    /// Canonical identity of the top-level subject that owns an object
    fn owner_key(&self, obj: &Self::Handle) -> Option<Self::Key>;

    /// Read a property
    fn get(&self, obj: &Self::Handle, identifier: &str) -> Result<Property<Self::Handle>, ModelError>;

    /// Write a property. Collections cannot be assigned, only their items.
    fn set(
        &mut self,
        obj: &Self::Handle,
        identifier: &str,
        value: Property<Self::Handle>,
    ) -> Result<(), ModelError>;

    /// Number of items in a collection wrapper
    fn collection_len(&self, collection: &Self::Handle) -> Result<usize, ModelError>;

    /// Item of a collection wrapper
    fn collection_item(
        &self,
        collection: &Self::Handle,
        index: usize,
    ) -> Result<Self::Handle, ModelError>;

    /// Version string of the host application
    fn host_version(&self) -> String;

    /// Display name of an object, used in diagnostic paths
    fn display_name(&self, obj: &Self::Handle) -> Option<String> {
        match self.get(obj, "name") {
            Ok(Property::Scalar(Scalar::String(name))) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.insert(
            TypeInfo::new("Base")
                .with(PropertyDescriptor::simple("name", ScalarKind::String))
                .with(PropertyDescriptor::simple("size", ScalarKind::Float)),
        );
        schema.insert(
            TypeInfo::new("Derived")
                .extends("Base")
                .with(
                    PropertyDescriptor::simple("size", ScalarKind::Float)
                        .with_default(Scalar::Float(2.0)),
                )
                .with(PropertyDescriptor::pointer("target", "Base")),
        );
        schema
    }

    #[test]
    fn test_properties_inherited_first() {
        let schema = schema();
        let props = schema.properties_of("Derived").unwrap();
        let ids: Vec<_> = props.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["name", "size", "target"]);
        // Redeclared property wins
        assert_eq!(props[1].default, Some(Scalar::Float(2.0)));
    }

    #[test]
    fn test_subtype() {
        let schema = schema();
        assert!(schema.is_subtype("Derived", "Base"));
        assert!(!schema.is_subtype("Base", "Derived"));
        assert!(schema.properties_of("Missing").is_none());
    }

    #[test]
    fn test_scalar_from_data() {
        let float = PropertyDescriptor::simple("v", ScalarKind::Float);
        assert_eq!(
            Scalar::from_data(&float, &DataValue::Int(3)),
            Some(Scalar::Float(3.0))
        );

        let flags = PropertyDescriptor::simple("f", ScalarKind::Enum).flags();
        let data = DataValue::List(vec![
            DataValue::String("B".into()),
            DataValue::String("A".into()),
        ]);
        let Some(Scalar::Flags(set)) = Scalar::from_data(&flags, &data) else {
            panic!("expected flags");
        };
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["A", "B"]);

        let vector = PropertyDescriptor::simple("co", ScalarKind::Float).array();
        assert_eq!(
            Scalar::from_data(&vector, &DataValue::String("x".into())),
            None
        );
    }
}
