// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialized data tree.
//!
//! Every exported object becomes a [`SerializedObject`]: a fresh integer identity,
//! a property map and an optional diagnostic path. Pointer sites hold a
//! [`Reference`] until the export post-pass resolves them; on the wire every
//! resolved reference is a plain integer.

use crate::path::PathTrail;
use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Property map of a serialized object, in export order
pub type ObjectData = IndexMap<String, DataValue>;

/// Key under which a collection's items are stored
pub const ITEMS_KEY: &str = "items";

/// Target of a pointer site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    /// Placeholder slot, replaced by the export post-pass
    Pending(usize),
    /// Identity of an object serialized in the same document
    Internal(u64),
    /// Identity of an external ledger entry
    External(u64),
}

/// A node of the serialized data tree
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Null, used for null pointers
    Null,
    /// Boolean
    Bool(bool),
    /// Integer, also how decoded pointers arrive
    Int(i64),
    /// Float
    Float(f64),
    /// String or enum identifier
    String(String),
    /// Arrays, flag sets and collection items
    List(Vec<DataValue>),
    /// Pointer site
    Pointer(Reference),
    /// Nested serialized object
    Object(Box<SerializedObject>),
}

impl DataValue {
    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer content
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric content as a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// List content
    pub fn as_list(&self) -> Option<&[DataValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Nested object
    pub fn as_object(&self) -> Option<&SerializedObject> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Identity a pointer site refers to, whether still in memory or decoded
    /// from text
    pub fn as_identity(&self) -> Option<u64> {
        match self {
            Self::Pointer(Reference::Internal(id) | Reference::External(id)) => Some(*id),
            Self::Int(id) => u64::try_from(*id).ok(),
            _ => None,
        }
    }

    /// Whether this is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Rewrite pending pointer slots in place
    pub(crate) fn resolve_pending(&mut self, resolved: &[Option<Reference>]) {
        match self {
            Self::Pointer(reference) => {
                if let Reference::Pending(slot) = *reference {
                    if let Some(Some(target)) = resolved.get(slot) {
                        *reference = *target;
                    }
                }
            }
            Self::List(items) => {
                for item in items {
                    item.resolve_pending(resolved);
                }
            }
            Self::Object(object) => object.resolve_pending(resolved),
            _ => {}
        }
    }
}

/// One exported object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedObject {
    /// Identity, unique within the document
    #[serde(rename = "id")]
    pub identity: u64,
    /// Property map
    pub data: ObjectData,
    /// Diagnostic path from the export root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl SerializedObject {
    /// Create an object with an empty property map
    pub fn new(identity: u64) -> Self {
        Self {
            identity,
            data: ObjectData::new(),
            path: None,
        }
    }

    /// Property value by key
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.data.get(key)
    }

    /// Items of a serialized collection
    pub fn items(&self) -> Option<&[DataValue]> {
        self.data.get(ITEMS_KEY).and_then(DataValue::as_list)
    }

    /// String property by key
    pub fn str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(DataValue::as_str)
    }

    pub(crate) fn resolve_pending(&mut self, resolved: &[Option<Reference>]) {
        for value in self.data.values_mut() {
            value.resolve_pending(resolved);
        }
    }

    /// Visit this object and every nested object, depth first
    pub fn walk<'s>(&'s self, visit: &mut dyn FnMut(&'s SerializedObject)) {
        visit(self);
        for value in self.data.values() {
            walk_value(value, visit);
        }
    }
}

fn walk_value<'s>(value: &'s DataValue, visit: &mut dyn FnMut(&'s SerializedObject)) {
    match value {
        DataValue::Object(object) => object.walk(visit),
        DataValue::List(items) => {
            for item in items {
                walk_value(item, visit);
            }
        }
        _ => {}
    }
}

/// Insert a key that must not already be present
pub fn no_clobber(
    data: &mut ObjectData,
    key: impl Into<String>,
    value: DataValue,
    path: &PathTrail,
) -> crate::Result<()> {
    let key = key.into();
    if data.contains_key(&key) {
        return Err(crate::Error::Schema {
            reason: format!("key '{key}' written twice"),
            path: path.to_string(),
        });
    }
    data.insert(key, value);
    Ok(())
}

/// Merge `other` into `data`, failing on any shared key
pub fn merge_no_clobber(
    data: &mut ObjectData,
    other: ObjectData,
    path: &PathTrail,
) -> crate::Result<()> {
    for (key, value) in other {
        no_clobber(data, key, value, path)?;
    }
    Ok(())
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::List(items) => items.serialize(serializer),
            Self::Pointer(Reference::Internal(id) | Reference::External(id)) => {
                serializer.serialize_u64(*id)
            }
            Self::Pointer(Reference::Pending(slot)) => Err(S::Error::custom(format!(
                "pointer slot {slot} was never resolved"
            ))),
            Self::Object(object) => object.serialize(serializer),
        }
    }
}

struct DataValueVisitor;

impl<'de> Visitor<'de> for DataValueVisitor {
    type Value = DataValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a serialized property value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<DataValue, E> {
        Ok(DataValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<DataValue, E> {
        Ok(DataValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<DataValue, D::Error> {
        DataValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<DataValue, E> {
        Ok(DataValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DataValue, E> {
        Ok(DataValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DataValue, E> {
        i64::try_from(v)
            .map(DataValue::Int)
            .map_err(|_| E::custom(format!("integer {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<DataValue, E> {
        Ok(DataValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DataValue, E> {
        Ok(DataValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<DataValue, E> {
        Ok(DataValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DataValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DataValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<DataValue, A::Error> {
        let object = SerializedObject::deserialize(de::value::MapAccessDeserializer::new(map))?;
        Ok(DataValue::Object(Box::new(object)))
    }
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DataValueVisitor)
    }
}
