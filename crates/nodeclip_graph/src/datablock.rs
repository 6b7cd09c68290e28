// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data outside node trees that nodes may point at.

use crate::ids::DatablockId;
use serde::{Deserialize, Serialize};

/// Kind of a datablock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatablockKind {
    /// An image
    Image,
    /// A scene object
    Object,
    /// A text block
    Text,
}

impl DatablockKind {
    /// Reflected type name
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Object => "Object",
            Self::Text => "Text",
        }
    }
}

/// An image, object or text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datablock {
    /// Unique ID
    pub id: DatablockId,
    /// Unique name among datablocks of the same kind
    pub name: String,
    /// Kind
    pub kind: DatablockKind,
    /// Library the datablock is linked from, `None` when local
    pub library: Option<String>,
    /// Text content (text blocks)
    pub body: String,
}

impl Datablock {
    /// Create a local datablock
    pub fn new(name: impl Into<String>, kind: DatablockKind) -> Self {
        Self {
            id: DatablockId::new(),
            name: name.into(),
            kind,
            library: None,
            body: String::new(),
        }
    }
}
