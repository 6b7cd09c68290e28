// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket definitions for node inputs/outputs.

use crate::ids::SocketId;
use nodeclip_engine::Scalar;
use serde::{Deserialize, Serialize};

/// Socket direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketDirection {
    /// Input socket
    Input,
    /// Output socket
    Output,
}

impl SocketDirection {
    /// Tag used by interface sockets
    pub fn tag(self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }

    /// Parse an interface tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "INPUT" => Some(Self::Input),
            "OUTPUT" => Some(Self::Output),
            _ => None,
        }
    }
}

/// Data type that can flow through sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketType {
    /// Floating point value
    Float,
    /// Integer value
    Int,
    /// Boolean value
    Bool,
    /// 3D vector
    Vector,
    /// Color (RGBA)
    Color,
    /// String value
    String,
    /// Menu choice
    Menu,
    /// Geometry, carries no value
    Geometry,
}

impl SocketType {
    /// All socket types
    pub const ALL: [SocketType; 8] = [
        Self::Float,
        Self::Int,
        Self::Bool,
        Self::Vector,
        Self::Color,
        Self::String,
        Self::Menu,
        Self::Geometry,
    ];

    /// Reflected type name of sockets of this type
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Float => "NodeSocketFloat",
            Self::Int => "NodeSocketInt",
            Self::Bool => "NodeSocketBool",
            Self::Vector => "NodeSocketVector",
            Self::Color => "NodeSocketColor",
            Self::String => "NodeSocketString",
            Self::Menu => "NodeSocketMenu",
            Self::Geometry => "NodeSocketGeometry",
        }
    }

    /// Enum tag used by items and interface sockets
    pub fn tag(self) -> &'static str {
        match self {
            Self::Float => "FLOAT",
            Self::Int => "INT",
            Self::Bool => "BOOLEAN",
            Self::Vector => "VECTOR",
            Self::Color => "RGBA",
            Self::String => "STRING",
            Self::Menu => "MENU",
            Self::Geometry => "GEOMETRY",
        }
    }

    /// Parse an enum tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Value a fresh socket of this type holds
    pub fn default_value(self) -> SocketValue {
        match self {
            Self::Float => SocketValue::Float(0.0),
            Self::Int => SocketValue::Int(0),
            Self::Bool => SocketValue::Bool(false),
            Self::Vector => SocketValue::Vector([0.0; 3]),
            Self::Color => SocketValue::Color([0.8, 0.8, 0.8, 1.0]),
            Self::String => SocketValue::String(String::new()),
            Self::Menu => SocketValue::Menu(String::new()),
            Self::Geometry => SocketValue::None,
        }
    }

    /// Check if this type can connect to another type
    pub fn can_connect_to(self, other: SocketType) -> bool {
        if self == other {
            return true;
        }

        // Implicit conversions between field types
        let numeric = |t: SocketType| {
            matches!(
                t,
                Self::Float | Self::Int | Self::Bool | Self::Vector | Self::Color
            )
        };
        numeric(self) && numeric(other)
    }
}

/// Value held by a socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SocketValue {
    /// No value (geometry)
    None,
    /// Float
    Float(f64),
    /// Integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// 3D vector
    Vector([f64; 3]),
    /// Color
    Color([f64; 4]),
    /// String
    String(String),
    /// Menu choice
    Menu(String),
}

impl SocketValue {
    /// Reflected form; `None` for sockets without a value
    pub fn to_scalar(&self) -> Option<Scalar> {
        Some(match self {
            Self::None => return None,
            Self::Float(v) => Scalar::Float(*v),
            Self::Int(v) => Scalar::Int(*v),
            Self::Bool(v) => Scalar::Bool(*v),
            Self::Vector(v) => Scalar::FloatArray(v.to_vec()),
            Self::Color(v) => Scalar::FloatArray(v.to_vec()),
            Self::String(v) => Scalar::String(v.clone()),
            Self::Menu(v) => Scalar::Enum(v.clone()),
        })
    }

    /// Convert a reflected value for a socket of the given type
    pub fn from_scalar(socket_type: SocketType, scalar: &Scalar) -> Option<Self> {
        match (socket_type, scalar) {
            (SocketType::Float, Scalar::Float(v)) => Some(Self::Float(*v)),
            (SocketType::Int, Scalar::Int(v)) => Some(Self::Int(*v)),
            (SocketType::Bool, Scalar::Bool(v)) => Some(Self::Bool(*v)),
            (SocketType::Vector, Scalar::FloatArray(v)) => {
                <[f64; 3]>::try_from(v.as_slice()).ok().map(Self::Vector)
            }
            (SocketType::Color, Scalar::FloatArray(v)) => {
                <[f64; 4]>::try_from(v.as_slice()).ok().map(Self::Color)
            }
            (SocketType::String, Scalar::String(v)) => Some(Self::String(v.clone())),
            (SocketType::Menu, Scalar::Enum(v) | Scalar::String(v)) => Some(Self::Menu(v.clone())),
            _ => None,
        }
    }
}

/// A socket on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socket {
    /// Unique socket ID
    pub id: SocketId,
    /// Stable identifier within the node
    pub identifier: String,
    /// Display name
    pub name: String,
    /// Socket direction
    pub direction: SocketDirection,
    /// Data type
    pub socket_type: SocketType,
    /// Current value (meaningful for unlinked inputs)
    pub value: SocketValue,
    /// Hidden in the editor
    pub hide: bool,
    /// Whether several links may end in this socket
    pub multi_input: bool,
}

impl Socket {
    /// Create a new socket
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        socket_type: SocketType,
        direction: SocketDirection,
    ) -> Self {
        Self {
            id: SocketId::new(),
            identifier: identifier.into(),
            name: name.into(),
            direction,
            socket_type,
            value: socket_type.default_value(),
            hide: false,
            multi_input: false,
        }
    }

    /// Create a new input socket whose identifier is its name
    pub fn input(name: impl Into<String>, socket_type: SocketType) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, socket_type, SocketDirection::Input)
    }

    /// Create a new output socket whose identifier is its name
    pub fn output(name: impl Into<String>, socket_type: SocketType) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, socket_type, SocketDirection::Output)
    }

    /// Copy of a template socket with its own ID
    pub fn fresh(template: &Socket) -> Self {
        Self {
            id: SocketId::new(),
            ..template.clone()
        }
    }

    /// Set the identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Set the default value
    pub fn with_value(mut self, value: SocketValue) -> Self {
        self.value = value;
        self
    }

    /// Accept several incoming links
    pub fn multi(mut self) -> Self {
        self.multi_input = true;
        self
    }

    /// Whether this is an output socket
    pub fn is_output(&self) -> bool {
        self.direction == SocketDirection::Output
    }
}
