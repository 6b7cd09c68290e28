// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node kind definitions and the built-in kind catalog.
//!
//! A kind describes what a freshly added node looks like: its static sockets,
//! kind-specific properties, an optional pointer to a tree or datablock, and
//! an optional item list. Sockets of group boundaries, groups, zones and item
//! driven nodes are derived later by the library.

use crate::datablock::DatablockKind;
use crate::node::{ItemsKind, NodeCategory, PropValue};
use crate::socket::{Socket, SocketType, SocketValue};
use crate::tree::TreeKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a node's sockets beyond the static ones are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Static sockets only
    Plain,
    /// Outputs mirror the tree interface inputs
    GroupInput,
    /// Inputs mirror the tree interface outputs
    GroupOutput,
    /// Sockets mirror the interface of the referenced tree
    Group,
    /// Gains item sockets once paired with a repeat output
    RepeatInput,
    /// Item sockets on both sides
    RepeatOutput,
    /// One input per menu entry
    MenuSwitch,
    /// One input per viewer item
    Viewer,
    /// Layout frame that can parent other nodes
    Frame,
}

/// Kind-specific simple property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindProperty {
    /// Property identifier
    pub identifier: String,
    /// Value of a fresh node
    pub default: PropValue,
    /// Allowed identifiers for enum properties
    pub choices: Vec<String>,
}

impl KindProperty {
    /// A non-enum property
    pub fn new(identifier: &str, default: PropValue) -> Self {
        Self {
            identifier: identifier.to_owned(),
            default,
            choices: Vec::new(),
        }
    }

    /// An enum property; the first choice is the default
    pub fn choice(identifier: &str, choices: &[&str]) -> Self {
        Self {
            identifier: identifier.to_owned(),
            default: PropValue::Enum(choices.first().copied().unwrap_or_default().to_owned()),
            choices: choices.iter().map(|c| (*c).to_owned()).collect(),
        }
    }
}

/// What a kind's pointer property designates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerTarget {
    /// A node tree
    Tree,
    /// A datablock of a kind
    Datablock(DatablockKind),
}

impl PointerTarget {
    /// Reflected type name of the target
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Tree => "NodeTree",
            Self::Datablock(kind) => kind.type_name(),
        }
    }
}

/// Kind-specific pointer property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindPointer {
    /// Property identifier
    pub identifier: String,
    /// Target type
    pub target: PointerTarget,
}

/// Node kind definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeKind {
    /// Unique type tag
    pub id: String,
    /// Display name, also the name of fresh nodes
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Trees the kind may be added to; empty means any
    pub trees: Vec<TreeKind>,
    /// Default width
    pub width: f64,
    /// How sockets are derived
    pub role: NodeRole,
    /// Kind-specific simple properties
    pub properties: Vec<KindProperty>,
    /// Kind-specific pointer
    pub pointer: Option<KindPointer>,
    /// Item list
    pub items: Option<ItemsKind>,
    /// Static input sockets
    pub inputs: Vec<Socket>,
    /// Static output sockets
    pub outputs: Vec<Socket>,
}

impl NodeKind {
    fn new(id: &str, name: &str, category: NodeCategory, description: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            category,
            description: description.to_owned(),
            trees: Vec::new(),
            width: 140.0,
            role: NodeRole::Plain,
            properties: Vec::new(),
            pointer: None,
            items: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Whether the kind may be added to a tree of this kind
    pub fn allowed_in(&self, tree: TreeKind) -> bool {
        self.trees.is_empty() || self.trees.contains(&tree)
    }

    /// Find a kind-specific property
    pub fn property(&self, identifier: &str) -> Option<&KindProperty> {
        self.properties.iter().find(|p| p.identifier == identifier)
    }
}

/// Registry of available node kinds
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: IndexMap<String, NodeKind>,
}

impl KindRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node kind
    pub fn register(&mut self, kind: NodeKind) {
        self.kinds.insert(kind.id.clone(), kind);
    }

    /// Get a kind by type tag
    pub fn get(&self, id: &str) -> Option<&NodeKind> {
        self.kinds.get(id)
    }

    /// Get all registered kinds
    pub fn kinds(&self) -> impl Iterator<Item = &NodeKind> {
        self.kinds.values()
    }

    /// Get kinds by category
    pub fn kinds_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeKind> {
        self.kinds.values().filter(move |k| k.category == category)
    }

    /// Create the registry with every built-in node kind
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        // ====================================================================
        // Group boundaries
        // ====================================================================

        registry.register(NodeKind {
            role: NodeRole::GroupInput,
            ..NodeKind::new("GroupInput", "Group Input", NodeCategory::Group, "Inputs of the tree interface")
        });

        registry.register(NodeKind {
            role: NodeRole::GroupOutput,
            ..NodeKind::new("GroupOutput", "Group Output", NodeCategory::Group, "Outputs of the tree interface")
        });

        registry.register(NodeKind {
            role: NodeRole::Group,
            pointer: Some(KindPointer {
                identifier: "node_tree".to_owned(),
                target: PointerTarget::Tree,
            }),
            ..NodeKind::new("Group", "Group", NodeCategory::Group, "Nested use of another tree")
        });

        // ====================================================================
        // Math & geometry
        // ====================================================================

        registry.register(NodeKind {
            properties: vec![
                KindProperty::choice("operation", &["ADD", "SUBTRACT", "MULTIPLY", "DIVIDE"]),
                KindProperty::new("use_clamp", PropValue::Bool(false)),
            ],
            inputs: vec![
                Socket::input("Value", SocketType::Float).with_value(SocketValue::Float(0.5)),
                Socket::input("Value", SocketType::Float)
                    .with_identifier("Value_001")
                    .with_value(SocketValue::Float(0.5)),
            ],
            outputs: vec![Socket::output("Value", SocketType::Float)],
            ..NodeKind::new("Math", "Math", NodeCategory::Math, "Scalar math operation")
        });

        registry.register(NodeKind {
            trees: vec![TreeKind::Geometry],
            inputs: vec![Socket::input("Geometry", SocketType::Geometry).multi()],
            outputs: vec![Socket::output("Geometry", SocketType::Geometry)],
            ..NodeKind::new("Join", "Join Geometry", NodeCategory::Geometry, "Merge geometries in link order")
        });

        registry.register(NodeKind {
            trees: vec![TreeKind::Geometry],
            inputs: vec![
                Socket::input("Size", SocketType::Vector).with_value(SocketValue::Vector([1.0; 3])),
                Socket::input("Vertices X", SocketType::Int).with_value(SocketValue::Int(2)),
            ],
            outputs: vec![Socket::output("Mesh", SocketType::Geometry)],
            ..NodeKind::new("Cube", "Cube", NodeCategory::Geometry, "Box mesh primitive")
        });

        registry.register(NodeKind {
            trees: vec![TreeKind::Geometry],
            properties: vec![KindProperty::choice("transform_space", &["ORIGINAL", "RELATIVE"])],
            pointer: Some(KindPointer {
                identifier: "object".to_owned(),
                target: PointerTarget::Datablock(DatablockKind::Object),
            }),
            outputs: vec![
                Socket::output("Location", SocketType::Vector),
                Socket::output("Geometry", SocketType::Geometry),
            ],
            ..NodeKind::new("ObjectInfo", "Object Info", NodeCategory::Input, "Data of a scene object")
        });

        // ====================================================================
        // Flow
        // ====================================================================

        registry.register(NodeKind {
            trees: vec![TreeKind::Geometry],
            role: NodeRole::RepeatInput,
            inputs: vec![Socket::input("Iterations", SocketType::Int).with_value(SocketValue::Int(1))],
            ..NodeKind::new("RepeatInput", "Repeat Input", NodeCategory::Flow, "Start of a repeat zone")
        });

        registry.register(NodeKind {
            trees: vec![TreeKind::Geometry],
            role: NodeRole::RepeatOutput,
            items: Some(ItemsKind::Repeat),
            properties: vec![KindProperty::new("inspection_index", PropValue::Int(0))],
            ..NodeKind::new("RepeatOutput", "Repeat Output", NodeCategory::Flow, "End of a repeat zone")
        });

        registry.register(NodeKind {
            trees: vec![TreeKind::Geometry],
            role: NodeRole::MenuSwitch,
            items: Some(ItemsKind::Enum),
            inputs: vec![Socket::input("Menu", SocketType::Menu)],
            outputs: vec![Socket::output("Output", SocketType::Float)],
            ..NodeKind::new("MenuSwitch", "Menu Switch", NodeCategory::Flow, "Pick an input by menu entry")
        });

        // ====================================================================
        // Texture & output
        // ====================================================================

        registry.register(NodeKind {
            width: 240.0,
            properties: vec![KindProperty::choice("interpolation", &["Linear", "Closest", "Cubic"])],
            pointer: Some(KindPointer {
                identifier: "image".to_owned(),
                target: PointerTarget::Datablock(DatablockKind::Image),
            }),
            inputs: vec![Socket::input("Vector", SocketType::Vector)],
            outputs: vec![
                Socket::output("Color", SocketType::Color),
                Socket::output("Alpha", SocketType::Float),
            ],
            ..NodeKind::new("ImageTexture", "Image Texture", NodeCategory::Texture, "Sample an image")
        });

        registry.register(NodeKind {
            trees: vec![TreeKind::Shader],
            inputs: vec![
                Socket::input("Surface", SocketType::Color),
                Socket::input("Displacement", SocketType::Vector),
            ],
            ..NodeKind::new("MaterialOutput", "Material Output", NodeCategory::Output, "Final material output")
        });

        registry.register(NodeKind {
            trees: vec![TreeKind::Geometry],
            role: NodeRole::Viewer,
            items: Some(ItemsKind::Viewer),
            properties: vec![KindProperty::choice("domain", &["AUTO", "POINT", "FACE"])],
            inputs: vec![Socket::input("Geometry", SocketType::Geometry)],
            ..NodeKind::new("Viewer", "Viewer", NodeCategory::Output, "Inspect geometry and values")
        });

        // ====================================================================
        // Layout
        // ====================================================================

        registry.register(NodeKind {
            width: 150.0,
            role: NodeRole::Frame,
            properties: vec![
                KindProperty::new("label_size", PropValue::Int(20)),
                KindProperty::new("shrink", PropValue::Bool(true)),
            ],
            pointer: Some(KindPointer {
                identifier: "text".to_owned(),
                target: PointerTarget::Datablock(DatablockKind::Text),
            }),
            ..NodeKind::new("Frame", "Frame", NodeCategory::Layout, "Group nodes visually")
        });

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let registry = KindRegistry::builtin();
        let math = registry.get("Math").unwrap();
        assert_eq!(math.property("operation").unwrap().default, PropValue::Enum("ADD".into()));
        assert_eq!(math.inputs[1].identifier, "Value_001");
        assert!(registry.get("Join").unwrap().inputs[0].multi_input);
        assert!(!registry.get("Join").unwrap().allowed_in(TreeKind::Shader));
        assert!(registry.get("Math").unwrap().allowed_in(TreeKind::Shader));
        assert_eq!(registry.kinds_in_category(NodeCategory::Group).count(), 3);
    }
}
