// SPDX-License-Identifier: MIT OR Apache-2.0
//! Diagnostic breadcrumb from an export or import root.

use crate::reflect::PropertyDescriptor;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
struct Segment {
    piece: String,
    parent: Option<Rc<Segment>>,
}

/// Path from the root object to the one currently being processed.
///
/// Extending a path never changes the original; the trail is shared between
/// siblings and cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct PathTrail {
    last: Option<Rc<Segment>>,
}

impl PathTrail {
    /// Start a trail at a root label
    pub fn root(label: impl Into<String>) -> Self {
        Self::default().add(label)
    }

    /// Extend with a free-form piece
    pub fn add(&self, piece: impl Into<String>) -> Self {
        Self {
            last: Some(Rc::new(Segment {
                piece: piece.into(),
                parent: self.last.clone(),
            })),
        }
    }

    /// Extend with a property step, rendered as `KIND (identifier)`
    pub fn add_property(&self, property: &PropertyDescriptor) -> Self {
        self.add(format!("{} ({})", property.kind.label(), property.identifier))
    }

    /// Extend with a collection item step, rendered as `[i] (name)`
    pub fn add_index(&self, index: usize, name: Option<&str>) -> Self {
        self.add(format!("[{index}] ({})", name.unwrap_or("unnamed")))
    }

    /// Pieces from root to leaf
    pub fn pieces(&self) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut cursor = self.last.as_deref();
        while let Some(segment) = cursor {
            pieces.push(segment.piece.clone());
            cursor = segment.parent.as_deref();
        }
        pieces.reverse();
        pieces
    }

    /// Whether no piece was added yet
    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }
}

impl fmt::Display for PathTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pieces().join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::ScalarKind;

    #[test]
    fn test_extension_is_additive() {
        let root = PathTrail::root("GeometryNodeTree (Tree)");
        let nodes = root.add_property(&PropertyDescriptor::collection("nodes", "Node"));
        let item = nodes.add_index(2, Some("Math"));
        let unnamed = nodes.add_index(0, None);

        assert_eq!(root.to_string(), "GeometryNodeTree (Tree)");
        assert_eq!(
            item.to_string(),
            "GeometryNodeTree (Tree) -> COLLECTION (nodes) -> [2] (Math)"
        );
        assert_eq!(unnamed.pieces().last().unwrap(), "[0] (unnamed)");
    }

    #[test]
    fn test_property_labels() {
        let path = PathTrail::default()
            .add_property(&PropertyDescriptor::simple("hide", ScalarKind::Bool));
        assert_eq!(path.to_string(), "BOOLEAN (hide)");
        assert!(PathTrail::default().is_empty());
    }
}
