// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifiers for library objects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

define_id!(
    /// Unique identifier for a node tree
    TreeId
);
define_id!(
    /// Unique identifier for a node
    NodeId
);
define_id!(
    /// Unique identifier for a socket
    SocketId
);
define_id!(
    /// Unique identifier for a link
    LinkId
);
define_id!(
    /// Unique identifier for an interface item or a node item
    ItemId
);
define_id!(
    /// Unique identifier for a material
    MaterialId
);
define_id!(
    /// Unique identifier for an image, object or text datablock
    DatablockId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct() {
        assert_ne!(NodeId::new(), NodeId::new());
        assert_ne!(TreeId::default(), TreeId::default());
    }
}
