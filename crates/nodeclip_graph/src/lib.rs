// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reflective node library for nodeclip.
//!
//! This crate provides the host side of clipboard copy/paste:
//! - Geometry and shader node trees with interfaces, nodes, sockets and links
//! - Repeat zones, menu switches, viewers, frames and nested groups
//! - Materials embedding a tree, plus images, objects and texts
//! - A reflected schema and an [`ObjectModel`](nodeclip_engine::ObjectModel)
//!   adapter over the library
//! - The built-in handler catalog used by the export/import engine
//!
//! ## Architecture
//!
//! A [`Library`] owns all data and enforces the editing rules (unique names,
//! socket refresh, link validity). The [`model`] module exposes it through
//! reflection using copyable [`Handle`]s, and [`builtin_registry`] supplies the
//! handlers that rebuild collections through library operations on import.

pub mod datablock;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod interface;
pub mod kinds;
pub mod library;
pub mod link;
pub mod model;
pub mod node;
pub mod schema;
pub mod socket;
pub mod tree;

pub use datablock::{Datablock, DatablockKind};
pub use error::{GraphError, Result};
pub use handlers::builtin_registry;
pub use ids::{DatablockId, ItemId, LinkId, MaterialId, NodeId, SocketId, TreeId};
pub use interface::{Interface, InterfaceItem, InterfaceItemKind};
pub use kinds::{KindRegistry, NodeKind, NodeRole};
pub use library::{Library, Material, HOST_VERSION};
pub use link::Link;
pub use model::{CollectionRef, Handle};
pub use node::{ItemsKind, Node, NodeItem, PropValue};
pub use socket::{Socket, SocketDirection, SocketType, SocketValue};
pub use tree::{NodeTree, TreeKind};
