//! # HGSS document model
//!
//! The canonical hierarchical spatial document. Pure data: a [`Document`]
//! holds a style table and exactly one root [`Node`]; nodes form a tree of
//! groups and geometry-bearing leaves.
//!
//! Style properties and geometry coordinates are opaque JSON values so that
//! converters for formats not known here can carry whatever they need.

mod document;
mod error;

pub use document::{
    node_kind_for_geometry, Document, Geometry, Node, StyleMap, DEFAULT_VERSION, FORMAT_TAG,
    GEOMETRY_KINDS, GROUP,
};
pub use error::ValidationError;
