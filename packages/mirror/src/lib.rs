//! # HGSS Mirror
//!
//! Keeps derived representations of one canonical HGSS document in sync.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: Document / Node / Geometry           │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ observer: handles that report every write   │
//! │  - (path, old, new) per mutation            │
//! │  - synchronous, before the write returns    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ mirror: regenerate every registered view    │
//! │  - one converter per format                 │
//! │  - failures isolated per format             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Document is source of truth**: mirrors are derived views
//! 2. **Coarse recompute**: any change regenerates every mirror
//! 3. **Converters are collaborators**: the core only sees [`Converter`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hgss_mirror::{Converter, Mirror};
//!
//! let mirror = Mirror::new(document, [("geojson", Box::new(GeoJsonConverter) as Box<dyn Converter>)]);
//!
//! mirror
//!     .document()
//!     .node_by_id("point1")
//!     .and_then(|node| node.geometry())
//!     .map(|geometry| geometry.set_coordinates(json!([1, 1])));
//!
//! let geojson = mirror.get("geojson");
//! ```

mod converter;
mod errors;
mod mirror;
pub mod observer;
mod path;

pub use converter::{Converter, View};
pub use errors::{ConvertError, MirrorError};
pub use mirror::Mirror;
pub use observer::{
    wrap, ChangeEvent, ChangeHandler, ChildrenHandle, DocumentHandle, Entry, GeometryHandle,
    MapHandle, NodeHandle, Observed, ValueHandle,
};
pub use path::{Path, PathSegment};

// Re-export model types for convenience
pub use hgss_model::{Document, Geometry, Node};
