//! # Change Observer
//!
//! Makes mutation of a [`Document`] at any depth observable.
//!
//! The document lives in a shared cell. Handles are cheap views into it:
//! reading a container field (a node, a child list, a geometry, a style map,
//! a JSON object or array inside an opaque payload) returns a new handle
//! whose path is one segment longer, while reading a scalar returns the value
//! itself. Every mutator writes to the underlying document, drops its borrow,
//! then reports exactly one [`ChangeEvent`] to the handler before returning.
//!
//! Handles are created per access and should not be compared. Two reads of
//! the same field give two handles that resolve to the same data. A node
//! handle remembers the node it was created for: the tree keeps a serial per
//! node, and a handle whose node was removed or replaced no longer resolves,
//! even if another node now sits at its old position. Writes through a handle
//! that no longer resolves are dropped with a warning.
//!
//! ```text
//! mirror.document()            DocumentHandle  []
//!   .root()                    NodeHandle      [root]
//!   .children()?               ChildrenHandle  [root, children]
//!   .get(0)?                   NodeHandle      [root, children, 0]
//!   .geometry()?               GeometryHandle  [root, children, 0, geometry]
//!   .set_coordinates(json!([1, 1]))
//!       → ChangeEvent { path: root.children.0.geometry.coordinates, .. }
//! ```

use crate::path::{Path, PathSegment};
use hgss_model::{Document, Geometry, Node, StyleMap};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{trace, warn};

/// A single reported mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: Path,
    /// Previous value, `None` when the field did not exist
    pub old: Option<Value>,
    /// New value, `None` when the field was deleted
    pub new: Option<Value>,
}

/// Callback invoked synchronously for every mutation
pub type ChangeHandler = Rc<dyn Fn(&ChangeEvent)>;

/// Shared storage of an observed document
pub type SharedDocument = Rc<RefCell<Document>>;

/// Wrap a shared document so that mutations through the returned handle (and
/// every handle derived from it) are reported to `on_change`.
///
/// Node identity is tracked per call: structural edits made through another
/// wrapper of the same cell, or directly on the cell, are not seen.
pub fn wrap(target: SharedDocument, on_change: ChangeHandler, prefix: Path) -> DocumentHandle {
    DocumentHandle {
        target: Target::new(target, on_change),
        prefix,
    }
}

/// An observed document: the storage plus the handler its handles report to.
#[derive(Clone)]
pub struct Observed {
    target: Target,
}

impl Observed {
    pub fn new(document: Document, on_change: ChangeHandler) -> Self {
        Self {
            target: Target::new(Rc::new(RefCell::new(document)), on_change),
        }
    }

    /// Fresh root handle
    pub fn handle(&self) -> DocumentHandle {
        DocumentHandle {
            target: self.target.clone(),
            prefix: Path::new(),
        }
    }

    /// Owned copy of the current document state
    pub fn snapshot(&self) -> Document {
        self.target.document.borrow().clone()
    }
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("document", &self.target.document)
            .finish_non_exhaustive()
    }
}

fn snapshot<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

type Outcome = Option<(Option<Value>, Option<Value>)>;

/// Serial of one node and the shapes of its children, in document order
#[derive(Debug)]
struct Shape {
    serial: u64,
    children: Vec<Shape>,
}

/// Serials for every node of the tree, kept in step with the document by
/// the structural mutators
#[derive(Debug)]
struct Layout {
    next: u64,
    root: Shape,
}

impl Layout {
    fn new(root: &Node) -> Self {
        let mut layout = Self {
            next: 0,
            root: Shape {
                serial: 0,
                children: Vec::new(),
            },
        };
        layout.root = layout.shape(root);
        layout
    }

    /// Fresh serials for `node` and its subtree
    fn shape(&mut self, node: &Node) -> Shape {
        self.next += 1;
        let serial = self.next;
        let children = node
            .children
            .iter()
            .flatten()
            .map(|child| self.shape(child))
            .collect();
        Shape { serial, children }
    }

    fn at(&self, loc: &[usize]) -> Option<&Shape> {
        let mut shape = &self.root;
        for &index in loc {
            shape = shape.children.get(index)?;
        }
        Some(shape)
    }

    fn children_mut(&mut self, loc: &[usize]) -> Option<&mut Vec<Shape>> {
        let mut shape = &mut self.root;
        for &index in loc {
            shape = shape.children.get_mut(index)?;
        }
        Some(&mut shape.children)
    }
}

/// Position of a node plus the serial it had when the handle was made
#[derive(Debug, Clone, PartialEq)]
struct NodeRef {
    loc: Vec<usize>,
    serial: u64,
}

#[derive(Clone)]
struct Target {
    document: SharedDocument,
    layout: Rc<RefCell<Layout>>,
    on_change: ChangeHandler,
}

impl Target {
    fn new(document: SharedDocument, on_change: ChangeHandler) -> Self {
        let layout = Layout::new(&document.borrow().root);
        Self {
            document,
            layout: Rc::new(RefCell::new(layout)),
            on_change,
        }
    }

    /// Reference to whatever node currently sits at `loc`
    fn node_ref(&self, loc: Vec<usize>) -> Option<NodeRef> {
        let serial = self.layout.borrow().at(&loc)?.serial;
        Some(NodeRef { loc, serial })
    }

    /// Whether `anchor` still names the node it was created for
    fn resolves(&self, anchor: Option<&NodeRef>) -> bool {
        match anchor {
            Some(node) => {
                self.layout.borrow().at(&node.loc).map(|shape| shape.serial) == Some(node.serial)
            }
            None => true,
        }
    }

    fn read<R>(
        &self,
        anchor: Option<&NodeRef>,
        f: impl FnOnce(&Document) -> Option<R>,
    ) -> Option<R> {
        if !self.resolves(anchor) {
            return None;
        }
        f(&*self.document.borrow())
    }

    /// Run `apply` against the document and report its outcome. `apply`
    /// returns `None` when its target no longer resolves.
    fn mutate(
        &self,
        anchor: Option<&NodeRef>,
        path: Path,
        apply: impl FnOnce(&mut Document) -> Outcome,
    ) {
        self.restructure(anchor, path, |doc, _| apply(doc));
    }

    /// Like `mutate`, for writes that add, remove or replace nodes
    fn restructure(
        &self,
        anchor: Option<&NodeRef>,
        path: Path,
        apply: impl FnOnce(&mut Document, &mut Layout) -> Outcome,
    ) {
        let outcome = if self.resolves(anchor) {
            apply(
                &mut *self.document.borrow_mut(),
                &mut *self.layout.borrow_mut(),
            )
        } else {
            None
        };
        match outcome {
            Some((old, new)) => {
                trace!(path = %path, "document changed");
                (self.on_change)(&ChangeEvent { path, old, new });
            }
            None => warn!(path = %path, "write through a stale handle dropped"),
        }
    }
}

fn node_at<'a>(doc: &'a Document, loc: &[usize]) -> Option<&'a Node> {
    let mut node = &doc.root;
    for &index in loc {
        node = node.children.as_ref()?.get(index)?;
    }
    Some(node)
}

fn node_at_mut<'a>(doc: &'a mut Document, loc: &[usize]) -> Option<&'a mut Node> {
    let mut node = &mut doc.root;
    for &index in loc {
        node = node.children.as_mut()?.get_mut(index)?;
    }
    Some(node)
}

fn node_path(prefix: &Path, loc: &[usize]) -> Path {
    let mut path = prefix.child("root");
    for &index in loc {
        path = path.child("children").child(index);
    }
    path
}

fn locate(node: &Node, id: &str, loc: &mut Vec<usize>) -> bool {
    if node.id == id {
        return true;
    }
    for (index, child) in node.children.iter().flatten().enumerate() {
        loc.push(index);
        if locate(child, id, loc) {
            return true;
        }
        loc.pop();
    }
    false
}

/// Result of reading a field of an opaque payload
#[derive(Debug, Clone)]
pub enum Entry {
    /// The field holds an object or array
    Nested(ValueHandle),
    /// The field holds a scalar
    Scalar(Value),
}

impl Entry {
    pub fn as_handle(&self) -> Option<&ValueHandle> {
        match self {
            Entry::Nested(handle) => Some(handle),
            Entry::Scalar(_) => None,
        }
    }

    pub fn into_handle(self) -> Option<ValueHandle> {
        match self {
            Entry::Nested(handle) => Some(handle),
            Entry::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Entry::Scalar(value) => Some(value),
            Entry::Nested(_) => None,
        }
    }
}

/// Handle on the document root
#[derive(Clone)]
pub struct DocumentHandle {
    target: Target,
    prefix: Path,
}

impl DocumentHandle {
    pub fn path(&self) -> &Path {
        &self.prefix
    }

    pub fn kind(&self) -> String {
        self.target.document.borrow().kind.clone()
    }

    pub fn set_kind(&self, kind: impl Into<String>) {
        self.replace("type", |doc| &mut doc.kind, kind.into());
    }

    pub fn version(&self) -> String {
        self.target.document.borrow().version.clone()
    }

    pub fn set_version(&self, version: impl Into<String>) {
        self.replace("version", |doc| &mut doc.version, version.into());
    }

    pub fn name(&self) -> Option<String> {
        self.target.document.borrow().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.replace_optional("name", |doc| &mut doc.name, Some(name.into()));
    }

    pub fn clear_name(&self) {
        self.replace_optional("name", |doc| &mut doc.name, None);
    }

    pub fn description(&self) -> Option<String> {
        self.target.document.borrow().description.clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.replace_optional(
            "description",
            |doc| &mut doc.description,
            Some(description.into()),
        );
    }

    pub fn clear_description(&self) {
        self.replace_optional("description", |doc| &mut doc.description, None);
    }

    /// Style table of the document
    pub fn styles(&self) -> MapHandle {
        MapHandle {
            target: self.target.clone(),
            path: self.prefix.child("styles"),
            root: MapRoot::DocumentStyles,
        }
    }

    /// Replace the whole style table
    pub fn set_styles(&self, styles: StyleMap) {
        self.replace("styles", |doc| &mut doc.styles, styles);
    }

    pub fn root(&self) -> NodeHandle {
        let serial = self.target.layout.borrow().root.serial;
        self.node_handle(NodeRef {
            loc: Vec::new(),
            serial,
        })
    }

    /// Replace the root node and everything below it. Handles on the old
    /// tree stop resolving.
    pub fn set_root(&self, root: Node) {
        let new = snapshot(&root);
        self.target
            .restructure(None, self.prefix.child("root"), |doc, layout| {
                layout.root = layout.shape(&root);
                let old = std::mem::replace(&mut doc.root, root);
                Some((Some(snapshot(&old)), Some(new)))
            });
    }

    /// Handle on the first node with `id` in preorder. Identifier uniqueness
    /// is the caller's concern.
    pub fn node_by_id(&self, id: &str) -> Option<NodeHandle> {
        let mut loc = Vec::new();
        if !locate(&self.target.document.borrow().root, id, &mut loc) {
            return None;
        }
        let node = self.target.node_ref(loc)?;
        Some(self.node_handle(node))
    }

    /// Owned copy of the document
    pub fn snapshot(&self) -> Document {
        self.target.document.borrow().clone()
    }

    fn node_handle(&self, node: NodeRef) -> NodeHandle {
        NodeHandle {
            target: self.target.clone(),
            path: node_path(&self.prefix, &node.loc),
            node,
        }
    }

    fn replace<T: Serialize>(&self, field: &str, access: fn(&mut Document) -> &mut T, value: T) {
        let new = snapshot(&value);
        self.target.mutate(None, self.prefix.child(field), |doc| {
            let old = std::mem::replace(access(doc), value);
            Some((Some(snapshot(&old)), Some(new)))
        });
    }

    fn replace_optional<T: Serialize>(
        &self,
        field: &str,
        access: fn(&mut Document) -> &mut Option<T>,
        value: Option<T>,
    ) {
        let new = value.as_ref().map(snapshot);
        self.target.mutate(None, self.prefix.child(field), |doc| {
            let old = std::mem::replace(access(doc), value);
            Some((old.as_ref().map(snapshot), new))
        });
    }
}

impl fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("path", &self.prefix.to_string())
            .finish()
    }
}

/// Handle on one node of the tree
#[derive(Clone)]
pub struct NodeHandle {
    target: Target,
    path: Path,
    node: NodeRef,
}

impl NodeHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the node this handle was created for is still in the tree at
    /// the same position
    pub fn exists(&self) -> bool {
        self.read(|_| ()).is_some()
    }

    /// Owned copy of the node and its subtree
    pub fn to_node(&self) -> Option<Node> {
        self.read(Node::clone)
    }

    pub fn id(&self) -> Option<String> {
        self.read(|node| node.id.clone())
    }

    pub fn set_id(&self, id: impl Into<String>) {
        self.replace("id", |node| &mut node.id, id.into());
    }

    pub fn kind(&self) -> Option<String> {
        self.read(|node| node.kind.clone())
    }

    pub fn set_kind(&self, kind: impl Into<String>) {
        self.replace("type", |node| &mut node.kind, kind.into());
    }

    pub fn name(&self) -> Option<String> {
        self.read(|node| node.name.clone()).flatten()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.replace_optional("name", |node| &mut node.name, Some(name.into()));
    }

    pub fn clear_name(&self) {
        self.replace_optional("name", |node| &mut node.name, None);
    }

    pub fn description(&self) -> Option<String> {
        self.read(|node| node.description.clone()).flatten()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.replace_optional(
            "description",
            |node| &mut node.description,
            Some(description.into()),
        );
    }

    pub fn clear_description(&self) {
        self.replace_optional("description", |node| &mut node.description, None);
    }

    /// Label coordinates
    pub fn coordinates(&self) -> Option<Vec<f64>> {
        self.read(|node| node.coordinates.clone()).flatten()
    }

    pub fn set_coordinates(&self, coordinates: Vec<f64>) {
        self.replace_optional(
            "coordinates",
            |node| &mut node.coordinates,
            Some(coordinates),
        );
    }

    pub fn clear_coordinates(&self) {
        self.replace_optional("coordinates", |node| &mut node.coordinates, None);
    }

    pub fn geometry(&self) -> Option<GeometryHandle> {
        self.read(|node| node.geometry.is_some())
            .unwrap_or(false)
            .then(|| GeometryHandle {
                target: self.target.clone(),
                path: self.path.child("geometry"),
                node: self.node.clone(),
            })
    }

    pub fn set_geometry(&self, geometry: Geometry) {
        self.replace_optional("geometry", |node| &mut node.geometry, Some(geometry));
    }

    pub fn clear_geometry(&self) {
        self.replace_optional("geometry", |node| &mut node.geometry, None);
    }

    pub fn style(&self) -> Option<MapHandle> {
        self.read(|node| node.style.is_some())
            .unwrap_or(false)
            .then(|| MapHandle {
                target: self.target.clone(),
                path: self.path.child("style"),
                root: MapRoot::NodeStyle(self.node.clone()),
            })
    }

    pub fn set_style(&self, style: StyleMap) {
        self.replace_optional("style", |node| &mut node.style, Some(style));
    }

    pub fn clear_style(&self) {
        self.replace_optional("style", |node| &mut node.style, None);
    }

    pub fn children(&self) -> Option<ChildrenHandle> {
        self.read(|node| node.children.is_some())
            .unwrap_or(false)
            .then(|| ChildrenHandle {
                target: self.target.clone(),
                path: self.path.child("children"),
                node: self.node.clone(),
            })
    }

    pub fn set_children(&self, children: Vec<Node>) {
        self.replace_children(Some(children));
    }

    pub fn clear_children(&self) {
        self.replace_children(None);
    }

    fn read<R>(&self, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.target
            .read(Some(&self.node), |doc| node_at(doc, &self.node.loc).map(f))
    }

    fn replace<T: Serialize>(&self, field: &str, access: fn(&mut Node) -> &mut T, value: T) {
        let new = snapshot(&value);
        self.target
            .mutate(Some(&self.node), self.path.child(field), |doc| {
                let node = node_at_mut(doc, &self.node.loc)?;
                let old = std::mem::replace(access(node), value);
                Some((Some(snapshot(&old)), Some(new)))
            });
    }

    fn replace_optional<T: Serialize>(
        &self,
        field: &str,
        access: fn(&mut Node) -> &mut Option<T>,
        value: Option<T>,
    ) {
        let new = value.as_ref().map(snapshot);
        self.target
            .mutate(Some(&self.node), self.path.child(field), |doc| {
                let node = node_at_mut(doc, &self.node.loc)?;
                let old = std::mem::replace(access(node), value);
                Some((old.as_ref().map(snapshot), new))
            });
    }

    fn replace_children(&self, children: Option<Vec<Node>>) {
        let new = children.as_ref().map(snapshot);
        self.target
            .restructure(Some(&self.node), self.path.child("children"), |doc, layout| {
                let node = node_at_mut(doc, &self.node.loc)?;
                let shapes: Vec<Shape> = children
                    .iter()
                    .flatten()
                    .map(|child| layout.shape(child))
                    .collect();
                *layout.children_mut(&self.node.loc)? = shapes;
                let old = std::mem::replace(&mut node.children, children);
                Some((old.as_ref().map(snapshot), new))
            });
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// Handle on the ordered child list of a node
#[derive(Clone)]
pub struct ChildrenHandle {
    target: Target,
    path: Path,
    /// Owning node
    node: NodeRef,
}

impl ChildrenHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.target
            .read(Some(&self.node), |doc| {
                Some(node_at(doc, &self.node.loc)?.children.as_ref()?.len())
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<NodeHandle> {
        if index >= self.len() {
            return None;
        }
        let mut loc = self.node.loc.clone();
        loc.push(index);
        let node = self.target.node_ref(loc)?;
        Some(NodeHandle {
            target: self.target.clone(),
            path: self.path.child(index),
            node,
        })
    }

    /// Handles on every child, in order
    pub fn iter(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    /// Replace the child at `index`
    pub fn set(&self, index: usize, node: Node) {
        let new = snapshot(&node);
        self.target
            .restructure(Some(&self.node), self.path.child(index), |doc, layout| {
                let slot = self.list_mut(doc)?.get_mut(index)?;
                let shape = layout.shape(&node);
                *layout.children_mut(&self.node.loc)?.get_mut(index)? = shape;
                let old = std::mem::replace(slot, node);
                Some((Some(snapshot(&old)), Some(new)))
            });
    }

    pub fn push(&self, node: Node) {
        let index = self.len();
        self.insert(index, node);
    }

    /// Insert at `index`, clamped to the list length
    pub fn insert(&self, index: usize, node: Node) {
        let index = index.min(self.len());
        let new = snapshot(&node);
        self.target
            .restructure(Some(&self.node), self.path.child(index), |doc, layout| {
                let children = self.list_mut(doc)?;
                let shape = layout.shape(&node);
                layout.children_mut(&self.node.loc)?.insert(index, shape);
                children.insert(index, node);
                Some((None, Some(new)))
            });
    }

    /// Remove and return the child at `index`
    pub fn remove(&self, index: usize) -> Option<Node> {
        let mut removed = None;
        self.target
            .restructure(Some(&self.node), self.path.child(index), |doc, layout| {
                let children = self.list_mut(doc)?;
                let shapes = layout.children_mut(&self.node.loc)?;
                if index >= children.len() || index >= shapes.len() {
                    return None;
                }
                shapes.remove(index);
                let node = children.remove(index);
                let old = snapshot(&node);
                removed = Some(node);
                Some((Some(old), None))
            });
        removed
    }

    fn list_mut<'a>(&self, doc: &'a mut Document) -> Option<&'a mut Vec<Node>> {
        node_at_mut(doc, &self.node.loc)?.children.as_mut()
    }
}

impl fmt::Debug for ChildrenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildrenHandle")
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// Handle on a node's geometry
#[derive(Clone)]
pub struct GeometryHandle {
    target: Target,
    path: Path,
    /// Owning node
    node: NodeRef,
}

impl GeometryHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn to_geometry(&self) -> Option<Geometry> {
        self.read(Geometry::clone)
    }

    pub fn kind(&self) -> Option<String> {
        self.read(|geometry| geometry.kind.clone())
    }

    pub fn set_kind(&self, kind: impl Into<String>) {
        let kind = kind.into();
        let new = snapshot(&kind);
        self.target
            .mutate(Some(&self.node), self.path.child("type"), |doc| {
                let geometry = node_at_mut(doc, &self.node.loc)?.geometry.as_mut()?;
                let old = std::mem::replace(&mut geometry.kind, kind);
                Some((Some(snapshot(&old)), Some(new)))
            });
    }

    /// Coordinate payload: a nested handle for arrays and objects, the value
    /// itself for scalars
    pub fn coordinates(&self) -> Option<Entry> {
        let value = self.read(|geometry| geometry.coordinates.clone())?;
        Some(entry(
            &self.target,
            self.path.child("coordinates"),
            ValueRoot::Coordinates(self.node.clone()),
            Vec::new(),
            value,
        ))
    }

    pub fn set_coordinates(&self, coordinates: Value) {
        let new = coordinates.clone();
        self.target
            .mutate(Some(&self.node), self.path.child("coordinates"), |doc| {
                let geometry = node_at_mut(doc, &self.node.loc)?.geometry.as_mut()?;
                let old = std::mem::replace(&mut geometry.coordinates, coordinates);
                Some((Some(old), Some(new)))
            });
    }

    fn read<R>(&self, f: impl FnOnce(&Geometry) -> R) -> Option<R> {
        self.target.read(Some(&self.node), |doc| {
            node_at(doc, &self.node.loc)?.geometry.as_ref().map(f)
        })
    }
}

impl fmt::Debug for GeometryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryHandle")
            .field("path", &self.path.to_string())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MapRoot {
    DocumentStyles,
    NodeStyle(NodeRef),
}

impl MapRoot {
    fn anchor(&self) -> Option<&NodeRef> {
        match self {
            MapRoot::DocumentStyles => None,
            MapRoot::NodeStyle(node) => Some(node),
        }
    }

    fn resolve<'a>(&self, doc: &'a Document) -> Option<&'a StyleMap> {
        match self {
            MapRoot::DocumentStyles => Some(&doc.styles),
            MapRoot::NodeStyle(node) => node_at(doc, &node.loc)?.style.as_ref(),
        }
    }

    fn resolve_mut<'a>(&self, doc: &'a mut Document) -> Option<&'a mut StyleMap> {
        match self {
            MapRoot::DocumentStyles => Some(&mut doc.styles),
            MapRoot::NodeStyle(node) => node_at_mut(doc, &node.loc)?.style.as_mut(),
        }
    }
}

/// Handle on a string-keyed style map (document styles or a node's style)
#[derive(Clone)]
pub struct MapHandle {
    target: Target,
    path: Path,
    root: MapRoot,
}

impl MapHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> Vec<String> {
        self.target
            .read(self.root.anchor(), |doc| {
                Some(self.root.resolve(doc)?.keys().cloned().collect())
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.target
            .read(self.root.anchor(), |doc| Some(self.root.resolve(doc)?.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_map(&self) -> Option<StyleMap> {
        self.target
            .read(self.root.anchor(), |doc| self.root.resolve(doc).cloned())
    }

    pub fn get(&self, key: &str) -> Option<Entry> {
        let value = self
            .target
            .read(self.root.anchor(), |doc| self.root.resolve(doc)?.get(key).cloned())?;
        Some(entry(
            &self.target,
            self.path.child(key),
            ValueRoot::Map(self.root.clone()),
            vec![PathSegment::from(key)],
            value,
        ))
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let new = value.clone();
        self.target
            .mutate(self.root.anchor(), self.path.child(key.as_str()), |doc| {
                let old = self.root.resolve_mut(doc)?.insert(key, value);
                Some((old, Some(new)))
            });
    }

    /// Delete `key`. Reported even when the key was absent.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut removed = None;
        self.target
            .mutate(self.root.anchor(), self.path.child(key), |doc| {
                removed = self.root.resolve_mut(doc)?.remove(key);
                Some((removed.clone(), None))
            });
        removed
    }
}

impl fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapHandle")
            .field("path", &self.path.to_string())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ValueRoot {
    /// Pointer starts with a key into the map
    Map(MapRoot),
    /// Pointer starts inside a node's geometry coordinates
    Coordinates(NodeRef),
}

fn step<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match segment {
        PathSegment::Key(key) => value.get(key.as_str()),
        PathSegment::Index(index) => value.get(*index),
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match segment {
        PathSegment::Key(key) => value.get_mut(key.as_str()),
        PathSegment::Index(index) => value.get_mut(*index),
    }
}

impl ValueRoot {
    fn anchor(&self) -> Option<&NodeRef> {
        match self {
            ValueRoot::Map(map) => map.anchor(),
            ValueRoot::Coordinates(node) => Some(node),
        }
    }

    fn resolve<'a>(&self, doc: &'a Document, pointer: &[PathSegment]) -> Option<&'a Value> {
        let (mut current, rest) = match self {
            ValueRoot::Map(map) => {
                let (first, rest) = pointer.split_first()?;
                let PathSegment::Key(key) = first else {
                    return None;
                };
                (map.resolve(doc)?.get(key)?, rest)
            }
            ValueRoot::Coordinates(node) => (
                &node_at(doc, &node.loc)?.geometry.as_ref()?.coordinates,
                pointer,
            ),
        };
        for segment in rest {
            current = step(current, segment)?;
        }
        Some(current)
    }

    fn resolve_mut<'a>(
        &self,
        doc: &'a mut Document,
        pointer: &[PathSegment],
    ) -> Option<&'a mut Value> {
        let (mut current, rest) = match self {
            ValueRoot::Map(map) => {
                let (first, rest) = pointer.split_first()?;
                let PathSegment::Key(key) = first else {
                    return None;
                };
                (map.resolve_mut(doc)?.get_mut(key)?, rest)
            }
            ValueRoot::Coordinates(node) => (
                &mut node_at_mut(doc, &node.loc)?.geometry.as_mut()?.coordinates,
                pointer,
            ),
        };
        for segment in rest {
            current = step_mut(current, segment)?;
        }
        Some(current)
    }
}

fn entry(
    target: &Target,
    path: Path,
    root: ValueRoot,
    pointer: Vec<PathSegment>,
    value: Value,
) -> Entry {
    if value.is_object() || value.is_array() {
        Entry::Nested(ValueHandle {
            target: target.clone(),
            path,
            root,
            pointer,
        })
    } else {
        Entry::Scalar(value)
    }
}

/// Handle on a JSON object or array inside an opaque payload
#[derive(Clone)]
pub struct ValueHandle {
    target: Target,
    path: Path,
    root: ValueRoot,
    pointer: Vec<PathSegment>,
}

impl ValueHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owned copy of the value
    pub fn to_value(&self) -> Option<Value> {
        self.target.read(self.root.anchor(), |doc| {
            self.root.resolve(doc, &self.pointer).cloned()
        })
    }

    /// Number of entries of the object or array
    pub fn len(&self) -> usize {
        self.target
            .read(self.root.anchor(), |doc| {
                match self.root.resolve(doc, &self.pointer)? {
                    Value::Array(items) => Some(items.len()),
                    Value::Object(fields) => Some(fields.len()),
                    _ => None,
                }
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Object field
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.child(PathSegment::from(key))
    }

    /// Array element
    pub fn at(&self, index: usize) -> Option<Entry> {
        self.child(PathSegment::Index(index))
    }

    /// Set an object field
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let new = value.clone();
        self.target
            .mutate(self.root.anchor(), self.path.child(key.as_str()), |doc| {
                let fields = self.resolve_mut(doc)?.as_object_mut()?;
                let old = fields.insert(key, value);
                Some((old, Some(new)))
            });
    }

    /// Set an array element; `index == len` appends
    pub fn set_at(&self, index: usize, value: Value) {
        let new = value.clone();
        self.target
            .mutate(self.root.anchor(), self.path.child(index), |doc| {
                let items = self.resolve_mut(doc)?.as_array_mut()?;
                if index < items.len() {
                    let old = std::mem::replace(&mut items[index], value);
                    Some((Some(old), Some(new)))
                } else if index == items.len() {
                    items.push(value);
                    Some((None, Some(new)))
                } else {
                    None
                }
            });
    }

    pub fn push(&self, value: Value) {
        let index = self.len();
        self.set_at(index, value);
    }

    /// Delete an object field. Reported even when the field was absent.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut removed = None;
        self.target
            .mutate(self.root.anchor(), self.path.child(key), |doc| {
                removed = self.resolve_mut(doc)?.as_object_mut()?.remove(key);
                Some((removed.clone(), None))
            });
        removed
    }

    fn child(&self, segment: PathSegment) -> Option<Entry> {
        let value = self.target.read(self.root.anchor(), |doc| {
            step(self.root.resolve(doc, &self.pointer)?, &segment).cloned()
        })?;
        let mut pointer = self.pointer.clone();
        pointer.push(segment.clone());
        Some(entry(
            &self.target,
            self.path.child(segment),
            self.root.clone(),
            pointer,
            value,
        ))
    }

    fn resolve_mut<'a>(&self, doc: &'a mut Document) -> Option<&'a mut Value> {
        self.root.resolve_mut(doc, &self.pointer)
    }
}

impl fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHandle")
            .field("path", &self.path.to_string())
            .finish()
    }
}
