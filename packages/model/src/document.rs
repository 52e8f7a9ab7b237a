use crate::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Format tag every HGSS document carries
pub const FORMAT_TAG: &str = "HGSS";

/// Version written by documents created in this crate
pub const DEFAULT_VERSION: &str = "1.0";

/// Type tag of container nodes
pub const GROUP: &str = "Group";

/// Geometry kinds a node type tag may mirror
pub const GEOMETRY_KINDS: [&str; 7] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// Opaque property bag used for styles
pub type StyleMap = Map<String, Value>;

/// Root of an HGSS document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Style identifier → style properties (opaque)
    #[serde(default)]
    pub styles: StyleMap,
    pub root: Node,
}

/// Element of the document tree
///
/// A node with children is a container and a node with a geometry is a leaf.
/// A node carrying neither is a degenerate leaf and is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// `"Group"` or a geometry kind
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Label position, two or three numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
}

/// Geometry payload. The coordinate shape depends on `kind` and is never
/// interpreted outside converters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Value,
}

impl Document {
    pub fn new(root: Node) -> Self {
        Self {
            kind: FORMAT_TAG.to_string(),
            version: DEFAULT_VERSION.to_string(),
            name: None,
            description: None,
            styles: StyleMap::new(),
            root,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_style(mut self, id: impl Into<String>, properties: Value) -> Self {
        self.styles.insert(id.into(), properties);
        self
    }

    /// Check the document header
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.kind != FORMAT_TAG {
            return Err(ValidationError::InvalidType(self.kind.clone()));
        }
        if self.version.is_empty() {
            return Err(ValidationError::MissingVersion);
        }
        Ok(())
    }

    /// Number of nodes carrying a geometry
    pub fn features(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |node| {
            if node.geometry.is_some() {
                count += 1;
            }
        });
        count
    }
}

impl Node {
    /// Empty container node
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: GROUP.to_string(),
            name: None,
            description: None,
            coordinates: None,
            geometry: None,
            style: None,
            children: Some(Vec::new()),
        }
    }

    /// Leaf node whose type tag follows its geometry
    pub fn feature(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            kind: node_kind_for_geometry(&geometry.kind).to_string(),
            name: None,
            description: None,
            coordinates: None,
            geometry: Some(geometry),
            style: None,
            children: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_coordinates(mut self, coordinates: Vec<f64>) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_style(mut self, style: StyleMap) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind == GROUP
    }

    /// First node with `id` in preorder, starting at `self`
    pub fn find(&self, id: &str) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter()
            .flatten()
            .find_map(|child| child.find(id))
    }

    /// Visit `self` and every descendant in preorder
    pub fn walk<F: FnMut(&Node)>(&self, visit: &mut F) {
        visit(self);
        for child in self.children.iter().flatten() {
            child.walk(visit);
        }
    }
}

impl Geometry {
    pub fn new(kind: impl Into<String>, coordinates: Value) -> Self {
        Self {
            kind: kind.into(),
            coordinates,
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new("Point", Value::from(vec![x, y]))
    }
}

/// Map a geometry kind to the node type tag that represents it
pub fn node_kind_for_geometry(kind: &str) -> &str {
    if GEOMETRY_KINDS.contains(&kind) {
        kind
    } else {
        GROUP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document::new(
            Node::group("root")
                .with_child(Node::feature("a", Geometry::point(0.0, 0.0)).with_name("A"))
                .with_child(
                    Node::group("folder")
                        .with_child(Node::feature("b", Geometry::point(1.0, 2.0))),
                ),
        )
    }

    #[test]
    fn test_deserialize_wire_shape() {
        let doc: Document = serde_json::from_value(json!({
            "type": "HGSS",
            "version": "1.0",
            "styles": { "#red": { "fill": "#ff0000" } },
            "root": {
                "id": "root",
                "type": "Group",
                "children": [{
                    "id": "point1",
                    "type": "Point",
                    "name": "Test Point",
                    "geometry": { "type": "Point", "coordinates": [0, 0] }
                }]
            }
        }))
        .unwrap();

        assert_eq!(doc.kind, "HGSS");
        assert_eq!(doc.styles["#red"]["fill"], "#ff0000");
        let child = &doc.root.children.as_ref().unwrap()[0];
        assert_eq!(child.name.as_deref(), Some("Test Point"));
        assert_eq!(child.geometry.as_ref().unwrap().coordinates, json!([0, 0]));
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let value = serde_json::to_value(Node::feature("p", Geometry::point(0.0, 0.0))).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("name"));
        assert!(!object.contains_key("children"));
        assert_eq!(object["type"], "Point");
    }

    #[test]
    fn test_validate() {
        let mut doc = sample();
        assert!(doc.validate().is_ok());

        doc.version.clear();
        assert_eq!(doc.validate(), Err(ValidationError::MissingVersion));

        doc.kind = "GeoJSON".to_string();
        assert_eq!(
            doc.validate(),
            Err(ValidationError::InvalidType("GeoJSON".to_string()))
        );
    }

    #[test]
    fn test_find_and_walk() {
        let doc = sample();
        assert_eq!(doc.root.find("b").map(|n| n.kind.as_str()), Some("Point"));
        assert!(doc.root.find("missing").is_none());

        let mut ids = Vec::new();
        doc.root.walk(&mut |node| ids.push(node.id.clone()));
        assert_eq!(ids, vec!["root", "a", "folder", "b"]);
        assert_eq!(doc.features(), 2);
    }

    #[test]
    fn test_node_kind_for_geometry() {
        assert_eq!(node_kind_for_geometry("Polygon"), "Polygon");
        assert_eq!(node_kind_for_geometry("GeometryCollection"), "GeometryCollection");
        assert_eq!(node_kind_for_geometry("Circle"), GROUP);
    }
}
