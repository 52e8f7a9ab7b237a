//! GeoJSON FeatureCollection ⇄ HGSS
//!
//! Export flattens the tree: every node carrying a geometry becomes one
//! feature, in preorder, and groups contribute nothing. Import builds a
//! single root group with one node per feature.

use hgss_mirror::{ConvertError, Converter, View};
use hgss_model::{node_kind_for_geometry, Document, Geometry, Node, GROUP};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub const FEATURE_COLLECTION: &str = "FeatureCollection";
pub const FEATURE: &str = "Feature";

/// Property carrying a node's label coordinates
pub const LABEL_COORDINATES: &str = "label_coordinates";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    /// String or number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonConverter;

impl GeoJsonConverter {
    /// Parse a feature collection into an HGSS document
    pub fn import(&self, collection: &FeatureCollection) -> Document {
        let children = collection
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| feature_to_node(feature, index))
            .collect();

        let mut root = Node::group("root");
        root.children = Some(children);
        Document::new(root)
    }

    /// Flatten a document into a feature collection
    pub fn export(&self, document: &Document) -> FeatureCollection {
        let mut features = Vec::new();
        document.root.walk(&mut |node| {
            if let Some(feature) = node_to_feature(node) {
                features.push(feature);
            }
        });
        debug!(features = features.len(), "GeoJSON export");

        FeatureCollection {
            kind: FEATURE_COLLECTION.to_string(),
            features,
        }
    }
}

impl Converter for GeoJsonConverter {
    fn to_document(&self, external: &View) -> Result<Document, ConvertError> {
        let value = external
            .as_json()
            .ok_or(ConvertError::UnexpectedView { expected: "JSON" })?;

        let kind = value.get("type").and_then(Value::as_str);
        if kind != Some(FEATURE_COLLECTION) {
            return Err(ConvertError::Malformed(format!(
                "expected a {}, found {}",
                FEATURE_COLLECTION,
                kind.unwrap_or("no type")
            )));
        }

        let collection: FeatureCollection = serde_json::from_value(value.clone())?;
        Ok(self.import(&collection))
    }

    fn from_document(&self, document: &Document) -> Result<View, ConvertError> {
        Ok(View::Json(serde_json::to_value(self.export(document))?))
    }
}

fn feature_id(id: Option<&Value>, index: usize) -> String {
    match id {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => format!("feature_{}", index),
    }
}

fn feature_to_node(feature: &Feature, index: usize) -> Node {
    let kind = feature
        .geometry
        .as_ref()
        .map(|geometry| node_kind_for_geometry(&geometry.kind))
        .unwrap_or(GROUP);

    let mut node = Node {
        id: feature_id(feature.id.as_ref(), index),
        kind: kind.to_string(),
        name: None,
        description: None,
        coordinates: None,
        geometry: feature.geometry.clone(),
        style: None,
        children: None,
    };

    if let Some(properties) = &feature.properties {
        node.name = properties
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        node.description = properties
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        node.coordinates = properties
            .get(LABEL_COORDINATES)
            .and_then(Value::as_array)
            .map(|coords| coords.iter().filter_map(Value::as_f64).collect());
    }

    node
}

fn node_to_feature(node: &Node) -> Option<Feature> {
    let geometry = node.geometry.clone()?;

    let mut properties = Map::new();
    if let Some(name) = &node.name {
        properties.insert("name".to_string(), Value::from(name.as_str()));
    }
    if let Some(description) = &node.description {
        properties.insert("description".to_string(), Value::from(description.as_str()));
    }
    if let Some(coordinates) = &node.coordinates {
        properties.insert(LABEL_COORDINATES.to_string(), Value::from(coordinates.clone()));
    }

    Some(Feature {
        kind: FEATURE.to_string(),
        id: (!node.id.is_empty()).then(|| Value::from(node.id.as_str())),
        geometry: Some(geometry),
        properties: Some(properties),
    })
}
