use crate::ConvertError;
use hgss_model::Document;
use serde_json::Value;

/// External representation produced or consumed by a converter
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Structured formats (GeoJSON, ...)
    Json(Value),
    /// Textual formats (KML, ...)
    Text(String),
}

impl View {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            View::Json(value) => Some(value),
            View::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            View::Text(text) => Some(text),
            View::Json(_) => None,
        }
    }

    /// Serialized form suitable for writing to a file
    pub fn render(&self, pretty: bool) -> Result<String, ConvertError> {
        match self {
            View::Json(value) if pretty => Ok(serde_json::to_string_pretty(value)?),
            View::Json(value) => Ok(serde_json::to_string(value)?),
            View::Text(text) => Ok(text.clone()),
        }
    }
}

/// Translates the canonical document to and from one external format
///
/// `from_document` must not mutate the document and should return degenerate
/// output for node shapes it does not support rather than failing. A failure
/// only affects the mirror of this converter.
pub trait Converter {
    /// Build a canonical document from an external representation
    fn to_document(&self, external: &View) -> Result<Document, ConvertError>;

    /// Build the external representation of `document`
    fn from_document(&self, document: &Document) -> Result<View, ConvertError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render() {
        let view = View::Json(json!({ "a": 1 }));
        assert_eq!(view.render(false).unwrap(), r#"{"a":1}"#);
        assert!(view.render(true).unwrap().contains('\n'));

        let text = View::Text("<kml/>".to_string());
        assert_eq!(text.render(true).unwrap(), "<kml/>");
        assert_eq!(text.as_text(), Some("<kml/>"));
        assert!(text.as_json().is_none());
    }
}
