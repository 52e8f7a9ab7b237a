//! # HGSS Converters
//!
//! Reference [`Converter`] implementations for the mirror coordinator.
//!
//! | format    | view          | export | import |
//! |-----------|---------------|--------|--------|
//! | `geojson` | `View::Json`  | yes    | yes    |
//! | `kml`     | `View::Text`  | yes    | yes    |

pub mod geojson;
pub mod kml;

pub use geojson::{Feature, FeatureCollection, GeoJsonConverter};
pub use kml::{hex_to_kml_color, kml_color_to_hex, KmlConverter, KmlOptions};

use hgss_mirror::Converter;

pub const GEOJSON: &str = "geojson";
pub const KML: &str = "kml";

/// Every built-in converter, keyed by format name
pub fn default_converters() -> Vec<(String, Box<dyn Converter>)> {
    vec![
        (
            GEOJSON.to_string(),
            Box::new(GeoJsonConverter) as Box<dyn Converter>,
        ),
        (
            KML.to_string(),
            Box::new(KmlConverter::default()) as Box<dyn Converter>,
        ),
    ]
}

/// Built-in converter registered under `format`
pub fn converter_for(format: &str) -> Option<Box<dyn Converter>> {
    match format {
        GEOJSON => Some(Box::new(GeoJsonConverter)),
        KML => Some(Box::new(KmlConverter::default())),
        _ => None,
    }
}

/// File extension used when writing a format's mirror
pub fn extension_for(format: &str) -> &str {
    match format {
        GEOJSON => "geojson",
        KML => "kml",
        _ => "txt",
    }
}
