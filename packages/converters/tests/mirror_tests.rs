//! Built-in converters driven through the mirror coordinator

use hgss_converters::{default_converters, GeoJsonConverter, GEOJSON, KML};
use hgss_mirror::{Document, Geometry, Mirror, MirrorError, Node, View};
use serde_json::json;

fn sample() -> Document {
    serde_json::from_value(json!({
        "type": "HGSS",
        "version": "1.0",
        "styles": {},
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
    .unwrap()
}

#[test]
fn test_should_create_mirrors_correctly() {
    let mirror = Mirror::new(sample(), default_converters());

    let geojson = mirror.get(GEOJSON).unwrap();
    let geojson = geojson.as_json().unwrap();
    assert_eq!(geojson["type"], "FeatureCollection");
    assert_eq!(geojson["features"].as_array().unwrap().len(), 1);
    assert_eq!(geojson["features"][0]["properties"]["name"], "Test Point");
    assert_eq!(geojson["features"][0]["geometry"]["coordinates"], json!([0, 0]));

    let kml = mirror.get(KML).unwrap();
    assert!(kml.as_text().unwrap().contains("<coordinates>0,0</coordinates>"));
}

#[test]
fn test_should_update_mirrors_when_document_changes() {
    let mirror = Mirror::new(sample(), default_converters());

    mirror
        .document()
        .root()
        .children()
        .unwrap()
        .get(0)
        .unwrap()
        .geometry()
        .unwrap()
        .set_coordinates(json!([1, 1]));

    let geojson = mirror.get(GEOJSON).unwrap();
    let features = geojson.as_json().unwrap()["features"].as_array().unwrap().clone();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["geometry"]["coordinates"], json!([1, 1]));

    let kml = mirror.get(KML).unwrap();
    let kml = kml.as_text().unwrap();
    assert!(kml.contains("<coordinates>1,1</coordinates>"));
    assert!(!kml.contains("<coordinates>0,0</coordinates>"));
}

#[test]
fn test_group_edits_reach_kml_only_structure() {
    let mirror = Mirror::new(sample(), default_converters());

    let folder = Node::group("folder")
        .with_name("Wells")
        .with_child(Node::feature("w1", Geometry::point(5.0, 6.0)).with_name("W1"));
    mirror.document().root().children().unwrap().push(folder);

    let kml = mirror.get(KML).unwrap();
    assert!(kml.as_text().unwrap().contains("<name>Wells</name>"));

    let geojson = mirror.get(GEOJSON).unwrap();
    let features = geojson.as_json().unwrap()["features"].as_array().unwrap().clone();
    assert_eq!(features.len(), 2);
    assert_eq!(features[1]["id"], "w1");
}

#[test]
fn test_load_from_geojson_replaces_every_mirror() {
    let mirror = Mirror::new(sample(), default_converters());

    let external = View::Json(json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "id": "harbour",
            "geometry": { "type": "Point", "coordinates": [10, 20] },
            "properties": { "name": "Harbour" }
        }]
    }));
    mirror.load(GEOJSON, &external).unwrap();

    let kml = mirror.get(KML).unwrap();
    let kml = kml.as_text().unwrap();
    assert!(kml.contains("<name>Harbour</name>"));
    assert!(!kml.contains("Test Point"));

    let geojson = mirror.get(GEOJSON).unwrap();
    assert_eq!(geojson.as_json().unwrap()["features"][0]["id"], "harbour");
}

#[test]
fn test_load_from_kml_replaces_every_mirror() {
    let mirror = Mirror::new(sample(), default_converters());

    let external = View::Text(
        r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
            <name>Port</name>
            <Folder><name>Docks</name>
                <Placemark><name>North Pier</name><Point><coordinates>10,20</coordinates></Point></Placemark>
            </Folder>
        </Document></kml>"#
            .to_string(),
    );
    mirror.load(KML, &external).unwrap();

    let snapshot = mirror.snapshot();
    assert_eq!(snapshot.name.as_deref(), Some("Port"));
    assert!(snapshot.root.find("point1").is_none());
    assert!(snapshot.root.find("docks").unwrap().is_group());

    let geojson = mirror.get(GEOJSON).unwrap();
    let feature = &geojson.as_json().unwrap()["features"][0];
    assert_eq!(feature["id"], "north_pier");
    assert_eq!(feature["geometry"]["coordinates"], json!([10.0, 20.0]));

    let kml = mirror.get(KML).unwrap();
    assert!(kml.as_text().unwrap().contains("<name>North Pier</name>"));
}

#[test]
fn test_load_from_malformed_kml_is_rejected() {
    let mirror = Mirror::new(sample(), default_converters());

    let error = mirror
        .load(KML, &View::Text("<kml><Document>".to_string()))
        .unwrap_err();

    assert!(matches!(error, MirrorError::Conversion { ref format, .. } if format == "kml"));
    assert_eq!(mirror.snapshot(), sample());
}

#[test]
fn test_geojson_round_trip_keeps_features() {
    let converter = GeoJsonConverter;
    let exported = converter.export(&sample());
    let imported = converter.import(&exported);

    assert_eq!(imported.features(), 1);
    let point = imported.root.find("point1").unwrap();
    assert_eq!(point.name.as_deref(), Some("Test Point"));
    assert_eq!(point.geometry.as_ref().unwrap().coordinates, json!([0, 0]));
}
