//! HGSS ⇄ KML
//!
//! Export: groups become `<Folder>`s and geometry nodes become
//! `<Placemark>`s. `Point`, `LineString` and `Polygon` (outer ring) are
//! written; other geometry kinds produce a placemark without geometry.
//! Document styles whose id starts with `#` become shared `<Style>` elements.
//!
//! Import reads the same subset back. `<Style id="x">` becomes the document
//! style `#x`, folders become groups and placemarks become leaves whose id is
//! the lowercased name with spaces replaced by `_`. Altitudes are dropped.

use hgss_mirror::{ConvertError, Converter, View};
use hgss_model::{Document, Geometry, Node, StyleMap};
use roxmltree::Node as XmlNode;
use serde_json::{json, Value};
use tracing::debug;

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// Name written when the document has none
pub const DEFAULT_NAME: &str = "HGSS Export";

/// Options for KML output
#[derive(Debug, Clone)]
pub struct KmlOptions {
    /// Pretty print with indentation
    pub pretty: bool,
    /// Indentation string
    pub indent: String,
}

impl Default for KmlOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            indent: "  ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KmlConverter {
    options: KmlOptions,
}

impl KmlConverter {
    pub fn new(options: KmlOptions) -> Self {
        Self { options }
    }

    /// Render `document` as a KML string
    pub fn export(&self, document: &Document) -> String {
        let mut ctx = Context::new(self.options.clone());

        ctx.add_line("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        ctx.add_line(&format!("<kml xmlns=\"{}\">", KML_NAMESPACE));
        ctx.add_line("<Document>");
        ctx.indent();

        let name = document.name.as_deref().unwrap_or(DEFAULT_NAME);
        ctx.add_line(&text_element("name", name));

        for (id, style) in &document.styles {
            if let Some(id) = id.strip_prefix('#') {
                write_style(id, style, &mut ctx);
            }
        }

        write_node(&document.root, &mut ctx);

        ctx.dedent();
        ctx.add_line("</Document>");
        ctx.add_line("</kml>");

        debug!(bytes = ctx.buffer.len(), "KML export");
        ctx.get_output()
    }

    /// Build a document from KML text. The `<Document>` name names both the
    /// document and its root group.
    pub fn import(&self, text: &str) -> Result<Document, ConvertError> {
        let xml = roxmltree::Document::parse(text)
            .map_err(|e| ConvertError::Malformed(format!("invalid KML: {}", e)))?;
        let kml = xml.root_element();
        if kml.tag_name().name() != "kml" {
            return Err(ConvertError::Malformed(format!(
                "expected a kml element, found {}",
                kml.tag_name().name()
            )));
        }

        let mut document = Document::new(Node::group("root"));
        if let Some(source) = element(kml, "Document") {
            for style in elements(source, "Style") {
                if let Some(id) = style.attribute("id") {
                    document.styles.insert(format!("#{}", id), read_style(style));
                }
            }
            document.name = child_text(source, "name");
            document.root.name = document.name.clone();
            document.root.children = Some(read_children(source));
        }

        debug!(
            features = document.features(),
            styles = document.styles.len(),
            "KML import"
        );
        Ok(document)
    }
}

impl Converter for KmlConverter {
    fn to_document(&self, external: &View) -> Result<Document, ConvertError> {
        let text = external
            .as_text()
            .ok_or(ConvertError::UnexpectedView { expected: "text" })?;
        self.import(text)
    }

    fn from_document(&self, document: &Document) -> Result<View, ConvertError> {
        Ok(View::Text(self.export(document)))
    }
}

struct Context {
    options: KmlOptions,
    depth: usize,
    buffer: String,
}

impl Context {
    fn new(options: KmlOptions) -> Self {
        Self {
            options,
            depth: 0,
            buffer: String::new(),
        }
    }

    fn add(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn add_line(&mut self, text: &str) {
        if self.options.pretty {
            self.add_indent();
        }
        self.add(text);
        self.add("\n");
    }

    fn add_indent(&mut self) {
        for _ in 0..self.depth {
            self.buffer.push_str(&self.options.indent);
        }
    }

    fn indent(&mut self) {
        self.depth += 1;
    }

    fn dedent(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
        }
    }

    fn open(&mut self, tag: &str) {
        self.add_line(&format!("<{}>", tag));
        self.indent();
    }

    fn close(&mut self, tag: &str) {
        self.dedent();
        self.add_line(&format!("</{}>", tag));
    }

    fn get_output(self) -> String {
        self.buffer
    }
}

fn write_style(id: &str, style: &Value, ctx: &mut Context) {
    ctx.add_line(&format!("<Style id=\"{}\">", escape_xml(id)));
    ctx.indent();

    if let Some(fill) = style.get("fill").and_then(Value::as_str) {
        ctx.open("PolyStyle");
        ctx.add_line(&text_element("color", &hex_to_kml_color(fill)));
        ctx.close("PolyStyle");
    }

    let stroke = style.get("stroke").and_then(Value::as_str);
    let width = style.get("stroke-width").and_then(Value::as_f64);
    if stroke.is_some() || width.is_some() {
        ctx.open("LineStyle");
        if let Some(stroke) = stroke {
            ctx.add_line(&text_element("color", &hex_to_kml_color(stroke)));
        }
        if let Some(width) = width {
            ctx.add_line(&text_element("width", &width.to_string()));
        }
        ctx.close("LineStyle");
    }

    ctx.dedent();
    ctx.add_line("</Style>");
}

fn write_node(node: &Node, ctx: &mut Context) {
    if node.is_group() {
        ctx.open("Folder");
        if let Some(name) = &node.name {
            ctx.add_line(&text_element("name", name));
        }
        for child in node.children.iter().flatten() {
            write_node(child, ctx);
        }
        ctx.close("Folder");
    } else if let Some(geometry) = &node.geometry {
        ctx.open("Placemark");
        if let Some(name) = &node.name {
            ctx.add_line(&text_element("name", name));
        }
        if let Some(description) = &node.description {
            ctx.add_line(&text_element("description", description));
        }
        if let Some(url) = node.style.as_ref().and_then(style_url) {
            ctx.add_line(&text_element("styleUrl", url));
        }
        write_geometry(geometry, ctx);
        ctx.close("Placemark");
    }
}

fn style_url(style: &StyleMap) -> Option<&str> {
    style.get("styleUrl").and_then(Value::as_str)
}

fn write_geometry(geometry: &Geometry, ctx: &mut Context) {
    match geometry.kind.as_str() {
        "Point" => {
            ctx.open("Point");
            ctx.add_line(&text_element("coordinates", &position(&geometry.coordinates)));
            ctx.close("Point");
        }
        "LineString" => {
            ctx.open("LineString");
            ctx.add_line(&text_element("coordinates", &positions(&geometry.coordinates)));
            ctx.close("LineString");
        }
        "Polygon" => {
            let ring = geometry.coordinates.get(0).unwrap_or(&Value::Null);
            ctx.open("Polygon");
            ctx.open("outerBoundaryIs");
            ctx.open("LinearRing");
            ctx.add_line(&text_element("coordinates", &positions(ring)));
            ctx.close("LinearRing");
            ctx.close("outerBoundaryIs");
            ctx.close("Polygon");
        }
        _ => {}
    }
}

/// `[lon, lat, alt?]` → `lon,lat[,alt]`
fn position(value: &Value) -> String {
    value
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .map(|part| part.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// `[[lon, lat], ...]` → `lon,lat lon,lat ...`
fn positions(value: &Value) -> String {
    value
        .as_array()
        .map(|items| items.iter().map(position).collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn elements<'a, 'input: 'a>(
    parent: XmlNode<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    parent
        .children()
        .filter(move |child| child.is_element() && child.tag_name().name() == tag)
}

fn element<'a, 'input: 'a>(
    parent: XmlNode<'a, 'input>,
    tag: &'static str,
) -> Option<XmlNode<'a, 'input>> {
    elements(parent, tag).next()
}

/// Trimmed text of the first `tag` child, `None` when missing or blank
fn child_text(parent: XmlNode<'_, '_>, tag: &'static str) -> Option<String> {
    element(parent, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn read_style(style: XmlNode<'_, '_>) -> Value {
    let mut properties = StyleMap::new();

    if let Some(poly) = element(style, "PolyStyle") {
        if let Some(color) = child_text(poly, "color") {
            properties.insert("fill".to_string(), json!(kml_color_to_hex(&color)));
        }
        if child_text(poly, "fill").as_deref() == Some("1") {
            properties.insert("fill-opacity".to_string(), json!(1.0));
        }
    }

    if let Some(line) = element(style, "LineStyle") {
        if let Some(color) = child_text(line, "color") {
            properties.insert("stroke".to_string(), json!(kml_color_to_hex(&color)));
        }
        if let Some(width) = child_text(line, "width").and_then(|w| w.parse::<f64>().ok()) {
            properties.insert("stroke-width".to_string(), json!(width));
        }
    }

    Value::Object(properties)
}

/// Folders and placemarks of `container`, in document order
fn read_children(container: XmlNode<'_, '_>) -> Vec<Node> {
    container
        .children()
        .filter(|child| child.is_element())
        .filter_map(|child| match child.tag_name().name() {
            "Folder" => Some(read_folder(child)),
            "Placemark" => Some(read_placemark(child)),
            _ => None,
        })
        .collect()
}

fn read_folder(folder: XmlNode<'_, '_>) -> Node {
    let name = child_text(folder, "name");
    let mut node = Node::group(generate_id(name.as_deref().unwrap_or_default()));
    node.name = name;
    node.children = Some(read_children(folder));
    node
}

fn read_placemark(placemark: XmlNode<'_, '_>) -> Node {
    let name = child_text(placemark, "name");
    let id = generate_id(name.as_deref().unwrap_or_default());

    let mut node = match read_geometry(placemark) {
        Some(geometry) => Node::feature(id, geometry),
        None => {
            let mut node = Node::group(id);
            node.children = None;
            node
        }
    };
    node.name = name;
    node.description = child_text(placemark, "description");
    if let Some(url) = child_text(placemark, "styleUrl") {
        let mut style = StyleMap::new();
        style.insert("styleUrl".to_string(), json!(url));
        node.style = Some(style);
    }
    node
}

fn read_geometry(placemark: XmlNode<'_, '_>) -> Option<Geometry> {
    if let Some(point) = element(placemark, "Point") {
        let position = parse_coordinates(&child_text(point, "coordinates")?)
            .into_iter()
            .next()?;
        return Some(Geometry::new("Point", json!(position)));
    }

    if let Some(line) = element(placemark, "LineString") {
        let path = parse_coordinates(&child_text(line, "coordinates")?);
        return (!path.is_empty()).then(|| Geometry::new("LineString", json!(path)));
    }

    let ring = element(placemark, "Polygon")
        .and_then(|polygon| element(polygon, "outerBoundaryIs"))
        .and_then(|boundary| element(boundary, "LinearRing"))
        .and_then(|ring| child_text(ring, "coordinates"))?;
    let ring = parse_coordinates(&ring);
    (!ring.is_empty()).then(|| Geometry::new("Polygon", json!([ring])))
}

/// `lon,lat[,alt] lon,lat ...` → `[[lon, lat], ...]`. Tuples that do not
/// start with two numbers are skipped.
fn parse_coordinates(text: &str) -> Vec<[f64; 2]> {
    text.split_whitespace()
        .filter_map(|tuple| {
            let mut parts = tuple.split(',');
            let lon = parts.next()?.trim().parse().ok()?;
            let lat = parts.next()?.trim().parse().ok()?;
            Some([lon, lat])
        })
        .collect()
}

/// Node id derived from a KML name: `"Zone A"` → `"zone_a"`
fn generate_id(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

fn text_element(tag: &str, text: &str) -> String {
    format!("<{}>{}</{}>", tag, escape_xml(text), tag)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// KML `AABBGGRR` → `#RRGGBB`; anything else gives black
pub fn kml_color_to_hex(color: &str) -> String {
    if color.len() != 8 || !color.is_ascii() {
        return "#000000".to_string();
    }
    format!("#{}{}{}", &color[6..8], &color[4..6], &color[2..4])
}

/// `#RRGGBB` → opaque KML `ffBBGGRR`; anything else gives opaque black
pub fn hex_to_kml_color(color: &str) -> String {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() != 6 || !hex.is_ascii() {
        return "ff000000".to_string();
    }
    format!("ff{}{}{}", &hex[4..6], &hex[2..4], &hex[0..2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        let mut document = Document::new(
            Node::group("root")
                .with_name("Layers")
                .with_child(
                    Node::feature("well", Geometry::new("Point", json!([1.5, 2, 10])))
                        .with_name("Well & Pump")
                        .with_description("<fresh>")
                        .with_style(
                            json!({ "styleUrl": "#blue" }).as_object().cloned().unwrap(),
                        ),
                )
                .with_child(Node::feature(
                    "field",
                    Geometry::new("Polygon", json!([[[0, 0], [1, 0], [1, 1], [0, 0]]])),
                ))
                .with_child(Node::feature(
                    "road",
                    Geometry::new("LineString", json!([[0, 0], [3, 4]])),
                )),
        )
        .with_name("Survey")
        .with_style("#blue", json!({ "fill": "#0000ff", "stroke": "#112233", "stroke-width": 2.5 }))
        .with_style("shared", json!({ "fill": "#ffffff" }));
        document.description = Some("ignored".to_string());
        document
    }

    #[test]
    fn test_export_structure() {
        let kml = KmlConverter::default().export(&sample());
        println!("Generated KML:\n{}", kml);

        assert!(kml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(kml.contains("<kml xmlns=\"http://www.opengis.net/kml/2.2\">"));
        assert!(kml.contains("  <name>Survey</name>"));
        assert!(kml.contains("<Folder>"));
        assert!(kml.contains("<name>Layers</name>"));
        assert!(kml.trim_end().ends_with("</kml>"));
    }

    #[test]
    fn test_export_geometries() {
        let kml = KmlConverter::default().export(&sample());

        assert!(kml.contains("<coordinates>1.5,2,10</coordinates>"));
        assert!(kml.contains("<coordinates>0,0 1,0 1,1 0,0</coordinates>"));
        assert!(kml.contains("<outerBoundaryIs>"));
        assert!(kml.contains("<LineString>"));
        assert!(kml.contains("<coordinates>0,0 3,4</coordinates>"));
    }

    #[test]
    fn test_export_escapes_text() {
        let kml = KmlConverter::default().export(&sample());

        assert!(kml.contains("<name>Well &amp; Pump</name>"));
        assert!(kml.contains("<description>&lt;fresh&gt;</description>"));
        assert!(kml.contains("<styleUrl>#blue</styleUrl>"));
    }

    #[test]
    fn test_export_styles() {
        let kml = KmlConverter::default().export(&sample());

        assert!(kml.contains("<Style id=\"blue\">"));
        assert!(kml.contains("<color>ffff0000</color>"));
        assert!(kml.contains("<color>ff332211</color>"));
        assert!(kml.contains("<width>2.5</width>"));
        assert!(!kml.contains("id=\"shared\""));
    }

    #[test]
    fn test_default_name_and_compact_output() {
        let document = Document::new(Node::group("root"));
        let kml = KmlConverter::new(KmlOptions {
            pretty: false,
            indent: String::new(),
        })
        .export(&document);

        assert!(kml.contains("\n<name>HGSS Export</name>\n"));
        assert!(kml.contains("<Folder>\n</Folder>"));
    }

    #[test]
    fn test_unsupported_shapes_are_degenerate() {
        let document = Document::new(
            Node::group("root")
                .with_child(Node::feature(
                    "multi",
                    Geometry::new("MultiPoint", json!([[0, 0], [1, 1]])),
                ).with_name("Many"))
                .with_child(Node::feature("broken", Geometry::new("Polygon", json!("oops")))),
        );

        let kml = KmlConverter::default().export(&document);
        assert!(kml.contains("<name>Many</name>"));
        assert!(!kml.contains("MultiPoint"));
        assert!(kml.contains("<coordinates></coordinates>"));
    }

    const ZONES: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>Krakow Zones</name>
    <Style id="zoneStyle">
      <PolyStyle>
        <color>ffcccccc</color>
        <fill>1</fill>
      </PolyStyle>
      <LineStyle>
        <color>ff444444</color>
        <width>2</width>
      </LineStyle>
    </Style>
    <Folder>
      <name>Zones</name>
      <Placemark>
        <name>Zone A</name>
        <description>Old town</description>
        <styleUrl>#zoneStyle</styleUrl>
        <Polygon>
          <outerBoundaryIs>
            <LinearRing>
              <coordinates>
                19.938,50.000 19.950,50.000 19.950,50.010 19.938,50.000
              </coordinates>
            </LinearRing>
          </outerBoundaryIs>
        </Polygon>
      </Placemark>
      <Placemark>
        <name>Point of Interest</name>
        <Point>
          <coordinates>19.944,50.005,210</coordinates>
        </Point>
      </Placemark>
    </Folder>
  </Document>
</kml>
"##;

    #[test]
    fn test_import_structure() {
        let document = KmlConverter::default().import(ZONES).unwrap();

        assert!(document.validate().is_ok());
        assert_eq!(document.name.as_deref(), Some("Krakow Zones"));
        assert_eq!(document.root.id, "root");
        assert_eq!(document.root.name.as_deref(), Some("Krakow Zones"));

        let folders = document.root.children.as_ref().unwrap();
        assert_eq!(folders.len(), 1);
        let folder = &folders[0];
        assert!(folder.is_group());
        assert_eq!(folder.id, "zones");
        assert_eq!(folder.name.as_deref(), Some("Zones"));

        let placemarks = folder.children.as_ref().unwrap();
        assert_eq!(placemarks.len(), 2);
        assert_eq!(placemarks[0].kind, "Polygon");
        assert_eq!(placemarks[0].id, "zone_a");
        assert_eq!(placemarks[0].name.as_deref(), Some("Zone A"));
        assert_eq!(placemarks[0].description.as_deref(), Some("Old town"));
        assert_eq!(placemarks[1].kind, "Point");
        assert_eq!(placemarks[1].id, "point_of_interest");
    }

    #[test]
    fn test_import_geometries_and_styles() {
        let document = KmlConverter::default().import(ZONES).unwrap();

        assert_eq!(
            document.styles["#zoneStyle"],
            json!({
                "fill": "#cccccc",
                "fill-opacity": 1.0,
                "stroke": "#444444",
                "stroke-width": 2.0
            })
        );

        let zone = document.root.find("zone_a").unwrap();
        assert_eq!(
            zone.geometry.as_ref().unwrap().coordinates,
            json!([[[19.938, 50.0], [19.95, 50.0], [19.95, 50.01], [19.938, 50.0]]])
        );
        assert_eq!(zone.style.as_ref().unwrap()["styleUrl"], "#zoneStyle");

        let point = document.root.find("point_of_interest").unwrap();
        assert_eq!(point.geometry.as_ref().unwrap().coordinates, json!([19.944, 50.005]));
        assert!(point.style.is_none());
    }

    #[test]
    fn test_import_reads_export() {
        let converter = KmlConverter::default();
        let document = converter.import(&converter.export(&sample())).unwrap();

        assert_eq!(document.name.as_deref(), Some("Survey"));
        assert_eq!(document.features(), 3);
        assert_eq!(document.styles["#blue"]["fill"], "#0000ff");
        assert_eq!(document.styles["#blue"]["stroke-width"], 2.5);

        let well = document.root.find("well_&_pump").unwrap();
        assert_eq!(well.description.as_deref(), Some("<fresh>"));
        assert_eq!(well.geometry.as_ref().unwrap().coordinates, json!([1.5, 2.0]));
        // unnamed placemarks share the empty id; the first in preorder wins
        let field = document.root.find("").unwrap();
        assert_eq!(field.kind, "Polygon");
    }

    #[test]
    fn test_import_placemark_without_geometry() {
        let kml = "<kml><Document><Placemark><name>Note</name><Point><coordinates>x,y</coordinates></Point></Placemark></Document></kml>";
        let document = KmlConverter::default().import(kml).unwrap();

        let note = document.root.find("note").unwrap();
        assert!(note.geometry.is_none());
        assert!(note.children.is_none());
        assert_eq!(document.features(), 0);
    }

    #[test]
    fn test_import_rejects_malformed_input() {
        let converter = KmlConverter::default();

        assert!(matches!(
            converter.import("<kml><Document>"),
            Err(ConvertError::Malformed(_))
        ));
        assert_eq!(
            converter.import("<gpx/>").unwrap_err(),
            ConvertError::Malformed("expected a kml element, found gpx".to_string())
        );
        assert_eq!(
            converter.to_document(&View::Json(json!({}))).unwrap_err(),
            ConvertError::UnexpectedView { expected: "text" }
        );
    }

    #[test]
    fn test_empty_kml_gives_empty_root() {
        let document = KmlConverter::default()
            .to_document(&View::Text("<kml/>".to_string()))
            .unwrap();
        assert_eq!(document, Document::new(Node::group("root")));
    }

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(
            parse_coordinates("19.938,50.000 19.950,50.000\n 19.950,50.010"),
            vec![[19.938, 50.0], [19.95, 50.0], [19.95, 50.01]]
        );
        assert_eq!(parse_coordinates("1,2,3 bad 4"), vec![[1.0, 2.0]]);
    }

    #[test]
    fn test_color_conversion() {
        assert_eq!(kml_color_to_hex("ffcccccc"), "#cccccc");
        assert_eq!(kml_color_to_hex("ff0000ff"), "#ff0000");
        assert_eq!(kml_color_to_hex("7f112233"), "#332211");
        assert_eq!(kml_color_to_hex("red"), "#000000");
        assert_eq!(hex_to_kml_color("#ff0000"), "ff0000ff");
        assert_eq!(hex_to_kml_color("abc"), "ff000000");
        assert_eq!(kml_color_to_hex(&hex_to_kml_color("#123456")), "#123456");
    }
}
