use super::{build_mirror, file_stem, read_document, write_document, write_mirrors};
use crate::config::Config;
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::Colorize;
use hgss_mirror::NodeHandle;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct EditArgs {
    /// HGSS document to edit in place
    pub document: PathBuf,

    /// Identifier of the node to edit
    #[arg(short, long)]
    pub node: String,

    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New description
    #[arg(long)]
    pub description: Option<String>,

    /// New label coordinates, e.g. "12.5,41.9"
    #[arg(long)]
    pub coordinates: Option<String>,

    /// New geometry coordinates as JSON, e.g. "[1, 1]"
    #[arg(long)]
    pub geometry_coordinates: Option<String>,

    /// Output directory for mirrors (overrides config)
    #[arg(short, long)]
    pub out_dir: Option<String>,
}

/// Edits parsed up front so bad input never leaves a half-edited document
#[derive(Debug, Default, PartialEq)]
struct Edits {
    name: Option<String>,
    description: Option<String>,
    coordinates: Option<Vec<f64>>,
    geometry_coordinates: Option<Value>,
}

impl Edits {
    fn parse(args: &EditArgs) -> Result<Self> {
        let coordinates = args
            .coordinates
            .as_deref()
            .map(parse_coordinates)
            .transpose()?;
        let geometry_coordinates = args
            .geometry_coordinates
            .as_deref()
            .map(|json| {
                serde_json::from_str::<Value>(json)
                    .with_context(|| format!("Invalid geometry coordinates: {}", json))
            })
            .transpose()?;

        let edits = Self {
            name: args.name.clone(),
            description: args.description.clone(),
            coordinates,
            geometry_coordinates,
        };
        if edits == Self::default() {
            bail!("Nothing to edit: pass --name, --description, --coordinates or --geometry-coordinates");
        }
        Ok(edits)
    }

    fn apply(self, node: &NodeHandle) -> Result<()> {
        if let Some(coordinates) = self.geometry_coordinates {
            let geometry = node
                .geometry()
                .ok_or_else(|| anyhow!("Node has no geometry: {}", node.path()))?;
            geometry.set_coordinates(coordinates);
        }
        if let Some(name) = self.name {
            node.set_name(name);
        }
        if let Some(description) = self.description {
            node.set_description(description);
        }
        if let Some(coordinates) = self.coordinates {
            node.set_coordinates(coordinates);
        }
        Ok(())
    }
}

/// `lon,lat` or `lon,lat,alt`
fn parse_coordinates(text: &str) -> Result<Vec<f64>> {
    let coordinates = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid coordinates: {}", text))
        })
        .collect::<Result<Vec<_>>>()?;
    if !(2..=3).contains(&coordinates.len()) {
        bail!(
            "Invalid coordinates: {} (expected 2 or 3 numbers, got {})",
            text,
            coordinates.len()
        );
    }
    Ok(coordinates)
}

pub fn edit(args: EditArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let path = PathBuf::from(cwd).join(&args.document);
    let out_dir = match &args.out_dir {
        Some(dir) => PathBuf::from(cwd).join(dir),
        None => config.get_out_dir(cwd),
    };
    let edits = Edits::parse(&args)?;

    let mirror = build_mirror(read_document(&path)?, &config.formats)?;
    let node = mirror
        .document()
        .node_by_id(&args.node)
        .ok_or_else(|| anyhow!("Node not found: {}", args.node))?;
    edits.apply(&node)?;

    write_document(&path, &mirror.snapshot())?;
    println!("  {} {} → {}", "✓".green(), args.node, path.display());
    write_mirrors(&mirror, &out_dir, &file_stem(&path), config.pretty)?;

    Ok(())
}
