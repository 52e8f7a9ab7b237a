use super::read_document;
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::Colorize;
use hgss_converters::{converter_for, GEOJSON};
use hgss_mirror::View;
use hgss_model::Document;
use std::fs;
use std::path::PathBuf;

pub const HGSS: &str = "hgss";

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Source format (geojson, kml, hgss)
    #[arg(short, long, default_value = GEOJSON)]
    pub from: String,

    /// Target format (hgss, geojson, kml)
    #[arg(short, long, default_value = HGSS)]
    pub to: String,

    /// Write JSON on a single line
    #[arg(long)]
    pub compact: bool,
}

pub fn convert(args: ConvertArgs, cwd: &str) -> Result<()> {
    let input = PathBuf::from(cwd).join(&args.input);
    let pretty = !args.compact;

    let output = if args.from == HGSS {
        export_document(&read_document(&input)?, &args.to, pretty)?
    } else {
        let content = fs::read_to_string(&input)
            .with_context(|| format!("Cannot read {}", input.display()))?;
        let document = import_document(&content, &args.from, &args.to)?;
        if pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        }
    };

    match args.output {
        Some(output_path) => {
            let output_path = PathBuf::from(cwd).join(output_path);
            fs::write(&output_path, output)
                .with_context(|| format!("Cannot write {}", output_path.display()))?;
            println!(
                "  {} {} → {}",
                "✓".green(),
                args.input.display(),
                output_path.display()
            );
        }
        None => println!("{}", output),
    }

    Ok(())
}

/// Render `document` in the `to` format
pub(crate) fn export_document(document: &Document, to: &str, pretty: bool) -> Result<String> {
    let converter =
        converter_for(to).ok_or_else(|| anyhow!("Unsupported conversion: {} -> {}", HGSS, to))?;
    let view = converter.from_document(document)?;
    Ok(view.render(pretty)?)
}

/// Parse `content` written in the `from` format into a validated document
pub(crate) fn import_document(content: &str, from: &str, to: &str) -> Result<Document> {
    if to != HGSS {
        bail!("Unsupported conversion: {} -> {}", from, to);
    }

    let converter =
        converter_for(from).ok_or_else(|| anyhow!("Unsupported conversion: {} -> {}", from, to))?;
    let view = if from == GEOJSON {
        View::Json(serde_json::from_str(content).context("Input is not valid JSON")?)
    } else {
        View::Text(content.to_string())
    };

    let document = converter.to_document(&view)?;
    document.validate()?;
    Ok(document)
}
