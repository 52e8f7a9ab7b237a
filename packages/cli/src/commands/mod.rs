pub mod convert;
pub mod edit;
pub mod mirror;

pub use convert::{convert, ConvertArgs};
pub use edit::{edit, EditArgs};
pub use mirror::{mirror, MirrorArgs};

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use hgss_converters::{converter_for, extension_for};
use hgss_mirror::{Converter, Mirror};
use hgss_model::Document;
use std::fs;
use std::path::{Path, PathBuf};

/// Read and validate an HGSS document
pub(crate) fn read_document(path: &Path) -> Result<Document> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let document: Document = serde_json::from_str(&content)
        .with_context(|| format!("{} is not an HGSS document", path.display()))?;
    document
        .validate()
        .with_context(|| format!("{} is not an HGSS document", path.display()))?;
    Ok(document)
}

pub(crate) fn write_document(path: &Path, document: &Document) -> Result<()> {
    let content = serde_json::to_string_pretty(document)?;
    fs::write(path, content).with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(())
}

/// Mirror over `document` maintaining the built-in converters named in `formats`
pub(crate) fn build_mirror(document: Document, formats: &[String]) -> Result<Mirror> {
    let mut converters: Vec<(String, Box<dyn Converter>)> = Vec::new();
    for format in formats {
        let converter =
            converter_for(format).ok_or_else(|| anyhow!("Unknown format: {}", format))?;
        converters.push((format.clone(), converter));
    }

    Ok(Mirror::new(document, converters))
}

/// Write every mirror to `out_dir/<stem>.<ext>`, returning the written paths.
/// Formats whose converter failed are reported and skipped.
pub(crate) fn write_mirrors(
    mirror: &Mirror,
    out_dir: &Path,
    stem: &str,
    pretty: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create {}", out_dir.display()))?;

    let mut written = Vec::new();
    for format in mirror.formats() {
        if let Some(error) = mirror.last_error(&format) {
            eprintln!("  {} {} - {}", "✗".red(), format, error);
            continue;
        }

        let Some(view) = mirror.get(&format) else {
            continue;
        };

        let path = out_dir.join(format!("{}.{}", stem, extension_for(&format)));
        fs::write(&path, view.render(pretty)?)
            .with_context(|| format!("Cannot write {}", path.display()))?;
        println!("  {} {} → {}", "✓".green(), format, path.display());
        written.push(path);
    }

    Ok(written)
}

/// Base name used for mirror files: `site.hgss.json` → `site`
pub(crate) fn file_stem(path: &Path) -> String {
    let stem = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => return "document".to_string(),
    };
    if let Some(base) = stem.strip_suffix(".hgss").filter(|base| !base.is_empty()) {
        return base.to_string();
    }
    stem
}
