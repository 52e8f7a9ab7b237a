use super::{build_mirror, file_stem, read_document, write_mirrors};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use hgss_mirror::Mirror;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use tracing::debug;

#[derive(Debug, Args)]
pub struct MirrorArgs {
    /// HGSS document to mirror
    pub document: PathBuf,

    /// Output directory (overrides config)
    #[arg(short, long)]
    pub out_dir: Option<String>,

    /// Formats to maintain (overrides config, repeatable)
    #[arg(short, long = "format")]
    pub formats: Vec<String>,

    /// Watch the document and rewrite mirrors on change
    #[arg(short, long)]
    pub watch: bool,
}

pub fn mirror(args: MirrorArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let formats = if args.formats.is_empty() {
        config.formats.clone()
    } else {
        args.formats.clone()
    };
    let out_dir = match &args.out_dir {
        Some(dir) => PathBuf::from(cwd).join(dir),
        None => config.get_out_dir(cwd),
    };
    let path = PathBuf::from(cwd).join(&args.document);
    let stem = file_stem(&path);

    println!("{}", "🪞 Mirroring HGSS document...".bright_blue().bold());

    let mirror = build_mirror(read_document(&path)?, &formats)?;
    write_mirrors(&mirror, &out_dir, &stem, config.pretty)?;

    if args.watch {
        watch(&mirror, &path, &out_dir, &stem, config.pretty)?;
    }

    Ok(())
}

/// Reload `path` into the mirror whenever it changes. Runs until the watcher
/// goes away.
fn watch(mirror: &Mirror, path: &Path, out_dir: &Path, stem: &str, pretty: bool) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("Cannot watch {}", path.display()))?;
    let file_name = path.file_name().map(|name| name.to_os_string());

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = tx.send(event);
                }
            }
        },
        notify::Config::default(),
    )?;

    // Editors often replace the file, so watch its directory
    watcher.watch(parent, RecursiveMode::NonRecursive)?;
    println!("👀 Watching {}", path.display());

    for event in rx {
        let touches_document = event
            .paths
            .iter()
            .any(|changed| changed.file_name().map(|name| name.to_os_string()) == file_name);
        if !touches_document {
            continue;
        }
        debug!(kind = ?event.kind, "document changed");

        match read_document(path) {
            Ok(document) => {
                mirror.set_document(document);
                write_mirrors(mirror, out_dir, stem, pretty)?;
            }
            Err(err) => eprintln!("  {} {:#}", "✗".red(), err),
        }
    }

    Ok(())
}
