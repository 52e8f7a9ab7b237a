mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{convert, edit, mirror, ConvertArgs, EditArgs, MirrorArgs};
use tracing_subscriber::EnvFilter;

/// HGSS CLI - keep GeoJSON and KML mirrors of an HGSS document in sync
#[derive(Parser, Debug)]
#[command(name = "hgss")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log mirror activity (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a file between HGSS and an external format
    Convert(ConvertArgs),

    /// Write every mirror of a document, optionally following changes
    Mirror(MirrorArgs),

    /// Edit one node of a document and refresh its mirrors
    Edit(EditArgs),
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| {
            let cwd = cwd.display().to_string();
            match cli.command {
                Command::Convert(args) => convert(args, &cwd),
                Command::Mirror(args) => mirror(args, &cwd),
                Command::Edit(args) => edit(args, &cwd),
            }
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
