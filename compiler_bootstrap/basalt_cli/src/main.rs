//! Basalt compiler command-line interface

use anyhow::Result;
use basalt_cli::{compile, Options};
use basalt_common::Diagnostics;
use clap::Parser;
use std::path::PathBuf;

/// The Basalt language compiler
#[derive(Parser)]
#[command(name = "basalt")]
#[command(about = "Compiles Basalt source files into x86-64 assembly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Input source files
    inputs: Vec<PathBuf>,

    /// Output path for the assembly listing
    #[arg(short, long, default_value = "main")]
    output: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress informational output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    if cli.inputs.is_empty() {
        anyhow::bail!("no input files");
    }

    let options = Options { inputs: cli.inputs, output: cli.output };

    let mut diagnostics = Diagnostics::new();
    let result = compile(&options, &mut diagnostics);

    diagnostics
        .report(&mut std::io::stderr())
        .expect("diagnostics must reach stderr");

    match result {
        Ok(()) => Ok(()),
        Err(_) => std::process::exit(1),
    }
}
