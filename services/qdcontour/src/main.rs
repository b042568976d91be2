//! qdcontour command line driver.
//!
//! Runs contouring scripts in order against one shared render context.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use qdcontour::{Preprocessor, ScriptInterpreter, SearchPaths};

#[derive(Parser, Debug)]
#[command(name = "qdcontour")]
#[command(about = "Draw contour images from querydata as directed by scripts")]
struct Args {
    /// Report progress and diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Overwrite existing images
    #[arg(short, long)]
    force: bool,

    /// Querydata to use, as if each script began with `querydata <file>`
    #[arg(short, long, value_name = "FILE")]
    querydata: Option<String>,

    /// Directory searched for querydata files
    #[arg(long, env = "QDCONTOUR_DATA_PATH")]
    data_path: Option<PathBuf>,

    /// Directory searched for background, foreground, mask and combine images
    #[arg(long, env = "QDCONTOUR_MAPS_PATH")]
    maps_path: Option<PathBuf>,

    /// Directory searched for TrueType fonts
    #[arg(long, env = "QDCONTOUR_FONTS_PATH")]
    fonts_path: Option<PathBuf>,

    /// Script files
    #[arg(required = true, value_name = "SCRIPT")]
    scripts: Vec<PathBuf>,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: qdcontour failed due to\n--> {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut interp = ScriptInterpreter::new(SearchPaths {
        data: args.data_path.clone(),
        maps: args.maps_path.clone(),
        fonts: args.fonts_path.clone(),
    });
    interp.context_mut().settings.force = args.force;

    for script in &args.scripts {
        tracing::debug!(script = %script.display(), "Processing script");
        let mut text = Preprocessor::new()
            .read_file(script)
            .with_context(|| format!("reading {}", script.display()))?;
        if let Some(querydata) = &args.querydata {
            text.insert_str(0, &format!("querydata {}\n", querydata));
        }
        interp.run(&text)?;
    }

    let drawn = interp.drawn();
    tracing::debug!(written = drawn.written.len(), skipped = drawn.skipped.len(), "Done");
    Ok(())
}
