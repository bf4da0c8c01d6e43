//! Command-line entry point: compiles a WEFT source file and reports the
//! result, optionally as the JSON-encoded IR external backends consume.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use weft_core::{CompileOptions, compile_with_options};

/// Compiles a WEFT source file into a dataflow plan.
#[derive(Parser, Debug)]
#[command(name = "weft", version, about = "WEFT dataflow language compiler")]
struct Args {
    /// Path to the `.weft` source file to compile.
    path: PathBuf,

    /// Additional directories searched for `#include` targets.
    #[arg(long = "include", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Print the compiled IR as JSON instead of a human-readable summary.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let source = match std::fs::read_to_string(&args.path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {}: {err}", args.path.display());
            return ExitCode::FAILURE;
        }
    };

    let path_str = args.path.to_string_lossy().into_owned();
    let options = CompileOptions {
        include_dirs: args.include_dirs,
        ..CompileOptions::default()
    };

    let plan = match compile_with_options(&source, &path_str, &options) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&plan.program) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error encoding plan as JSON: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!(
            "compiled {} ({} bundle(s), {} cache node(s), {} swatch(es))",
            args.path.display(),
            plan.program.bundles.len(),
            plan.cache_descriptors.len(),
            plan.swatches.len()
        );
        for swatch in &plan.swatches {
            println!("  swatch {:?}: {} bundle(s)", swatch.domain, swatch.bundles.len());
        }
    }

    ExitCode::SUCCESS
}
