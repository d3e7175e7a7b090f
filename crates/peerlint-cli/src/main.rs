#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use peerlint_core::{
    run_check, CheckOptions, CheckOutcome, DirManifests, NpmCliBackend, RegistryBackend,
    DEFAULT_MAX_RETRIES,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "peerlint")]
#[command(
    author,
    version,
    about = "Check that your dependencies' peerDependency constraints can be satisfied",
    long_about = None
)]
struct Cli {
    /// Show debug information
    #[arg(short, long)]
    debug: bool,

    /// Avoid including devDependencies in the check
    #[arg(long = "no-include-dev")]
    no_include_dev: bool,

    /// Honor version pins from the manifest's "resolutions" field
    #[arg(long)]
    include_resolutions: bool,

    /// How many attempts each registry query is allowed
    #[arg(long, value_name = "RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Directory containing package.json and node_modules
    #[arg(long, value_name = "PATH")]
    directory: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.debug);

    let root = cli
        .directory
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let options = CheckOptions {
        include_dev: !cli.no_include_dev,
        include_resolutions: cli.include_resolutions,
        max_retries: cli.max_retries,
    };

    let manifests = Arc::new(DirManifests::new(root));
    let backend: Arc<dyn RegistryBackend> = Arc::new(NpmCliBackend::default());

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let outcome = runtime
        .block_on(run_check(manifests, backend, &options))
        .into_diagnostic()
        .wrap_err("peer dependency check aborted")?;

    match outcome {
        CheckOutcome::NoDependencies => {
            eprintln!("No dependencies found in package.json; nothing to check.");
            Ok(())
        }
        CheckOutcome::Report(report) => {
            for diagnostic in &report.diagnostics {
                eprintln!("{}", diagnostic.error_line());
                for line in diagnostic.info_lines() {
                    println!("{line}");
                }
            }

            if report.is_clean() {
                tracing::debug!(
                    "checked {} peer constraint(s) across {} package(s); all satisfied",
                    report.constraints,
                    report.owners
                );
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
    }
}
