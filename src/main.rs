//! `rswb` command line
//!
//! # Usage
//!
//! ```bash
//! rswb --config rswb.toml --all
//! rswb --config rswb.toml --compute --region NAPO
//! rswb --config rswb.toml --new-region "Alto Napo" --geometry shapes/alto_napo.shp --source FODESNA
//! ```

use clap::{CommandFactory, Parser};
use rswb::pipeline::{self, NewRegion, Step};
use rswb_core::config::PipelineConfig;
use rswb_core::errors::RSWBResult;
use rswb_core::io::NetcdfStore;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a tracing filter directive
const LOG_ENV: &str = "RSWB_LOG";

/// Regional water-balance pipeline
#[derive(Parser, Debug)]
#[command(name = "rswb")]
#[command(about = "Compute PET, water balance and climate indices for configured regions")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate inputs and compute PET and the water balance
    #[arg(long)]
    compute: bool,

    /// Write indices, key numbers, tables and period water-balance grids
    #[arg(long)]
    plot: bool,

    /// Create the output category directories
    #[arg(long)]
    organize: bool,

    /// Collect the per-region summaries
    #[arg(long)]
    report: bool,

    /// Run every step: compute, plot, organize, report
    #[arg(long)]
    all: bool,

    /// Restrict the run to these region codes (repeatable)
    #[arg(long = "region", value_name = "CODE")]
    regions: Vec<String>,

    /// Clip, register and compute a new region
    #[arg(long, value_name = "NAME", requires = "geometry")]
    new_region: Option<String>,

    /// Boundary shapefile of the new region
    #[arg(long, value_name = "SHP", requires = "new_region")]
    geometry: Option<PathBuf>,

    /// Source namespace to clip the new region from
    #[arg(long, value_name = "NS", requires = "new_region")]
    source: Option<String>,

    /// Output directory of the new region
    #[arg(long, value_name = "DIR", requires = "new_region")]
    output: Option<PathBuf>,

    /// Log at debug level unless RSWB_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn steps(&self) -> Vec<Step> {
        if self.all {
            return Step::ALL.to_vec();
        }
        [
            (self.compute, Step::Compute),
            (self.plot, Step::Plot),
            (self.organize, Step::Organize),
            (self.report, Step::Report),
        ]
        .into_iter()
        .filter_map(|(selected, step)| selected.then_some(step))
        .collect()
    }

    fn new_region(&self) -> Option<NewRegion> {
        let name = self.new_region.clone()?;
        let geometry = self.geometry.clone()?;
        Some(NewRegion {
            name,
            geometry,
            source: self.source.clone(),
            output_dir: self.output.clone(),
        })
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn execute(args: &Args, steps: &[Step]) -> RSWBResult<()> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let store = NetcdfStore::new();
    let mut registry = config.registry();

    if let Some(new_region) = args.new_region() {
        let (clip, computed) = pipeline::create_region(&store, &config, &mut registry, &new_region)?;
        info!(
            region = %new_region.name,
            clipped = clip.clipped,
            clip_failures = clip.failures.len(),
            written = computed.written.len(),
            "Region created"
        );
    }
    if steps.is_empty() {
        return Ok(());
    }

    let registry = if args.regions.is_empty() {
        registry
    } else {
        registry.subset(&args.regions)?
    };
    pipeline::run(&store, &registry, &config, steps)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let steps = args.steps();
    if steps.is_empty() && args.new_region.is_none() {
        // Nothing to do
        let _ = Args::command().print_help();
        return ExitCode::SUCCESS;
    }

    init_tracing(args.verbose);
    match execute(&args, &steps) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            ExitCode::FAILURE
        }
    }
}
