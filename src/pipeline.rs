//! Step orchestration
//!
//! The pipeline runs as discrete steps over every region of a [`RegionRegistry`]:
//!
//! 1. [`Step::Compute`] validates the clipped inputs, writes PET and the water balance, then
//!    audits PET against a recomputation
//! 2. [`Step::Plot`] writes the numeric products behind the figures and maps: indices, key
//!    numbers, the monthly/annual tables and the period water-balance grids
//! 3. [`Step::Organize`] creates the numbered output category directories
//! 4. [`Step::Report`] checks which regions have a key-numbers summary for the report
//!
//! Work on one (region, domain) pair that fails is logged and recorded as skipped; the step
//! carries on with the next pair. Only pipeline-level problems, such as an empty registry,
//! end the run with an error.

use rswb_components::clipper::{self, ClipReport};
use rswb_components::summary::{self, KEY_NUMBERS_JSON};
use rswb_components::{periods, pet, tables, validation, water_balance};
use rswb_core::config::PipelineConfig;
use rswb_core::domain::Domain;
use rswb_core::errors::{RSWBError, RSWBResult};
use rswb_core::geometry::RegionGeometry;
use rswb_core::io::GridStore;
use rswb_core::region::{default_output_dir, RegisterOutcome, Region, RegionRegistry, OUTPUT_CATEGORIES};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Compute,
    Plot,
    Organize,
    Report,
}

impl Step {
    /// Every step in execution order
    pub const ALL: [Step; 4] = [Step::Compute, Step::Plot, Step::Organize, Step::Report];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Compute => "compute",
            Step::Plot => "plot",
            Step::Organize => "organize",
            Step::Report => "report",
        };
        write!(f, "{name}")
    }
}

/// Work unit that produced nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct Skipped {
    pub region: String,
    pub domain: Option<Domain>,
    pub stage: &'static str,
    pub reason: String,
}

/// Outcome of one step over a registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Files or directories produced
    pub written: Vec<PathBuf>,
    pub skipped: Vec<Skipped>,
}

impl StepReport {
    /// Run one unit of work, turning `Ok(None)` and errors into a skip.
    fn guard<T>(
        &mut self,
        region: &Region,
        domain: Option<Domain>,
        stage: &'static str,
        work: impl FnOnce() -> RSWBResult<Option<T>>,
    ) -> Option<T> {
        let reason = match work() {
            Ok(Some(value)) => return Some(value),
            Ok(None) => "missing inputs".to_string(),
            Err(e) => {
                error!(region = %region.code, domain = ?domain, stage, error = %e, "Stage failed");
                e.to_string()
            }
        };
        self.skipped.push(Skipped {
            region: region.code.clone(),
            domain,
            stage,
            reason,
        });
        None
    }
}

fn require_regions(registry: &RegionRegistry) -> RSWBResult<()> {
    if registry.is_empty() {
        return Err(RSWBError::Config("no regions configured".to_string()));
    }
    Ok(())
}

/// Validate inputs, then compute PET and the water balance for every region and domain.
pub fn compute(
    store: &dyn GridStore,
    registry: &RegionRegistry,
    config: &PipelineConfig,
) -> RSWBResult<StepReport> {
    require_regions(registry)?;
    let mut report = StepReport::default();

    for region in registry.iter() {
        info!(
            region = %region.code,
            input = %region.input_dir.display(),
            output = %region.output_dir.display(),
            "Computing"
        );
        let validation = validation::validate_region(store, region, config);
        if !validation.passed() {
            warn!(
                region = %region.code,
                failures = validation.failures.len(),
                warnings = validation.warnings.len(),
                "Input validation found problems"
            );
        }

        for domain in Domain::ALL {
            let domain_dir = config.domain_dir(domain);
            let pet_path = report.guard(region, Some(domain), "pet", || {
                pet::run_domain(store, region, &domain_dir, config.compression_level)
            });
            let Some(pet_path) = pet_path else { continue };
            report.written.push(pet_path);

            if let Some(files) = report.guard(region, Some(domain), "water_balance", || {
                water_balance::run_domain(store, region, &domain_dir, config.compression_level)
            }) {
                report.written.push(files.daily);
                report.written.push(files.aggregated);
            }
        }

        let audit = validation::audit_pet_region(store, region, config);
        if !audit.passed() {
            warn!(
                region = %region.code,
                failures = audit.failures.len(),
                "Stored PET disagrees with a recomputation"
            );
        }
    }
    Ok(report)
}

/// Indices, key numbers, tables and period grids for every region.
pub fn plot(
    store: &dyn GridStore,
    registry: &RegionRegistry,
    config: &PipelineConfig,
) -> RSWBResult<StepReport> {
    require_regions(registry)?;
    let mut report = StepReport::default();
    let late_window = config.late_window();

    for region in registry.iter() {
        if let Some((json, text)) = report.guard(region, None, "key_numbers", || {
            match summary::compute_region_indices(store, region, config)? {
                Some(indices) => {
                    summary::write_key_numbers(region, &indices, late_window.as_ref()).map(Some)
                }
                None => Ok(None),
            }
        }) {
            report.written.extend([json, text]);
        }

        for domain in Domain::ALL {
            let domain_dir = config.domain_dir(domain);
            if let Some((monthly, annual)) = report.guard(region, Some(domain), "tables", || {
                tables::run_domain(store, region, &domain_dir)
            }) {
                report.written.extend([monthly, annual]);
            }
        }

        for domain in Domain::SCENARIOS {
            let domain_dir = config.domain_dir(domain);
            if let Some(grids) = report.guard(region, Some(domain), "periods", || {
                periods::run_domain(
                    store,
                    region,
                    &domain_dir,
                    &config.export_periods,
                    config.compression_level,
                )
            }) {
                report.written.extend(grids);
            }
        }
    }
    Ok(report)
}

/// Create the numbered category directories under every region output directory.
pub fn organize(registry: &RegionRegistry) -> RSWBResult<StepReport> {
    require_regions(registry)?;
    let mut report = StepReport::default();
    for region in registry.iter() {
        let created = report.guard(region, None, "organize", || {
            let mut dirs = Vec::with_capacity(OUTPUT_CATEGORIES.len());
            for category in OUTPUT_CATEGORIES {
                let dir = region.category_dir(category);
                fs::create_dir_all(&dir)?;
                dirs.push(dir);
            }
            Ok(Some(dirs))
        });
        if let Some(dirs) = created {
            debug!(region = %region.code, path = %region.output_dir.display(), "Organized outputs");
            report.written.extend(dirs);
        }
    }
    Ok(report)
}

/// Collect the key-numbers summaries that the report is built from.
pub fn report(registry: &RegionRegistry) -> RSWBResult<StepReport> {
    require_regions(registry)?;
    let mut report = StepReport::default();
    for region in registry.iter() {
        let path = region.summary_dir().join(KEY_NUMBERS_JSON);
        if path.is_file() {
            info!(region = %region.code, path = %path.display(), "Summary available");
            report.written.push(path);
        } else {
            warn!(region = %region.code, path = %path.display(), "No summary, run the plot step first");
            report.skipped.push(Skipped {
                region: region.code.clone(),
                domain: None,
                stage: "report",
                reason: format!("missing {}", path.display()),
            });
        }
    }
    Ok(report)
}

/// Run `steps` in execution order, whatever order they are given in.
pub fn run(
    store: &dyn GridStore,
    registry: &RegionRegistry,
    config: &PipelineConfig,
    steps: &[Step],
) -> RSWBResult<Vec<(Step, StepReport)>> {
    let mut reports = Vec::new();
    for step in Step::ALL.into_iter().filter(|s| steps.contains(s)) {
        info!(step = %step, regions = registry.len(), "Starting step");
        let outcome = match step {
            Step::Compute => compute(store, registry, config)?,
            Step::Plot => plot(store, registry, config)?,
            Step::Organize => organize(registry)?,
            Step::Report => report(registry)?,
        };
        info!(
            step = %step,
            written = outcome.written.len(),
            skipped = outcome.skipped.len(),
            "Finished step"
        );
        reports.push((step, outcome));
    }
    Ok(reports)
}

/// A region defined on the command line rather than in the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRegion {
    pub name: String,
    /// Boundary shapefile
    pub geometry: PathBuf,
    /// Source namespace to clip from
    pub source: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl NewRegion {
    pub fn to_region(&self, config: &PipelineConfig) -> Region {
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| default_output_dir(&config.outputs_dir, &self.name));
        let mut region = Region::new(
            self.name.clone(),
            config.inputs_dir.join(&self.name),
            output_dir,
        )
        .with_geometry(self.geometry.clone(), None);
        if let Some(source) = &self.source {
            region = region.with_data_source(source.clone());
        }
        region
    }
}

/// Clip the national grids for `region`, register it and compute it on its own.
///
/// A region whose clip produced no files is not registered.
pub fn register_region(
    store: &dyn GridStore,
    config: &PipelineConfig,
    registry: &mut RegionRegistry,
    region: Region,
    geometry: &RegionGeometry,
) -> RSWBResult<(ClipReport, StepReport)> {
    let clip = clipper::clip_region(store, &config.source_dir, &region, geometry, config);
    if clip.clipped == 0 {
        return Err(RSWBError::EmptyClip(format!(
            "no source grids could be clipped for region '{}'",
            region.code
        )));
    }

    let code = region.code.clone();
    if let RegisterOutcome::Replaced { previous } = registry.insert(region) {
        debug!(region = %code, previous = %previous.output_dir.display(), "Replaced region");
    }
    let subset = registry.subset(&[code.as_str()])?;
    let computed = compute(store, &subset, config)?;
    Ok((clip, computed))
}

/// [`register_region`] for a region whose boundary comes from a shapefile.
pub fn create_region(
    store: &dyn GridStore,
    config: &PipelineConfig,
    registry: &mut RegionRegistry,
    new_region: &NewRegion,
) -> RSWBResult<(ClipReport, StepReport)> {
    let region = new_region.to_region(config);
    let geometry = clipper::load_region_geometry(&region)?;
    info!(region = %region.code, geometry = %new_region.geometry.display(), "Creating region");
    register_region(store, config, registry, region, &geometry)
}
