//! Sanity checks on clipped source grids before PET and the water balance are computed.
//!
//! Problems are collected in a [`ValidationReport`] rather than returned as errors: failures are
//! problems that will break a later stage, warnings are suspicious but usable data.
//!
//! [`audit_pet_domain`] checks the computed products afterwards: PET is recomputed at a few
//! sample cells and compared with the stored grid, and the regional means of P and PET are
//! checked against plausible bounds.

use crate::pet::{compute_pet, PET_VARIABLE};
use crate::resolver::{domain_file, read_variable};
use crate::water_balance::P_DAILY;
use ndarray::{s, Array1, Zip};
use rswb_core::config::PipelineConfig;
use rswb_core::domain::Domain;
use rswb_core::errors::RSWBResult;
use rswb_core::grid::ClimateGrid;
use rswb_core::io::GridStore;
use rswb_core::region::Region;
use rswb_core::series::nan_mean;
use rswb_core::spatial::area_weighted_mean;
use rswb_core::units::normalize_temperature;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Variables every domain must provide.
pub const REQUIRED_VARIABLES: [&str; 4] = ["pr", "tas", "tasmin", "tasmax"];
/// Largest tolerated fraction of missing cells
pub const MAX_NAN_FRACTION: f64 = 0.01;

/// Largest tolerated gap between stored and recomputed mean PET at a sample cell
/// unit: mm/day
pub const PET_AUDIT_TOLERANCE: f64 = 0.01;
/// Regional mean PET above this points at wrong temperature units
/// unit: mm/day
pub const MAX_PLAUSIBLE_PET: f64 = 8.0;
/// Regional mean precipitation below this points at a dry clip or wrong units
/// unit: mm/day
pub const MIN_PLAUSIBLE_P: f64 = 1.0;
/// Cells sampled along the grid diagonal by the PET audit
pub const PET_AUDIT_SAMPLES: usize = 3;

const PRECIPITATION_UNITS: [&str; 4] = ["kg m-2 s-1", "kg m**-2 s**-1", "kg m-2 s-1.", "kg m-2 s^-1"];
const TEMPERATURE_UNITS: [&str; 3] = ["k", "kelvin", "kelvins"];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when nothing failed. Warnings do not count.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.failures.extend(other.failures);
        self.warnings.extend(other.warnings);
    }

    fn fail(&mut self, message: String) {
        error!("{message}");
        self.failures.push(message);
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

fn strictly_increasing(values: &Array1<f64>) -> bool {
    values.windows(2).into_iter().all(|w| w[1] > w[0])
}

fn check_coordinates(grid: &ClimateGrid, label: &str, report: &mut ValidationReport) {
    if !strictly_increasing(&grid.lat) {
        report.fail(format!("{label} lat not strictly increasing"));
    }
    if !strictly_increasing(&grid.lon) {
        report.fail(format!("{label} lon not strictly increasing"));
    }
}

fn check_time(grid: &ClimateGrid, label: &str, report: &mut ValidationReport) {
    let stamps = &grid.time.stamps;
    let unique: HashSet<_> = stamps.iter().collect();
    if unique.len() != stamps.len() {
        report.fail(format!("{label} time has duplicates"));
    }

    let mut steps = Vec::with_capacity(stamps.len().saturating_sub(1));
    for pair in stamps.windows(2) {
        match grid.calendar.days_between(pair[0], pair[1]) {
            Ok(step) => steps.push(step),
            Err(e) => {
                report.fail(format!("{label} invalid time stamp: {e}"));
                return;
            }
        }
    }
    if steps.is_empty() {
        return;
    }

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for step in &steps {
        *counts.entry(*step).or_default() += 1;
    }
    // Ties go to the shorter step
    let mode = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(step, _)| *step);
    if let Some(mode) = mode.filter(|m| *m != 1) {
        report.warn(format!("{label} cadence mode={mode}d (expected 1d)"));
    }
    let gaps = steps.iter().filter(|s| **s > 1).count();
    if gaps > 0 {
        report.warn(format!("{label} has {gaps} gap(s) >1 day"));
    }
    if steps.iter().any(|s| *s <= 0) {
        report.fail(format!("{label} non-monotonic time steps <= 0"));
    }
}

fn check_units(grid: &ClimateGrid, variable: &str, label: &str, report: &mut ValidationReport) {
    let units = grid
        .units
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let (expected, display) = if variable == "pr" {
        (&PRECIPITATION_UNITS[..], "kg m-2 s-1")
    } else {
        (&TEMPERATURE_UNITS[..], "K")
    };
    if !expected.contains(&units.as_str()) {
        report.warn(format!("{label} units '{units}' (expected {display})"));
    }
}

fn check_nan_rate(grid: &ClimateGrid, label: &str, report: &mut ValidationReport) {
    let fraction = grid.nan_fraction();
    if fraction > MAX_NAN_FRACTION {
        report.warn(format!(
            "{label} NaN rate {:.2}% (>{}%)",
            fraction * 100.0,
            MAX_NAN_FRACTION * 100.0
        ));
    }
}

fn same_axis(a: &Array1<f64>, b: &Array1<f64>) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= 1e-8 + 1e-5 * y.abs())
}

fn check_temperature_order(
    tas: &ClimateGrid,
    tasmin: &ClimateGrid,
    tasmax: &ClimateGrid,
    domain_dir: &str,
    report: &mut ValidationReport,
) {
    let normalized = [tas, tasmin, tasmax]
        .into_iter()
        .map(|g| normalize_temperature(g).map(|(grid, _)| grid))
        .collect::<Result<Vec<_>, _>>();
    let grids = match normalized {
        Ok(grids) => grids,
        Err(e) => {
            report.warn(format!("{domain_dir}: could not check tas range: {e}"));
            return;
        }
    };
    let (t, tmin, tmax) = (&grids[0], &grids[1], &grids[2]);
    if let Err(e) = t.check_compatible(tmin).and_then(|_| t.check_compatible(tmax)) {
        report.warn(format!("{domain_dir}: could not check tas range: {e}"));
        return;
    }

    let (mut below, mut above, mut inverted) = (0usize, 0usize, 0usize);
    Zip::from(&t.values)
        .and(&tmin.values)
        .and(&tmax.values)
        .for_each(|&t, &lo, &hi| {
            below += usize::from(t < lo);
            above += usize::from(t > hi);
            inverted += usize::from(hi < lo);
        });
    if below + above + inverted > 0 {
        report.warn(format!(
            "{domain_dir}: tas outside [tasmin,tasmax] count: below={below}, above={above}, inverted_spread={inverted}"
        ));
    }
}

/// Check the four source variables of one domain in the region's input directory.
pub fn validate_domain(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let dir = region.input_domain_dir(domain_dir);

    let mut grids = Vec::with_capacity(REQUIRED_VARIABLES.len());
    for variable in REQUIRED_VARIABLES {
        let path = domain_file(&dir, variable, domain_dir);
        if !store.exists(&path) {
            report.fail(format!("missing file: {}", path.display()));
            continue;
        }
        match store.read(&path) {
            Ok(dataset) => match dataset.get(variable) {
                Some(grid) => grids.push(grid.clone()),
                None => report.fail(format!(
                    "{} missing var '{variable}'",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )),
            },
            Err(e) => report.fail(format!("cannot open {}: {e}", path.display())),
        }
    }
    if grids.len() != REQUIRED_VARIABLES.len() {
        return report;
    }

    for (variable, grid) in REQUIRED_VARIABLES.iter().zip(&grids) {
        let label = format!("{domain_dir}:{variable}");
        check_coordinates(grid, &label, &mut report);
        check_time(grid, &label, &mut report);
        check_units(grid, variable, &label, &mut report);
        check_nan_rate(grid, &label, &mut report);
    }

    let pr = &grids[0];
    for (variable, grid) in REQUIRED_VARIABLES.iter().zip(&grids).skip(1) {
        if !same_axis(&pr.lat, &grid.lat) {
            report.fail(format!("{domain_dir}: lat grid pr vs {variable} differ"));
        }
        if !same_axis(&pr.lon, &grid.lon) {
            report.fail(format!("{domain_dir}: lon grid pr vs {variable} differ"));
        }
    }

    let stamp_sets: Vec<HashSet<_>> = grids
        .iter()
        .map(|g| g.time.stamps.iter().copied().collect())
        .collect();
    let shared = stamp_sets
        .iter()
        .skip(1)
        .fold(stamp_sets[0].clone(), |acc, s| &acc & s);
    for (variable, stamps) in REQUIRED_VARIABLES.iter().zip(&stamp_sets) {
        let unshared = stamps.len() - shared.len();
        if unshared != 0 {
            report.warn(format!(
                "{domain_dir}:{variable} has {unshared} timestamp(s) not shared by all"
            ));
        }
    }

    check_temperature_order(&grids[1], &grids[2], &grids[3], domain_dir, &mut report);
    info!(
        region = %region.code,
        domain = %domain_dir,
        failures = report.failures.len(),
        warnings = report.warnings.len(),
        "Validation completed"
    );
    report
}

/// Validate every domain of one region.
pub fn validate_region(
    store: &dyn GridStore,
    region: &Region,
    config: &PipelineConfig,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    for domain in Domain::ALL {
        report.extend(validate_domain(store, region, &config.domain_dir(domain)));
    }
    report
}

fn sample_cells(n_lat: usize, n_lon: usize, n: usize) -> Vec<(usize, usize)> {
    if n_lat == 0 || n_lon == 0 || n == 0 {
        return Vec::new();
    }
    let n = n.min(n_lat).min(n_lon);
    let step = |len: usize, k: usize| if n == 1 { len / 2 } else { k * (len - 1) / (n - 1) };
    (0..n).map(|k| (step(n_lat, k), step(n_lon, k))).collect()
}

/// Stored PET and PET recomputed from the temperatures, on the same grid.
fn recompute_pet(
    store: &dyn GridStore,
    pet_path: &Path,
    temperature_paths: &[PathBuf; 3],
) -> RSWBResult<(ClimateGrid, ClimateGrid)> {
    let stored = read_variable(store, pet_path, &[PET_VARIABLE])?;
    let tmin = read_variable(store, &temperature_paths[0], &["tasmin", "tmin"])?;
    let tmax = read_variable(store, &temperature_paths[1], &["tasmax", "tmax"])?;
    let tmean = read_variable(store, &temperature_paths[2], &["tas", "tmean"])?;
    let recomputed = compute_pet(&tmin, &tmax, &tmean)?;
    recomputed.check_compatible(&stored)?;
    Ok((stored, recomputed))
}

fn time_mean(grid: &ClimateGrid, i: usize, j: usize) -> f64 {
    nan_mean(grid.values.slice(s![.., i, j]).iter().copied())
}

/// Compare stored PET with a recomputation from the clipped temperatures, and check the
/// regional means of P and PET.
///
/// Domains whose PET has not been computed yet produce an empty report.
pub fn audit_pet_domain(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let in_dir = region.input_domain_dir(domain_dir);
    let out_dir = region.output_domain_dir(domain_dir);
    let pet_path = domain_file(&out_dir, PET_VARIABLE, domain_dir);
    let temperature_paths = ["tasmin", "tasmax", "tas"].map(|v| domain_file(&in_dir, v, domain_dir));
    if !store.exists(&pet_path) || temperature_paths.iter().any(|p| !store.exists(p)) {
        debug!(region = %region.code, domain = %domain_dir, "Nothing to audit");
        return report;
    }

    let (stored, recomputed) = match recompute_pet(store, &pet_path, &temperature_paths) {
        Ok(grids) => grids,
        Err(e) => {
            report.fail(format!("{domain_dir}: cannot recompute PET: {e}"));
            return report;
        }
    };

    for (i, j) in sample_cells(stored.lat.len(), stored.lon.len(), PET_AUDIT_SAMPLES) {
        let from_file = time_mean(&stored, i, j);
        let expected = time_mean(&recomputed, i, j);
        let diff = from_file - expected;
        if diff.abs() > PET_AUDIT_TOLERANCE {
            report.fail(format!(
                "{domain_dir}: PET at ({:.3}, {:.3}) is {from_file:.3} mm/day, recomputed {expected:.3} (diff {diff:.3})",
                stored.lat[i], stored.lon[j]
            ));
        }
    }

    let pet_mean = nan_mean(area_weighted_mean(&stored).values);
    if pet_mean > MAX_PLAUSIBLE_PET {
        report.warn(format!(
            "{domain_dir}: PET unusually high ({pet_mean:.2} mm/day); check units and temperatures"
        ));
    }
    let wb_path = domain_file(&out_dir, "wb", domain_dir);
    if store.exists(&wb_path) {
        match read_variable(store, &wb_path, &[P_DAILY]) {
            Ok(precipitation) => {
                let p_mean = nan_mean(area_weighted_mean(&precipitation).values);
                if p_mean < MIN_PLAUSIBLE_P {
                    report.warn(format!(
                        "{domain_dir}: very low P ({p_mean:.2} mm/day); the clipped area may be dry or units wrong"
                    ));
                }
                info!(region = %region.code, domain = %domain_dir, p_mean, pet_mean, "Audited PET");
            }
            Err(e) => report.fail(format!("{domain_dir}: cannot read {}: {e}", wb_path.display())),
        }
    }
    report
}

/// Audit PET for every domain of one region.
pub fn audit_pet_region(
    store: &dyn GridStore,
    region: &Region,
    config: &PipelineConfig,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    for domain in Domain::ALL {
        report.extend(audit_pet_domain(store, region, &config.domain_dir(domain)));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use rswb_core::calendar::DayStamp;
    use rswb_core::grid::{GridDataset, TimeAxis};
    use rswb_core::io::MemoryStore;

    const DOMAIN: &str = "historical_ecuador";

    fn clean_grids() -> Vec<ClimateGrid> {
        vec![
            testing::uniform("pr", 5.0 / 86_400.0, 2000, 1).with_units("kg m-2 s-1"),
            testing::uniform("tas", 293.15, 2000, 1).with_units("K"),
            testing::uniform("tasmin", 283.15, 2000, 1).with_units("K"),
            testing::uniform("tasmax", 303.15, 2000, 1).with_units("K"),
        ]
    }

    fn store_with(grids: Vec<ClimateGrid>) -> (MemoryStore, Region) {
        let store = MemoryStore::new();
        let region = Region::new("Napo", "/in", "/out");
        for grid in grids {
            let path = domain_file(&region.input_domain_dir(DOMAIN), &grid.name, DOMAIN);
            store.insert(path, GridDataset::from_grids([grid]));
        }
        (store, region)
    }

    #[test]
    fn test_clean_domain() {
        let (store, region) = store_with(clean_grids());
        let report = validate_domain(&store, &region, DOMAIN);
        assert_eq!(report, ValidationReport::default());
        assert!(report.passed());
    }

    #[test]
    fn test_missing_file() {
        let mut grids = clean_grids();
        grids.remove(2);
        let (store, region) = store_with(grids);
        let report = validate_domain(&store, &region, DOMAIN);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("tasmin_historical_ecuador.nc"));
        assert!(!report.passed());
    }

    #[test]
    fn test_coordinate_failures() {
        let mut grids = clean_grids();
        grids[1].lon = Array1::from(vec![-77.0, -78.0, -79.0]);
        let (store, region) = store_with(grids);
        let report = validate_domain(&store, &region, DOMAIN);
        assert!(report
            .failures
            .contains(&"historical_ecuador:tas lon not strictly increasing".to_string()));
        assert!(report
            .failures
            .contains(&"historical_ecuador: lon grid pr vs tas differ".to_string()));
    }

    #[test]
    fn test_time_problems() {
        let mut grids = clean_grids();
        let mut stamps = grids[0].time.stamps.clone();
        // Drop 10 January and repeat the final day
        stamps.remove(9);
        stamps.push(DayStamp::new(2000, 12, 31));
        grids[0].time = TimeAxis::daily(stamps);
        let (store, region) = store_with(grids);
        let report = validate_domain(&store, &region, DOMAIN);

        assert!(report
            .failures
            .contains(&"historical_ecuador:pr time has duplicates".to_string()));
        assert!(report
            .failures
            .contains(&"historical_ecuador:pr non-monotonic time steps <= 0".to_string()));
        assert!(report
            .warnings
            .contains(&"historical_ecuador:pr has 1 gap(s) >1 day".to_string()));
        assert!(report
            .warnings
            .contains(&"historical_ecuador:tas has 1 timestamp(s) not shared by all".to_string()));
    }

    #[test]
    fn test_warnings() {
        let mut grids = clean_grids();
        grids[0].units = Some("mm/day".to_string());
        grids[0].values.fill(5.0);
        grids[0].values[[0, 0, 0]] = f64::NAN;
        grids[0].values[[1, 0, 0]] = f64::NAN;
        for t in 0..10 {
            grids[3].values[[t, 1, 1]] = 290.0;
        }
        let (store, region) = store_with(grids);
        let report = validate_domain(&store, &region, DOMAIN);

        assert!(report.passed());
        assert!(report
            .warnings
            .contains(&"historical_ecuador:pr units 'mm/day' (expected kg m-2 s-1)".to_string()));
        assert!(report.warnings.contains(
            &"historical_ecuador: tas outside [tasmin,tasmax] count: below=0, above=10, inverted_spread=0"
                .to_string()
        ));
        // 2 of 366 * 9 cells stays under the 1% threshold
        assert!(!report.warnings.iter().any(|w| w.contains("NaN rate")));
    }

    #[test]
    fn test_nan_rate() {
        let mut grids = clean_grids();
        grids[1].values.slice_mut(ndarray::s![..10, .., ..]).fill(f64::NAN);
        let (store, region) = store_with(grids);
        let report = validate_domain(&store, &region, DOMAIN);
        assert_eq!(
            report.warnings,
            vec!["historical_ecuador:tas NaN rate 2.73% (>1%)".to_string()]
        );
    }

    #[test]
    fn test_sample_cells() {
        assert_eq!(sample_cells(3, 3, 3), vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(sample_cells(5, 2, 3), vec![(0, 0), (4, 1)]);
        assert_eq!(sample_cells(4, 4, 1), vec![(2, 2)]);
        assert!(sample_cells(0, 4, 3).is_empty());
    }

    #[test]
    fn test_pet_audit() {
        let (store, region) = store_with(clean_grids());
        assert_eq!(
            audit_pet_domain(&store, &region, DOMAIN),
            ValidationReport::default()
        );

        crate::pet::run_domain(&store, &region, DOMAIN, 4).unwrap().unwrap();
        crate::water_balance::run_domain(&store, &region, DOMAIN, 4)
            .unwrap()
            .unwrap();
        let report = audit_pet_domain(&store, &region, DOMAIN);
        assert!(report.passed(), "{:?}", report.failures);
        // 20 °C mean with a 20 °C daily range near the equator
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("PET unusually high"));

        let pet_path = domain_file(&region.output_domain_dir(DOMAIN), PET_VARIABLE, DOMAIN);
        let mut stored = store.read(&pet_path).unwrap().get(PET_VARIABLE).unwrap().clone();
        stored.values.mapv_inplace(|v| v + 0.5);
        store.insert(&pet_path, GridDataset::from_grids([stored]));
        let report = audit_pet_domain(&store, &region, DOMAIN);
        assert_eq!(report.failures.len(), PET_AUDIT_SAMPLES);
        assert!(report.failures[0].starts_with("historical_ecuador: PET at (-2.000, -79.000)"));
    }

    #[test]
    fn test_pet_audit_flags_dry_precipitation() {
        let mut grids = clean_grids();
        grids[0].values.fill(0.2 / 86_400.0);
        grids[2].values.fill(290.15);
        grids[3].values.fill(294.15);
        let (store, region) = store_with(grids);
        crate::pet::run_domain(&store, &region, DOMAIN, 4).unwrap().unwrap();
        crate::water_balance::run_domain(&store, &region, DOMAIN, 4)
            .unwrap()
            .unwrap();

        let report = audit_pet_domain(&store, &region, DOMAIN);
        assert!(report.passed());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("historical_ecuador: very low P (0.20 mm/day)"));
    }
}
