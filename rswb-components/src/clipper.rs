//! Clipping national source grids to a region polygon.
//!
//! Every grid file found for a domain is cropped to the bounding box of the cells whose centre
//! lies inside the region; cells inside that box but outside the polygon become `NaN`. Legacy
//! one-letter prefixes are rewritten on the way so that later stages only see the canonical
//! `pr`/`tas`/`tasmin`/`tasmax` names.

use crate::resolver::{resolve_domain, DomainResolution};
use rswb_core::config::PipelineConfig;
use rswb_core::domain::Domain;
use rswb_core::errors::{RSWBError, RSWBResult};
use rswb_core::geometry::RegionGeometry;
use rswb_core::grid::{ClimateGrid, GridDataset};
use rswb_core::io::GridStore;
use rswb_core::region::Region;
use ndarray::{s, Axis};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rewrite a legacy file-name prefix (`P_`, `T_`) to the canonical variable prefix.
pub fn standardize_file_name(file_name: &str) -> String {
    if let Some(rest) = file_name.strip_prefix("P_") {
        format!("pr_{rest}")
    } else if let Some(rest) = file_name.strip_prefix("T_") {
        format!("tas_{rest}")
    } else {
        file_name.to_string()
    }
}

/// Canonical name of a source variable. Unknown names pass through.
pub fn standardize_variable_name(name: &str) -> &str {
    match name {
        "P" | "precip" => "pr",
        "T" | "tmean" => "tas",
        "tmin" => "tasmin",
        "tmax" => "tasmax",
        other => other,
    }
}

/// Clip one grid to the region.
pub fn clip_grid(grid: &ClimateGrid, geometry: &RegionGeometry) -> RSWBResult<ClimateGrid> {
    let mask = geometry.cell_mask(&grid.lat, &grid.lon);
    let rows: Vec<usize> = mask
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().any(|&inside| inside))
        .map(|(i, _)| i)
        .collect();
    let cols: Vec<usize> = mask
        .axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, col)| col.iter().any(|&inside| inside))
        .map(|(j, _)| j)
        .collect();

    let (Some(&r0), Some(&r1), Some(&c0), Some(&c1)) =
        (rows.first(), rows.last(), cols.first(), cols.last())
    else {
        return Err(RSWBError::EmptyClip(grid.name.clone()));
    };

    let mut clipped = grid.crop(r0..r1 + 1, c0..c1 + 1);
    let window = mask.slice(s![r0..=r1, c0..=c1]);
    for ((i, j), &inside) in window.indexed_iter() {
        if !inside {
            clipped.values.slice_mut(s![.., i, j]).fill(f64::NAN);
        }
    }
    Ok(clipped)
}

/// Clip every variable of a dataset, renaming variables to their canonical names.
pub fn clip_dataset(dataset: &GridDataset, geometry: &RegionGeometry) -> RSWBResult<GridDataset> {
    let mut clipped = GridDataset::new();
    clipped.attributes = dataset.attributes.clone();
    for grid in dataset.iter() {
        let mut out = clip_grid(grid, geometry)?;
        out.name = standardize_variable_name(&grid.name).to_string();
        clipped.insert(out);
    }
    Ok(clipped)
}

/// A source file that could not be clipped.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of clipping one region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipReport {
    /// Number of files written
    pub clipped: usize,
    pub failures: Vec<ClipFailure>,
    /// Domains for which no source directory exists
    pub missing_domains: Vec<Domain>,
}

/// Load the region polygon named by the region, reprojected to WGS84.
pub fn load_region_geometry(region: &Region) -> RSWBResult<RegionGeometry> {
    let path = region.geometry.as_ref().ok_or_else(|| {
        RSWBError::Geometry(format!("region '{}' has no geometry", region.code))
    })?;
    RegionGeometry::from_shapefile(path, region.crs.as_deref())
}

fn clip_file(
    store: &dyn GridStore,
    source: &Path,
    out_dir: &Path,
    geometry: &RegionGeometry,
    compression_level: i32,
) -> RSWBResult<PathBuf> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RSWBError::Error(format!("invalid file name: {}", source.display())))?;
    let out_path = out_dir.join(standardize_file_name(file_name));

    let dataset = store.read(source)?;
    let clipped = clip_dataset(&dataset, geometry)?;
    store.write(&out_path, &clipped, compression_level)?;
    Ok(out_path)
}

/// Clip the national grids of every domain into the region's input directory.
///
/// Source directories are found with the resolver, restricted to the region's data source
/// when it has one. Failures are collected per file and never stop the remaining files.
pub fn clip_region(
    store: &dyn GridStore,
    source_root: &Path,
    region: &Region,
    geometry: &RegionGeometry,
    config: &PipelineConfig,
) -> ClipReport {
    let mut report = ClipReport::default();
    info!(
        region = %region.code,
        source = ?region.data_source,
        "Clipping national grids"
    );

    for domain in Domain::ALL {
        let domain_dir = config.domain_dir(domain);
        let source_dir = match resolve_domain(
            store,
            source_root,
            &domain_dir,
            region.data_source.as_deref(),
            &config.source_namespaces,
        ) {
            DomainResolution::Found { path, .. } => path,
            DomainResolution::NotFound { .. } => {
                report.missing_domains.push(domain);
                continue;
            }
        };

        let files = match store.list_grids(&source_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %source_dir.display(), error = %e, "Cannot list source grids");
                report.failures.push(ClipFailure {
                    path: source_dir,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if files.is_empty() {
            warn!(path = %source_dir.display(), "No grid files in source directory");
            continue;
        }

        let out_dir = region.input_domain_dir(&domain_dir);
        for file in files {
            match clip_file(store, &file, &out_dir, geometry, config.compression_level) {
                Ok(out_path) => {
                    debug!(source = %file.display(), output = %out_path.display(), "Clipped");
                    report.clipped += 1;
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Clip failed");
                    report.failures.push(ClipFailure {
                        path: file,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    info!(
        region = %region.code,
        clipped = report.clipped,
        failed = report.failures.len(),
        "Clipping finished"
    );
    report
}
