//! Climatic water balance `WB = P - PET` and its monthly and annual totals.

use crate::pet::PET_VARIABLE;
use crate::resolver::{domain_file, locate_inputs, read_variable};
use rswb_core::errors::RSWBResult;
use rswb_core::grid::{ClimateGrid, GridDataset, Resample};
use rswb_core::io::GridStore;
use rswb_core::region::Region;
use rswb_core::units::{normalize_precipitation, MM_PER_DAY};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const P_DAILY: &str = "p_mmday";
pub const PET_DAILY: &str = "pet_mmday";
pub const WB_DAILY: &str = "wb_mmday";

/// Daily and aggregated water-balance datasets for one region and domain.
#[derive(Clone, Debug, PartialEq)]
pub struct WaterBalance {
    /// `p_mmday`, `pet_mmday` and `wb_mmday`
    pub daily: GridDataset,
    /// `p_mon`, `pet_mon`, `wb_mon`, `p_ann`, `pet_ann` and `wb_ann`
    pub aggregated: GridDataset,
}

/// Paths written by [`run_domain`].
#[derive(Clone, Debug, PartialEq)]
pub struct WaterBalanceFiles {
    pub daily: PathBuf,
    pub aggregated: PathBuf,
}

fn rename(grid: &ClimateGrid, name: &str, long_name: &str) -> ClimateGrid {
    let mut out = grid.clone();
    out.name = name.to_string();
    out.with_units(MM_PER_DAY).with_long_name(long_name)
}

/// Combine precipitation and PET grids.
///
/// Precipitation is normalized to mm/day first; PET is expected in mm/day already. Both must
/// share coordinates.
pub fn compute_water_balance(
    precipitation: &ClimateGrid,
    pet: &ClimateGrid,
) -> RSWBResult<WaterBalance> {
    let (precipitation, decision) = normalize_precipitation(precipitation)?;
    debug!(decision = %decision, "Precipitation units");
    precipitation.check_compatible(pet)?;

    let p = rename(&precipitation, P_DAILY, "Precipitation");
    let pet = rename(pet, PET_DAILY, "Potential evapotranspiration");
    let wb = p
        .derive(WB_DAILY, &p.values - &pet.values)?
        .with_units(MM_PER_DAY)
        .with_long_name("Water balance (P - PET)");

    let mut aggregated = GridDataset::new();
    for (freq, suffix, units) in [
        (Resample::Monthly, "mon", "mm/month"),
        (Resample::Annual, "ann", "mm/year"),
    ] {
        for (grid, prefix) in [(&p, "p"), (&pet, "pet"), (&wb, "wb")] {
            let summed = grid
                .resample_sum(freq, format!("{prefix}_{suffix}"))
                .with_units(units);
            aggregated.insert(summed);
        }
    }

    Ok(WaterBalance {
        daily: GridDataset::from_grids([p, pet, wb]),
        aggregated,
    })
}

/// Compute and write `wb_<domain>.nc` and `wb_agg_<domain>.nc`.
///
/// Precipitation is read from the region input directory and PET from the output directory.
/// Returns `Ok(None)` when either is missing.
pub fn run_domain(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
    compression_level: i32,
) -> RSWBResult<Option<WaterBalanceFiles>> {
    let in_dir = region.input_domain_dir(domain_dir);
    let out_dir = region.output_domain_dir(domain_dir);
    let candidates = [
        vec![
            domain_file(&in_dir, "pr", domain_dir),
            domain_file(&out_dir, PET_VARIABLE, domain_dir),
        ],
        vec![in_dir.join("pr.nc"), out_dir.join("pet.nc")],
    ];
    let Some(paths) = locate_inputs(store, &candidates) else {
        warn!(
            region = %region.code,
            domain = %domain_dir,
            "Missing precipitation or PET, skipping water balance"
        );
        return Ok(None);
    };

    let precipitation = read_variable(store, &paths[0], &["pr", "precip"])?;
    let pet = read_variable(store, &paths[1], &[PET_VARIABLE])?;
    let balance = compute_water_balance(&precipitation, &pet)?;

    let files = WaterBalanceFiles {
        daily: domain_file(&out_dir, "wb", domain_dir),
        aggregated: domain_file(&out_dir, "wb_agg", domain_dir),
    };
    store.write(&files.daily, &balance.daily, compression_level)?;
    store.write(&files.aggregated, &balance.aggregated, compression_level)?;
    info!(
        region = %region.code,
        domain = %domain_dir,
        path = %files.daily.display(),
        "Wrote water balance"
    );
    Ok(Some(files))
}
