//! Per-cell mean annual water balance over fixed periods, for the scenario maps.
//!
//! For each future scenario and period the daily `wb_mmday` grid is summed per calendar year
//! and the annual totals are averaged, giving one mm/year value per cell. The grids are written
//! to `<output>/wb_periods/wb_<domain>_<period>.nc`.

use crate::resolver::{domain_file, locate_inputs, read_variable};
use crate::water_balance::WB_DAILY;
use ndarray::Axis;
use rswb_core::calendar::DayStamp;
use rswb_core::domain::TimeWindow;
use rswb_core::errors::RSWBResult;
use rswb_core::grid::{ClimateGrid, GridDataset, Resample, TimeAxis};
use rswb_core::io::GridStore;
use rswb_core::region::Region;
use rswb_core::series::nan_mean;
use std::path::PathBuf;
use tracing::{info, warn};

/// Directory under the region output holding the period grids
pub const PERIODS_DIR: &str = "wb_periods";
pub const WB_PERIOD_MEAN: &str = "wb_ann_mean";

/// Mean of the annual water-balance totals of the years inside `period`.
///
/// The result has a single time step stamped with the first day of the period. Returns `None`
/// when no day of `wb` falls inside the period.
pub fn period_mean(wb: &ClimateGrid, period: &TimeWindow) -> RSWBResult<Option<ClimateGrid>> {
    let Some(sliced) = wb.slice_years(period) else {
        return Ok(None);
    };
    let annual = sliced.resample_sum(Resample::Annual, WB_PERIOD_MEAN);
    let mean = annual
        .values
        .map_axis(Axis(0), |cell| nan_mean(cell.iter().copied()))
        .insert_axis(Axis(0));

    let grid = ClimateGrid::new(
        WB_PERIOD_MEAN,
        wb.lat.clone(),
        wb.lon.clone(),
        TimeAxis::annual(vec![DayStamp::new(period.start, 1, 1)]),
        wb.calendar,
        mean,
    )?
    .with_units("mm/year")
    .with_long_name(format!("Mean annual water balance {}", period.label()));
    Ok(Some(grid))
}

/// Write one period grid per entry of `periods` that overlaps the domain's water balance.
///
/// Returns `Ok(None)` when `wb_<domain>.nc` is missing or no period has data.
pub fn run_domain(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
    periods: &[TimeWindow],
    compression_level: i32,
) -> RSWBResult<Option<Vec<PathBuf>>> {
    let out_dir = region.output_domain_dir(domain_dir);
    let candidates = [
        vec![domain_file(&out_dir, "wb", domain_dir)],
        vec![out_dir.join("wb.nc")],
    ];
    let Some(paths) = locate_inputs(store, &candidates) else {
        warn!(region = %region.code, domain = %domain_dir, "No water balance, skipping period grids");
        return Ok(None);
    };
    let wb = read_variable(store, &paths[0], &[WB_DAILY])?;

    let target = region.output_dir.join(PERIODS_DIR);
    let mut written = Vec::new();
    for period in periods {
        let Some(grid) = period_mean(&wb, period)? else {
            warn!(
                region = %region.code,
                domain = %domain_dir,
                period = %period,
                "No data in period"
            );
            continue;
        };
        let path = target.join(format!("wb_{domain_dir}_{}.nc", period.label()));
        let dataset = GridDataset::from_grids([grid])
            .with_attribute("period", period.label())
            .with_attribute("crs", "EPSG:4326");
        store.write(&path, &dataset, compression_level)?;
        written.push(path);
    }

    if written.is_empty() {
        return Ok(None);
    }
    info!(
        region = %region.code,
        domain = %domain_dir,
        grids = written.len(),
        "Wrote period water balance"
    );
    Ok(Some(written))
}
