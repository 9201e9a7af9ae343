//! Area-weighted monthly and annual water-balance tables.
//!
//! Written as CSV next to the water-balance grids:
//!
//! - `wb_monthly_mean_<domain>.csv`: `Year,Month,P_mon_mm,PET_mon_mm,WB_mon_mm`
//! - `wb_annual_mean_<domain>.csv`: `Year,P_ann_mm,PET_ann_mm,WB_ann_mm`
//!
//! Missing values are left empty.

use crate::resolver::domain_file;
use rswb_core::errors::{RSWBError, RSWBResult};
use rswb_core::grid::GridDataset;
use rswb_core::io::GridStore;
use rswb_core::region::Region;
use rswb_core::series::DailySeries;
use rswb_core::spatial::area_weighted_mean;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct MonthlyRow {
    pub year: i32,
    pub month: u32,
    pub p: f64,
    pub pet: f64,
    pub wb: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnualRow {
    pub year: i32,
    pub p: f64,
    pub pet: f64,
    pub wb: f64,
}

fn regional(aggregated: &GridDataset, name: &str) -> RSWBResult<DailySeries> {
    aggregated
        .get(name)
        .map(area_weighted_mean)
        .ok_or_else(|| RSWBError::Error(format!("aggregated dataset lacks '{name}'")))
}

/// Regional monthly totals from a `wb_agg` dataset.
pub fn monthly_table(aggregated: &GridDataset) -> RSWBResult<Vec<MonthlyRow>> {
    let p = regional(aggregated, "p_mon")?;
    let pet = regional(aggregated, "pet_mon")?;
    let wb = regional(aggregated, "wb_mon")?;
    Ok(p
        .stamps
        .iter()
        .enumerate()
        .map(|(i, stamp)| MonthlyRow {
            year: stamp.year,
            month: stamp.month,
            p: p.values[i],
            pet: pet.values[i],
            wb: wb.values[i],
        })
        .collect())
}

/// Regional annual totals from a `wb_agg` dataset.
pub fn annual_table(aggregated: &GridDataset) -> RSWBResult<Vec<AnnualRow>> {
    let p = regional(aggregated, "p_ann")?;
    let pet = regional(aggregated, "pet_ann")?;
    let wb = regional(aggregated, "wb_ann")?;
    Ok(p
        .stamps
        .iter()
        .enumerate()
        .map(|(i, stamp)| AnnualRow {
            year: stamp.year,
            p: p.values[i],
            pet: pet.values[i],
            wb: wb.values[i],
        })
        .collect())
}

fn cell(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

pub fn write_monthly_csv(path: &Path, rows: &[MonthlyRow]) -> RSWBResult<()> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "Year,Month,P_mon_mm,PET_mon_mm,WB_mon_mm")?;
    for row in rows {
        writeln!(
            file,
            "{},{},{},{},{}",
            row.year,
            row.month,
            cell(row.p),
            cell(row.pet),
            cell(row.wb)
        )?;
    }
    file.flush()?;
    Ok(())
}

pub fn write_annual_csv(path: &Path, rows: &[AnnualRow]) -> RSWBResult<()> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "Year,P_ann_mm,PET_ann_mm,WB_ann_mm")?;
    for row in rows {
        writeln!(
            file,
            "{},{},{},{}",
            row.year,
            cell(row.p),
            cell(row.pet),
            cell(row.wb)
        )?;
    }
    file.flush()?;
    Ok(())
}

/// Write both tables for one region and domain. `Ok(None)` when `wb_agg` is missing.
pub fn run_domain(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
) -> RSWBResult<Option<(PathBuf, PathBuf)>> {
    let out_dir = region.output_domain_dir(domain_dir);
    let agg_path = domain_file(&out_dir, "wb_agg", domain_dir);
    if !store.exists(&agg_path) {
        warn!(region = %region.code, domain = %domain_dir, "No aggregated water balance, skipping tables");
        return Ok(None);
    }
    let aggregated = store.read(&agg_path)?;

    fs::create_dir_all(&out_dir)?;
    let monthly = domain_file(&out_dir, "wb_monthly_mean", domain_dir).with_extension("csv");
    let annual = domain_file(&out_dir, "wb_annual_mean", domain_dir).with_extension("csv");
    write_monthly_csv(&monthly, &monthly_table(&aggregated)?)?;
    write_annual_csv(&annual, &annual_table(&aggregated)?)?;
    info!(region = %region.code, domain = %domain_dir, path = %annual.display(), "Wrote tables");
    Ok(Some((monthly, annual)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::water_balance::compute_water_balance;
    use approx::assert_abs_diff_eq;
    use rswb_core::io::MemoryStore;

    fn aggregated() -> GridDataset {
        let p = testing::uniform("pr", 5.0, 2000, 2);
        let pet = testing::uniform("pet", 3.0, 2000, 2).with_units("mm/day");
        compute_water_balance(&p, &pet).unwrap().aggregated
    }

    #[test]
    fn test_tables() {
        let agg = aggregated();
        let monthly = monthly_table(&agg).unwrap();
        assert_eq!(monthly.len(), 24);
        let february = &monthly[1];
        assert_eq!((february.year, february.month), (2000, 2));
        assert_abs_diff_eq!(february.p, 145.0, epsilon = 1e-9);
        assert_abs_diff_eq!(february.pet, 87.0, epsilon = 1e-9);
        assert_abs_diff_eq!(february.wb, 58.0, epsilon = 1e-9);

        let annual = annual_table(&agg).unwrap();
        assert_eq!(annual.len(), 2);
        assert_eq!(annual[1].year, 2001);
        assert_abs_diff_eq!(annual[1].wb, 730.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cells_outside_region_stay_out_of_totals() {
        let mut p = testing::uniform("pr", 5.0, 2000, 2);
        let mut pet = testing::uniform("pet", 3.0, 2000, 2).with_units("mm/day");
        // Western column lies outside the clip polygon
        for grid in [&mut p, &mut pet] {
            grid.values.slice_mut(ndarray::s![.., .., 0]).fill(f64::NAN);
        }
        let agg = compute_water_balance(&p, &pet).unwrap().aggregated;
        assert!(agg.get("wb_ann").unwrap().values[[0, 1, 0]].is_nan());

        let annual = annual_table(&agg).unwrap();
        assert_abs_diff_eq!(annual[0].p, 5.0 * 366.0, epsilon = 1e-9);
        assert_abs_diff_eq!(annual[1].wb, 730.0, epsilon = 1e-9);
    }

    #[test]
    fn test_run_domain_writes_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let region = Region::new("Napo", tmp.path().join("in"), tmp.path().join("out"));
        let store = MemoryStore::new();
        let dom = "historical_ecuador";
        assert_eq!(run_domain(&store, &region, dom).unwrap(), None);

        store.insert(
            domain_file(&region.output_domain_dir(dom), "wb_agg", dom),
            aggregated(),
        );
        let (monthly, annual) = run_domain(&store, &region, dom).unwrap().unwrap();
        assert!(monthly.ends_with("historical_ecuador/wb_monthly_mean_historical_ecuador.csv"));

        let text = fs::read_to_string(annual).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Year,P_ann_mm,PET_ann_mm,WB_ann_mm");
        let fields: Vec<f64> = lines[1].split(',').map(|f| f.parse().unwrap()).collect();
        assert_eq!(fields[0], 2000.0);
        assert_abs_diff_eq!(fields[1], 1830.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fields[3], 732.0, epsilon = 1e-9);
        assert_eq!(fs::read_to_string(monthly).unwrap().lines().count(), 25);
    }

    #[test]
    fn test_missing_values_are_empty() {
        let rows = [AnnualRow {
            year: 2100,
            p: f64::NAN,
            pet: 1.5,
            wb: f64::NAN,
        }];
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.csv");
        write_annual_csv(&path, &rows).unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "Year,P_ann_mm,PET_ann_mm,WB_ann_mm\n2100,,1.5,\n"
        );
    }
}
