//! Hargreaves potential evapotranspiration
//!
//! $$ PET = c \cdot R_a \cdot (T_{mean} + 17.8) \cdot \sqrt{\max(T_{max} - T_{min}, 0)} $$
//!
//! Where:
//! - $c = 0.0023$ is the Hargreaves coefficient
//! - $R_a$ is the daily extraterrestrial radiation (MJ m⁻² day⁻¹) for the cell latitude and
//!   day of year
//! - temperatures are in °C and the result is in mm/day
//!
//! ```rust
//! use rswb_components::pet::{extraterrestrial_radiation, hargreaves};
//!
//! let ra = extraterrestrial_radiation(-1.5, 32);
//! assert_eq!(hargreaves(12.0, 12.0, 15.0, ra), 0.0);
//! assert!(hargreaves(10.0, 30.0, 20.0, ra) > 0.0);
//! ```

use crate::resolver::{domain_file, locate_inputs, read_variable};
use ndarray::{Array2, Array3};
use rswb_core::errors::RSWBResult;
use rswb_core::grid::{ClimateGrid, GridDataset};
use rswb_core::io::GridStore;
use rswb_core::region::Region;
use rswb_core::units::{normalize_temperature, MM_PER_DAY};
use std::f64::consts::PI;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Hargreaves empirical coefficient
pub const HARGREAVES_COEFFICIENT: f64 = 0.0023;
/// Offset added to the mean temperature
/// unit: °C
pub const TEMPERATURE_OFFSET: f64 = 17.8;
/// Solar constant
/// unit: MJ m^-2 min^-1
pub const SOLAR_CONSTANT: f64 = 0.0820;

/// Variable name of the PET grid
pub const PET_VARIABLE: &str = "pet";

/// Daily extraterrestrial radiation (MJ m⁻² day⁻¹).
///
/// Uses the inverse relative Earth-Sun distance, the solar declination and the sunset hour
/// angle. The hour-angle argument is clipped to [-1, 1] so polar day and night stay defined.
pub fn extraterrestrial_radiation(lat_deg: f64, day_of_year: u32) -> f64 {
    let phi = lat_deg.to_radians();
    let angle = 2.0 * PI * f64::from(day_of_year) / 365.0;
    let dr = 1.0 + 0.033 * angle.cos();
    let declination = 0.409 * (angle - 1.39).sin();
    let sunset = (-phi.tan() * declination.tan()).clamp(-1.0, 1.0).acos();

    (24.0 * 60.0 / PI)
        * SOLAR_CONSTANT
        * dr
        * (sunset * phi.sin() * declination.sin()
            + phi.cos() * declination.cos() * sunset.sin())
}

/// Hargreaves PET for one cell and day. A missing input gives `NaN`.
pub fn hargreaves(tmin: f64, tmax: f64, tmean: f64, ra: f64) -> f64 {
    let range = tmax - tmin;
    // NaN survives the comparison
    let range = if range < 0.0 { 0.0 } else { range };
    HARGREAVES_COEFFICIENT * ra * (tmean + TEMPERATURE_OFFSET) * range.sqrt()
}

/// Compute a PET grid from minimum, maximum and mean temperature grids.
///
/// Each input is normalized to °C independently, and the three grids must share coordinates.
pub fn compute_pet(
    tmin: &ClimateGrid,
    tmax: &ClimateGrid,
    tmean: &ClimateGrid,
) -> RSWBResult<ClimateGrid> {
    let (tmin, tmin_units) = normalize_temperature(tmin)?;
    let (tmax, tmax_units) = normalize_temperature(tmax)?;
    let (tmean, tmean_units) = normalize_temperature(tmean)?;
    debug!(
        tmin = %tmin_units,
        tmax = %tmax_units,
        tmean = %tmean_units,
        "Temperature units"
    );
    tmin.check_compatible(&tmax)?;
    tmin.check_compatible(&tmean)?;

    let ra = Array2::from_shape_fn((tmin.n_time(), tmin.lat.len()), |(t, i)| {
        let doy = tmin.calendar.day_of_year(tmin.time.stamps[t]);
        extraterrestrial_radiation(tmin.lat[i], doy)
    });
    let values = Array3::from_shape_fn(tmin.values.dim(), |(t, i, j)| {
        hargreaves(
            tmin.values[[t, i, j]],
            tmax.values[[t, i, j]],
            tmean.values[[t, i, j]],
            ra[[t, i]],
        )
    });

    Ok(tmin
        .derive(PET_VARIABLE, values)?
        .with_units(MM_PER_DAY)
        .with_long_name("Hargreaves PET"))
}

/// Compute and write `pet_<domain>.nc` for one region and domain.
///
/// Returns `Ok(None)` when the temperature inputs are missing.
pub fn run_domain(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
    compression_level: i32,
) -> RSWBResult<Option<PathBuf>> {
    let in_dir = region.input_domain_dir(domain_dir);
    let variables = ["tasmin", "tasmax", "tas"];
    let candidates = [
        variables
            .iter()
            .map(|v| domain_file(&in_dir, v, domain_dir))
            .collect::<Vec<_>>(),
        variables
            .iter()
            .map(|v| in_dir.join(format!("{v}.nc")))
            .collect(),
    ];
    let Some(paths) = locate_inputs(store, &candidates) else {
        warn!(
            region = %region.code,
            domain = %domain_dir,
            path = %in_dir.display(),
            "Missing temperature files, skipping PET"
        );
        return Ok(None);
    };

    let tmin = read_variable(store, &paths[0], &["tasmin", "tmin"])?;
    let tmax = read_variable(store, &paths[1], &["tasmax", "tmax"])?;
    let tmean = read_variable(store, &paths[2], &["tas", "tmean"])?;
    let pet = compute_pet(&tmin, &tmax, &tmean)?;

    let out_path = domain_file(&region.output_domain_dir(domain_dir), PET_VARIABLE, domain_dir);
    let dataset = GridDataset::from_grids([pet])
        .with_attribute("title", "Hargreaves potential evapotranspiration");
    store.write(&out_path, &dataset, compression_level)?;
    info!(region = %region.code, domain = %domain_dir, path = %out_path.display(), "Wrote PET");
    Ok(Some(out_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use approx::assert_abs_diff_eq;
    use is_close::is_close;
    use rswb_core::errors::RSWBError;
    use rswb_core::io::MemoryStore;
    use std::path::Path;

    #[test]
    fn test_extraterrestrial_radiation() {
        // 3 September at 20°S
        assert_abs_diff_eq!(extraterrestrial_radiation(-20.0, 246), 32.19, epsilon = 0.01);
        assert_abs_diff_eq!(extraterrestrial_radiation(0.0, 1), 35.746, epsilon = 1e-3);
        // Polar night
        assert_abs_diff_eq!(extraterrestrial_radiation(80.0, 1), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_hargreaves() {
        let ra = extraterrestrial_radiation(0.0, 1);
        let pet = hargreaves(10.0, 30.0, 20.0, ra);
        assert!(is_close!(pet, 0.0023 * ra * 37.8 * 20.0_f64.sqrt()));
        assert_eq!(hargreaves(15.0, 15.0, 15.0, ra), 0.0);
        // Inverted pairs are clamped rather than producing NaN
        assert_eq!(hargreaves(20.0, 18.0, 19.0, ra), 0.0);
        assert!(hargreaves(f64::NAN, 18.0, 19.0, ra).is_nan());
    }

    #[test]
    fn test_pet_non_negative() {
        for lat in [-60.0, -20.0, 0.0, 35.0, 70.0] {
            for doy in [1, 80, 172, 266, 355] {
                let ra = extraterrestrial_radiation(lat, doy);
                for (tmin, tmax) in [(-10.0, -2.0), (0.0, 0.0), (12.0, 31.0)] {
                    let pet = hargreaves(tmin, tmax, (tmin + tmax) / 2.0, ra);
                    assert!(pet >= 0.0, "lat {lat} doy {doy}: {pet}");
                }
            }
        }
    }

    #[test]
    fn test_compute_pet_normalizes_inputs() {
        let tmin = testing::uniform("tasmin", 283.15, 2000, 1).with_units("K");
        let tmax = testing::uniform("tasmax", 30.0, 2000, 1).with_units("degC");
        let tmean = testing::uniform("tas", 20.0, 2000, 1);
        let pet = compute_pet(&tmin, &tmax, &tmean).unwrap();

        assert_eq!(pet.name, "pet");
        assert_eq!(pet.units.as_deref(), Some("mm/day"));
        let expected = hargreaves(10.0, 30.0, 20.0, extraterrestrial_radiation(-2.0, 1));
        assert_abs_diff_eq!(pet.values[[0, 0, 2]], expected, epsilon = 1e-9);
        assert_abs_diff_eq!(pet.values[[0, 0, 0]], pet.values[[0, 0, 1]]);
    }

    #[test]
    fn test_compute_pet_rejects_misaligned_grids() {
        let tmin = testing::uniform("tasmin", 10.0, 2000, 1);
        let tmax = testing::uniform("tasmax", 30.0, 2001, 1);
        let tmean = testing::uniform("tas", 20.0, 2000, 1);
        assert!(matches!(
            compute_pet(&tmin, &tmax, &tmean),
            Err(RSWBError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_run_domain() {
        let store = MemoryStore::new();
        let region = Region::new("Napo", "/in", "/out");
        let dom = "historical_ecuador";
        assert_eq!(run_domain(&store, &region, dom, 4).unwrap(), None);

        store.insert(
            "/in/historical_ecuador/tasmin.nc",
            GridDataset::from_grids([testing::uniform("tmin", 10.0, 2000, 1)]),
        );
        store.insert(
            "/in/historical_ecuador/tasmax.nc",
            GridDataset::from_grids([testing::uniform("tmax", 30.0, 2000, 1)]),
        );
        store.insert(
            "/in/historical_ecuador/tas.nc",
            GridDataset::from_grids([testing::uniform("tmean", 20.0, 2000, 1)]),
        );
        let out = run_domain(&store, &region, dom, 4).unwrap().unwrap();
        assert_eq!(out, Path::new("/out/historical_ecuador/pet_historical_ecuador.nc"));
        let written = store.read(&out).unwrap();
        assert!(written.get("pet").unwrap().values.iter().all(|&v| v > 0.0));
    }
}
