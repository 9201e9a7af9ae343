use super::{is_grid_file, GridStore};
use crate::errors::{RSWBError, RSWBResult};
use crate::grid::GridDataset;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// NetCDF files on the local filesystem.
///
/// Reading picks up every `(time, y, x)` variable of a file together with its 1-D latitude and
/// longitude, whether those are coordinate variables or auxiliary variables. Packing
/// (`scale_factor`, `add_offset`) and missing-value markers (`_FillValue`, `missing_value`) are
/// resolved to plain `f64` with `NaN` for missing cells.
///
/// Writing produces CF-1.8 files with `time`/`lat`/`lon` dimensions (plus one extra time
/// dimension per additional time axis), deflate compression with shuffle, and time encoded as
/// `days since 1850-01-01`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfStore;

impl NetcdfStore {
    pub fn new() -> Self {
        Self
    }
}

impl GridStore for NetcdfStore {
    fn read(&self, path: &Path) -> RSWBResult<GridDataset> {
        if !path.exists() {
            return Err(RSWBError::MissingFile(path.to_path_buf()));
        }
        read_dataset(path)
    }

    fn write(&self, path: &Path, dataset: &GridDataset, compression_level: i32) -> RSWBResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_dataset(path, dataset, compression_level)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_grids(&self, dir: &Path) -> RSWBResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| RSWBError::Error(e.to_string()))?;
            if entry.file_type().is_file() && is_grid_file(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(not(feature = "netcdf"))]
fn read_dataset(_path: &Path) -> RSWBResult<GridDataset> {
    Err(RSWBError::FeatureDisabled)
}

#[cfg(not(feature = "netcdf"))]
fn write_dataset(_path: &Path, _dataset: &GridDataset, _compression_level: i32) -> RSWBResult<()> {
    Err(RSWBError::FeatureDisabled)
}

#[cfg(feature = "netcdf")]
use cf::{read_dataset, write_dataset};

#[cfg(feature = "netcdf")]
mod cf {
    use crate::calendar::{Calendar, DayStamp, TimeUnits};
    use crate::errors::{RSWBError, RSWBResult};
    use crate::grid::{ClimateGrid, GridDataset, TimeAxis};
    use ndarray::{Array1, Array3};
    use std::collections::HashMap;
    use std::path::Path;
    use tracing::debug;

    const LAT_NAMES: [&str; 4] = ["lat", "latitude", "nav_lat", "y"];
    const LON_NAMES: [&str; 4] = ["lon", "longitude", "nav_lon", "x"];
    const FILL_VALUE: f64 = 1.0e20;

    fn attr_f64(var: &::netcdf::Variable, name: &str) -> Option<f64> {
        var.attribute_value(name)
            .and_then(|r| r.ok())
            .and_then(|v| match v {
                ::netcdf::AttributeValue::Double(d) => Some(d),
                ::netcdf::AttributeValue::Float(f) => Some(f as f64),
                ::netcdf::AttributeValue::Int(i) => Some(i as f64),
                ::netcdf::AttributeValue::Short(s) => Some(s as f64),
                _ => None,
            })
    }

    fn attr_string(var: &::netcdf::Variable, name: &str) -> Option<String> {
        var.attribute_value(name)
            .and_then(|r| r.ok())
            .and_then(|v| match v {
                ::netcdf::AttributeValue::Str(s) => Some(s),
                _ => None,
            })
    }

    /// Read a latitude or longitude vector, taking the first row/column of a 2-D array.
    fn read_axis(file: &::netcdf::File, names: &[&str], latitude: bool) -> RSWBResult<Option<(String, Array1<f64>)>> {
        for name in names {
            let Some(var) = file.variable(name) else {
                continue;
            };
            let dims = var.dimensions();
            let flat: Vec<f64> = var.get_values(..)?;
            let axis = match dims.len() {
                1 => Array1::from(flat),
                2 => {
                    let (n_y, n_x) = (dims[0].len(), dims[1].len());
                    if latitude {
                        (0..n_y).map(|j| flat[j * n_x]).collect()
                    } else {
                        flat[..n_x].iter().copied().collect()
                    }
                }
                _ => continue,
            };
            return Ok(Some((name.to_string(), axis)));
        }
        Ok(None)
    }

    fn read_time(file: &::netcdf::File, dim: &str, len: usize) -> RSWBResult<(Vec<DayStamp>, Calendar)> {
        let Some(var) = file.variable(dim) else {
            // No coordinate variable: number the days from the default epoch
            let units = TimeUnits::default();
            let stamps = Calendar::Standard.daily_range(units.epoch(), len)?;
            return Ok((stamps, Calendar::Standard));
        };
        let units_attr = attr_string(&var, "units").unwrap_or_default();
        let units = TimeUnits::parse(&units_attr)?;
        let calendar = Calendar::parse(&attr_string(&var, "calendar").unwrap_or_default())?;
        let offsets: Vec<f64> = var.get_values(..)?;
        let stamps = offsets
            .iter()
            .map(|&offset| units.decode(offset, calendar))
            .collect::<RSWBResult<Vec<_>>>()?;
        Ok((stamps, calendar))
    }

    pub fn read_dataset(path: &Path) -> RSWBResult<GridDataset> {
        let file = ::netcdf::open(path)?;
        let lat = read_axis(&file, &LAT_NAMES, true)?;
        let lon = read_axis(&file, &LON_NAMES, false)?;
        let ((lat_name, lat), (lon_name, lon)) = match (lat, lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(RSWBError::MissingCoordinates(path.to_path_buf())),
        };

        let mut axes: HashMap<String, (Vec<DayStamp>, Calendar)> = HashMap::new();
        let mut dataset = GridDataset::new();
        for var in file.variables() {
            let name = var.name();
            let dims = var.dimensions();
            if name == lat_name || name == lon_name || dims.len() != 3 {
                continue;
            }
            let (n_time, n_y, n_x) = (dims[0].len(), dims[1].len(), dims[2].len());
            if n_y != lat.len() || n_x != lon.len() {
                debug!(variable = %name, path = %path.display(), "Skipping variable off the lat/lon grid");
                continue;
            }

            let time_dim = dims[0].name();
            if !axes.contains_key(&time_dim) {
                let axis = read_time(&file, &time_dim, n_time)?;
                axes.insert(time_dim.clone(), axis);
            }
            let (stamps, calendar) = axes[&time_dim].clone();

            let scale = attr_f64(&var, "scale_factor").unwrap_or(1.0);
            let offset = attr_f64(&var, "add_offset").unwrap_or(0.0);
            let fills: Vec<f64> = ["_FillValue", "missing_value"]
                .iter()
                .filter_map(|a| attr_f64(&var, a))
                .collect();
            let raw: Vec<f64> = var.get_values(..)?;
            let values: Vec<f64> = raw
                .into_iter()
                .map(|v| {
                    if !v.is_finite() || fills.iter().any(|f| *f == v) || v.abs() >= 1e30 {
                        f64::NAN
                    } else {
                        v * scale + offset
                    }
                })
                .collect();
            let values = Array3::from_shape_vec((n_time, n_y, n_x), values).map_err(|e| {
                RSWBError::MalformedGrid {
                    name: name.clone(),
                    details: e.to_string(),
                }
            })?;

            let dim = if time_dim == "time" { TimeAxis::DAILY.to_string() } else { time_dim.clone() };
            let mut grid = ClimateGrid::new(
                name.clone(),
                lat.clone(),
                lon.clone(),
                TimeAxis::new(dim, stamps),
                calendar,
                values,
            )?;
            grid.units = attr_string(&var, "units");
            grid.long_name = attr_string(&var, "long_name");
            dataset.insert(grid);
        }

        if dataset.is_empty() {
            return Err(RSWBError::MalformedGrid {
                name: path.display().to_string(),
                details: "no (time, lat, lon) variable".to_string(),
            });
        }
        Ok(dataset)
    }

    pub fn write_dataset(path: &Path, dataset: &GridDataset, compression_level: i32) -> RSWBResult<()> {
        let first = dataset
            .first()
            .ok_or_else(|| RSWBError::Error(format!("refusing to write an empty dataset to {}", path.display())))?;
        let units = TimeUnits::default();
        let mut file = ::netcdf::create(path)?;

        file.add_dimension("lat", first.lat.len())?;
        file.add_dimension("lon", first.lon.len())?;
        {
            let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
            lat.put_attribute("standard_name", "latitude")?;
            lat.put_attribute("units", "degrees_north")?;
            lat.put_attribute("axis", "Y")?;
            lat.put_values(&first.lat.to_vec(), ..)?;
        }
        {
            let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
            lon.put_attribute("standard_name", "longitude")?;
            lon.put_attribute("units", "degrees_east")?;
            lon.put_attribute("axis", "X")?;
            lon.put_values(&first.lon.to_vec(), ..)?;
        }

        let mut written_axes: Vec<String> = Vec::new();
        for grid in dataset.iter() {
            if grid.lat != first.lat || grid.lon != first.lon {
                return Err(RSWBError::GridMismatch {
                    left: first.name.clone(),
                    right: grid.name.clone(),
                    axis: "latitude/longitude".to_string(),
                });
            }
            let time_dim = grid.time.dim.as_str();
            if !written_axes.iter().any(|d| d == time_dim) {
                let offsets = grid
                    .time
                    .stamps
                    .iter()
                    .map(|stamp| units.encode(*stamp, grid.calendar))
                    .collect::<RSWBResult<Vec<f64>>>()?;
                file.add_dimension(time_dim, grid.n_time())?;
                let mut time = file.add_variable::<f64>(time_dim, &[time_dim])?;
                time.put_attribute("standard_name", "time")?;
                time.put_attribute("units", units.to_cf_string())?;
                time.put_attribute("calendar", grid.calendar.cf_name())?;
                time.put_attribute("axis", "T")?;
                time.put_values(&offsets, ..)?;
                written_axes.push(time_dim.to_string());
            }

            let mut var = file.add_variable::<f64>(&grid.name, &[time_dim, "lat", "lon"])?;
            var.set_compression(compression_level, true)?;
            var.put_attribute("_FillValue", FILL_VALUE)?;
            if let Some(u) = &grid.units {
                var.put_attribute("units", u.as_str())?;
            }
            if let Some(long_name) = &grid.long_name {
                var.put_attribute("long_name", long_name.as_str())?;
            }
            let flat: Vec<f64> = grid
                .values
                .iter()
                .map(|v| if v.is_finite() { *v } else { FILL_VALUE })
                .collect();
            var.put_values(&flat, ..)?;
        }

        file.add_attribute("Conventions", "CF-1.8")?;
        for (key, value) in &dataset.attributes {
            file.add_attribute(key, value.as_str())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_grids_on_disk() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("tas_historical.nc"), b"").unwrap();
        std::fs::write(dir.path().join("pr_historical.nc"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested.nc")).unwrap();

        let store = NetcdfStore::new();
        let names: Vec<String> = store
            .list_grids(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["pr_historical.nc", "tas_historical.nc"]);
        assert!(store.dir_exists(dir.path()));
        assert!(!store.exists(&dir.path().join("missing.nc")));
    }

    #[test]
    fn test_missing_file() {
        let store = NetcdfStore::new();
        assert!(matches!(
            store.read(Path::new("/nonexistent/pr.nc")),
            Err(RSWBError::MissingFile(_))
        ));
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_feature_disabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pr.nc");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            NetcdfStore::new().read(&path),
            Err(RSWBError::FeatureDisabled)
        ));
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn test_round_trip() {
        use crate::calendar::{Calendar, DayStamp};
        use crate::grid::{ClimateGrid, Resample, TimeAxis};
        use ndarray::array;

        let dir = tempdir().unwrap();
        let path = dir.path().join("wb_agg.nc");
        let stamps = Calendar::NoLeap
            .daily_range(DayStamp::new(2000, 1, 1), 400)
            .unwrap();
        let mut daily = ClimateGrid::filled(
            "p_mmday",
            array![-1.0, 0.0],
            array![-79.0, -78.0, -77.0],
            TimeAxis::daily(stamps),
            Calendar::NoLeap,
            2.5,
        )
        .with_units("mm/day");
        daily.values[[0, 0, 0]] = f64::NAN;
        let annual = daily.resample_sum(Resample::Annual, "p_ann");
        let dataset = GridDataset::from_grids([daily.clone(), annual.clone()]);

        let store = NetcdfStore::new();
        store.write(&path, &dataset, 4).unwrap();
        let read = store.read(&path).unwrap();

        let p = read.get("p_mmday").unwrap();
        assert_eq!(p.time.stamps, daily.time.stamps);
        assert_eq!(p.calendar, Calendar::NoLeap);
        assert!(p.values[[0, 0, 0]].is_nan());
        assert_eq!(p.values[[1, 1, 2]], 2.5);
        assert_eq!(p.units.as_deref(), Some("mm/day"));
        assert_eq!(read.get("p_ann").unwrap().time.dim, TimeAxis::ANNUAL);
    }
}
