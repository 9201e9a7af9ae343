//! Gridded daily climate variables.
//!
//! A [`ClimateGrid`] holds one physical quantity on a regular latitude/longitude grid with a
//! time axis. Values are stored as an `(time, lat, lon)` array where missing cells (including
//! cells outside a clipped region) are `NaN`.
//!
//! Grids from the same region and domain are expected to share their coordinates. That is
//! never assumed: [`ClimateGrid::check_compatible`] must succeed before two grids are combined
//! elementwise.
//!
//! ```rust
//! use ndarray::array;
//! use rswb_core::calendar::{Calendar, DayStamp};
//! use rswb_core::grid::{ClimateGrid, TimeAxis};
//!
//! let stamps = Calendar::Standard.daily_range(DayStamp::new(2000, 1, 1), 3).unwrap();
//! let grid = ClimateGrid::filled(
//!     "pr",
//!     array![-1.0, 0.0],
//!     array![-79.0, -78.0],
//!     TimeAxis::daily(stamps),
//!     Calendar::Standard,
//!     5.0,
//! );
//! assert_eq!(grid.values.dim(), (3, 2, 2));
//! ```

use crate::calendar::{Calendar, DayStamp};
use crate::domain::TimeWindow;
use crate::errors::{RSWBError, RSWBResult};
use crate::series::nan_sum;
use indexmap::IndexMap;
use ndarray::{s, Array1, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Maximum coordinate difference (degrees) for two grids to be considered aligned
pub const COORD_TOLERANCE: f64 = 1e-6;

/// Target frequency when summing a daily grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resample {
    Monthly,
    Annual,
}

/// A named time dimension and its stamps.
///
/// Daily, monthly and annual grids can share one file, so each frequency has its own
/// dimension name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAxis {
    pub dim: String,
    pub stamps: Vec<DayStamp>,
}

impl TimeAxis {
    pub const DAILY: &'static str = "time";
    pub const MONTHLY: &'static str = "time_mon";
    pub const ANNUAL: &'static str = "time_ann";

    pub fn new(dim: impl Into<String>, stamps: Vec<DayStamp>) -> Self {
        Self {
            dim: dim.into(),
            stamps,
        }
    }

    pub fn daily(stamps: Vec<DayStamp>) -> Self {
        Self::new(Self::DAILY, stamps)
    }

    pub fn monthly(stamps: Vec<DayStamp>) -> Self {
        Self::new(Self::MONTHLY, stamps)
    }

    pub fn annual(stamps: Vec<DayStamp>) -> Self {
        Self::new(Self::ANNUAL, stamps)
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// One climate variable on a `(time, lat, lon)` grid.
#[derive(Clone, Debug, PartialEq)]
pub struct ClimateGrid {
    pub name: String,
    /// Declared units, if the source carried any
    pub units: Option<String>,
    pub long_name: Option<String>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub time: TimeAxis,
    pub calendar: Calendar,
    pub values: Array3<f64>,
}

impl ClimateGrid {
    pub fn new(
        name: impl Into<String>,
        lat: Array1<f64>,
        lon: Array1<f64>,
        time: TimeAxis,
        calendar: Calendar,
        values: Array3<f64>,
    ) -> RSWBResult<Self> {
        let name = name.into();
        let expected = (time.len(), lat.len(), lon.len());
        if values.dim() != expected {
            return Err(RSWBError::MalformedGrid {
                name,
                details: format!(
                    "values have shape {:?} but coordinates imply {:?}",
                    values.dim(),
                    expected
                ),
            });
        }
        Ok(Self {
            name,
            units: None,
            long_name: None,
            lat,
            lon,
            time,
            calendar,
            values,
        })
    }

    /// A grid holding the same value in every cell.
    pub fn filled(
        name: impl Into<String>,
        lat: Array1<f64>,
        lon: Array1<f64>,
        time: TimeAxis,
        calendar: Calendar,
        value: f64,
    ) -> Self {
        let values = Array3::from_elem((time.len(), lat.len(), lon.len()), value);
        Self {
            name: name.into(),
            units: None,
            long_name: None,
            lat,
            lon,
            time,
            calendar,
            values,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = Some(long_name.into());
        self
    }

    /// A new variable on the same coordinates, without units or long name.
    pub fn derive(&self, name: impl Into<String>, values: Array3<f64>) -> RSWBResult<Self> {
        ClimateGrid::new(
            name,
            self.lat.clone(),
            self.lon.clone(),
            self.time.clone(),
            self.calendar,
            values,
        )
    }

    pub fn n_time(&self) -> usize {
        self.time.len()
    }

    /// Check that `other` is on the same latitude, longitude and time coordinates.
    pub fn check_compatible(&self, other: &ClimateGrid) -> RSWBResult<()> {
        let mismatch = |axis: &str| RSWBError::GridMismatch {
            left: self.name.clone(),
            right: other.name.clone(),
            axis: axis.to_string(),
        };
        if !coords_match(&self.lat, &other.lat) {
            return Err(mismatch("latitude"));
        }
        if !coords_match(&self.lon, &other.lon) {
            return Err(mismatch("longitude"));
        }
        if self.time.stamps != other.time.stamps {
            return Err(mismatch("time"));
        }
        Ok(())
    }

    /// Minimum and maximum over finite values.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Fraction of cells that are not finite.
    pub fn nan_fraction(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let missing = self.values.iter().filter(|v| !v.is_finite()).count();
        missing as f64 / self.values.len() as f64
    }

    pub fn select_time(&self, indices: &[usize]) -> Self {
        Self {
            time: TimeAxis::new(
                self.time.dim.clone(),
                indices.iter().map(|&i| self.time.stamps[i]).collect(),
            ),
            values: self.values.select(Axis(0), indices),
            name: self.name.clone(),
            units: self.units.clone(),
            long_name: self.long_name.clone(),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            calendar: self.calendar,
        }
    }

    /// Time steps whose year falls inside `window`, or `None` when there are none.
    pub fn slice_years(&self, window: &TimeWindow) -> Option<Self> {
        let indices: Vec<usize> = self
            .time
            .stamps
            .iter()
            .enumerate()
            .filter(|(_, stamp)| window.contains(stamp.year))
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            None
        } else {
            Some(self.select_time(&indices))
        }
    }

    /// Restrict to a rectangular block of rows and columns.
    pub fn crop(&self, rows: Range<usize>, cols: Range<usize>) -> Self {
        Self {
            lat: self.lat.slice(s![rows.clone()]).to_owned(),
            lon: self.lon.slice(s![cols.clone()]).to_owned(),
            time: self.time.clone(),
            values: self.values.slice(s![.., rows, cols]).to_owned(),
            name: self.name.clone(),
            units: self.units.clone(),
            long_name: self.long_name.clone(),
            calendar: self.calendar,
        }
    }

    /// Per-cell sums over each month or year.
    ///
    /// Missing days are skipped; a cell with no finite value in a period stays `NaN`.
    /// Periods are stamped with their first day.
    pub fn resample_sum(&self, freq: Resample, name: impl Into<String>) -> Self {
        let mut groups: IndexMap<DayStamp, Vec<usize>> = IndexMap::new();
        for (i, stamp) in self.time.stamps.iter().enumerate() {
            let key = match freq {
                Resample::Monthly => stamp.month_start(),
                Resample::Annual => stamp.year_start(),
            };
            groups.entry(key).or_default().push(i);
        }

        let (n_lat, n_lon) = (self.lat.len(), self.lon.len());
        let mut values = Array3::from_elem((groups.len(), n_lat, n_lon), f64::NAN);
        for (g, indices) in groups.values().enumerate() {
            let block = self.values.select(Axis(0), indices);
            let summed = block.map_axis(Axis(0), |cell| nan_sum(cell.iter().copied()));
            values.index_axis_mut(Axis(0), g).assign(&summed);
        }

        let stamps: Vec<DayStamp> = groups.keys().copied().collect();
        let time = match freq {
            Resample::Monthly => TimeAxis::monthly(stamps),
            Resample::Annual => TimeAxis::annual(stamps),
        };
        Self {
            name: name.into(),
            units: self.units.clone(),
            long_name: None,
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            time,
            calendar: self.calendar,
            values,
        }
    }
}

fn coords_match(a: &Array1<f64>, b: &Array1<f64>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= COORD_TOLERANCE)
}

/// The variables of one grid file, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridDataset {
    grids: IndexMap<String, ClimateGrid>,
    /// Global attributes written alongside the variables
    pub attributes: IndexMap<String, String>,
}

impl GridDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_grids(grids: impl IntoIterator<Item = ClimateGrid>) -> Self {
        let mut dataset = Self::new();
        for grid in grids {
            dataset.insert(grid);
        }
        dataset
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a grid, returning any previous grid of the same name.
    pub fn insert(&mut self, grid: ClimateGrid) -> Option<ClimateGrid> {
        self.grids.insert(grid.name.clone(), grid)
    }

    pub fn get(&self, name: &str) -> Option<&ClimateGrid> {
        self.grids.get(name)
    }

    /// The first grid whose name is one of `names`, trying them in order.
    pub fn find_any(&self, names: &[&str]) -> Option<&ClimateGrid> {
        names.iter().find_map(|name| self.grids.get(*name))
    }

    pub fn first(&self) -> Option<&ClimateGrid> {
        self.grids.values().next()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.grids.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClimateGrid> {
        self.grids.values()
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}
