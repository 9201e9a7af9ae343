//! Synthetic grids shared by the component tests.

use ndarray::{Array1, Array3};
use rswb_core::calendar::{Calendar, DayStamp};
use rswb_core::grid::{ClimateGrid, TimeAxis};

pub fn lat() -> Array1<f64> {
    Array1::from(vec![-2.0, -1.0, 0.0])
}

pub fn lon() -> Array1<f64> {
    Array1::from(vec![-79.0, -78.0, -77.0])
}

pub fn daily_axis(start_year: i32, n_years: i32) -> TimeAxis {
    let n_days: u32 = (start_year..start_year + n_years)
        .map(|y| Calendar::Standard.days_in_year(y))
        .sum();
    TimeAxis::daily(
        Calendar::Standard
            .daily_range(DayStamp::new(start_year, 1, 1), n_days as usize)
            .unwrap(),
    )
}

/// A uniform 3x3 grid covering whole calendar years.
pub fn uniform(name: &str, value: f64, start_year: i32, n_years: i32) -> ClimateGrid {
    ClimateGrid::filled(
        name,
        lat(),
        lon(),
        daily_axis(start_year, n_years),
        Calendar::Standard,
        value,
    )
}

/// A 3x3 grid whose values come from `f(stamp)`, identical in every cell.
pub fn from_fn(
    name: &str,
    start_year: i32,
    n_years: i32,
    f: impl Fn(DayStamp) -> f64,
) -> ClimateGrid {
    let time = daily_axis(start_year, n_years);
    let values = Array3::from_shape_fn((time.len(), 3, 3), |(t, _, _)| f(time.stamps[t]));
    ClimateGrid::new(name, lat(), lon(), time, Calendar::Standard, values).unwrap()
}
