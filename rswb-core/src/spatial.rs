//! Area weighting on regular latitude/longitude grids.
//!
//! Grid cells shrink towards the poles, so regional means weight each latitude row by
//! `cos(latitude)`. Within each longitude column the weighted mean runs over finite cells only,
//! then columns with data are averaged uniformly. On a complete grid this is exactly
//! "weight rows by cos(lat), sum over latitude, divide by the weight sum, average over
//! longitude"; on a clipped grid the cells outside the region do not drag the mean to zero.

use crate::grid::ClimateGrid;
use crate::series::DailySeries;
use ndarray::{Array1, ArrayView2, Axis};

/// `cos(lat)` for each latitude in degrees.
pub fn latitude_weights(lat: &Array1<f64>) -> Array1<f64> {
    lat.mapv(|phi| phi.to_radians().cos())
}

/// Area-weighted mean of one `(lat, lon)` field; `NaN` if no cell is finite.
pub fn weighted_field_mean(field: ArrayView2<f64>, weights: &Array1<f64>) -> f64 {
    let mut column_total = 0.0;
    let mut columns = 0usize;
    for column in field.axis_iter(Axis(1)) {
        let (num, den) = column
            .iter()
            .zip(weights.iter())
            .filter(|(v, _)| v.is_finite())
            .fold((0.0, 0.0), |(n, d), (v, w)| (n + v * w, d + w));
        if den > 0.0 {
            column_total += num / den;
            columns += 1;
        }
    }
    if columns == 0 {
        f64::NAN
    } else {
        column_total / columns as f64
    }
}

/// Area-weighted regional mean for every time step of `grid`.
pub fn area_weighted_mean(grid: &ClimateGrid) -> DailySeries {
    let weights = latitude_weights(&grid.lat);
    let values = grid
        .values
        .axis_iter(Axis(0))
        .map(|field| weighted_field_mean(field, &weights))
        .collect();
    DailySeries {
        stamps: grid.time.stamps.clone(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Calendar, DayStamp};
    use crate::grid::TimeAxis;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    fn grid_with(lat: Array1<f64>, lon: Array1<f64>, value: f64) -> ClimateGrid {
        let stamps = Calendar::Standard
            .daily_range(DayStamp::new(2000, 1, 1), 4)
            .unwrap();
        ClimateGrid::filled("x", lat, lon, TimeAxis::daily(stamps), Calendar::Standard, value)
    }

    #[test]
    fn test_uniform_field_mean_is_the_value() {
        for (lat, lon) in [
            (array![-5.0, -4.0, -3.0], array![-80.0, -79.0, -78.0]),
            (array![10.0, 40.0, 70.0, 85.0], array![0.0, 90.0]),
            (array![-60.0], array![100.0, 101.0, 102.0, 103.0, 104.0]),
        ] {
            let series = area_weighted_mean(&grid_with(lat, lon, 4.25));
            assert_eq!(series.len(), 4);
            for v in series.values {
                assert_relative_eq!(v, 4.25, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rows_weighted_by_cosine() {
        let mut g = grid_with(array![0.0, 60.0], array![0.0], 0.0);
        g.values.index_axis_mut(Axis(1), 0).fill(1.0);
        g.values.index_axis_mut(Axis(1), 1).fill(4.0);
        // weights 1.0 and 0.5
        let expected = (1.0 * 1.0 + 4.0 * 0.5) / 1.5;
        let series = area_weighted_mean(&g);
        assert_relative_eq!(series.values[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_cells_do_not_bias() {
        let mut g = grid_with(array![-1.0, 0.0, 1.0], array![-79.0, -78.0], 3.0);
        g.values[[0, 0, 0]] = f64::NAN;
        g.values.index_axis_mut(Axis(2), 1).fill(f64::NAN);
        let series = area_weighted_mean(&g);
        assert_relative_eq!(series.values[0], 3.0, epsilon = 1e-12);

        g.values.fill(f64::NAN);
        assert!(area_weighted_mean(&g).values[0].is_nan());
    }
}
