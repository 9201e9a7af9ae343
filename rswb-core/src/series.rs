//! Regional (spatially aggregated) daily series and their calendar resampling.

use crate::calendar::DayStamp;
use crate::domain::TimeWindow;
use crate::errors::{RSWBError, RSWBResult};
use indexmap::IndexMap;
use serde::Serialize;

/// Sum of the finite values, or `NaN` when there are none.
///
/// An all-missing period stays missing rather than summing to zero, so cells masked out by a
/// region polygon never enter regional means as 0 mm.
pub fn nan_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.unwrap_or(0.0) + v))
        .unwrap_or(f64::NAN)
}

/// Mean of the finite values, or `NaN` when there are none.
pub fn nan_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// One value per day for a whole region.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailySeries {
    pub stamps: Vec<DayStamp>,
    pub values: Vec<f64>,
}

impl DailySeries {
    pub fn new(stamps: Vec<DayStamp>, values: Vec<f64>) -> RSWBResult<Self> {
        if stamps.len() != values.len() {
            return Err(RSWBError::Error(format!(
                "series has {} stamps but {} values",
                stamps.len(),
                values.len()
            )));
        }
        Ok(Self { stamps, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Days whose year falls inside `window`, or `None` when there are none.
    pub fn slice_years(&self, window: &TimeWindow) -> Option<Self> {
        let (stamps, values): (Vec<_>, Vec<_>) = self
            .stamps
            .iter()
            .zip(&self.values)
            .filter(|(stamp, _)| window.contains(stamp.year))
            .map(|(s, v)| (*s, *v))
            .unzip();
        if stamps.is_empty() {
            None
        } else {
            Some(Self { stamps, values })
        }
    }

    /// Values grouped by calendar year, in time order.
    pub fn by_year(&self) -> IndexMap<i32, Vec<f64>> {
        let mut groups: IndexMap<i32, Vec<f64>> = IndexMap::new();
        for (stamp, value) in self.stamps.iter().zip(&self.values) {
            groups.entry(stamp.year).or_default().push(*value);
        }
        groups
    }

    /// Calendar-year totals (mm/day to mm/year for flux series).
    pub fn annual_sums(&self) -> YearlyValues {
        self.by_year()
            .into_iter()
            .map(|(year, values)| (year, nan_sum(values)))
            .collect()
    }

    pub fn annual_means(&self) -> YearlyValues {
        self.by_year()
            .into_iter()
            .map(|(year, values)| (year, nan_mean(values)))
            .collect()
    }

    /// Calendar-month totals.
    pub fn monthly_sums(&self) -> MonthlyValues {
        let mut groups: IndexMap<(i32, u32), Vec<f64>> = IndexMap::new();
        for (stamp, value) in self.stamps.iter().zip(&self.values) {
            groups
                .entry((stamp.year, stamp.month))
                .or_default()
                .push(*value);
        }
        let (months, values) = groups
            .into_iter()
            .map(|(key, values)| (key, nan_sum(values)))
            .unzip();
        MonthlyValues { months, values }
    }
}

/// One value per calendar year.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct YearlyValues {
    pub years: Vec<i32>,
    pub values: Vec<f64>,
}

impl FromIterator<(i32, f64)> for YearlyValues {
    fn from_iter<I: IntoIterator<Item = (i32, f64)>>(iter: I) -> Self {
        let (years, values) = iter.into_iter().unzip();
        Self { years, values }
    }
}

impl YearlyValues {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, year: i32) -> Option<f64> {
        self.years
            .iter()
            .position(|&y| y == year)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.years.iter().copied().zip(self.values.iter().copied())
    }

    pub fn finite(&self) -> Vec<f64> {
        self.values.iter().copied().filter(|v| v.is_finite()).collect()
    }

    /// Mean over finite years; `None` when no year is finite.
    pub fn mean(&self) -> Option<f64> {
        let finite = self.finite();
        if finite.is_empty() {
            None
        } else {
            Some(finite.iter().sum::<f64>() / finite.len() as f64)
        }
    }

    /// Population standard deviation over finite years.
    pub fn std(&self) -> Option<f64> {
        let finite = self.finite();
        let mean = self.mean()?;
        let variance =
            finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / finite.len() as f64;
        Some(variance.sqrt())
    }
}

/// One value per (year, month).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MonthlyValues {
    pub months: Vec<(i32, u32)>,
    pub values: Vec<f64>,
}

impl MonthlyValues {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of each calendar month across years; index 0 is January.
    pub fn climatology(&self) -> [f64; 12] {
        let mut by_month: [Vec<f64>; 12] = Default::default();
        for ((_, month), value) in self.months.iter().zip(&self.values) {
            if (1..=12).contains(month) {
                by_month[(*month - 1) as usize].push(*value);
            }
        }
        by_month.map(nan_mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Calendar;
    use approx::assert_abs_diff_eq;
    use is_close::is_close;

    fn series(start: DayStamp, values: Vec<f64>) -> DailySeries {
        let stamps = Calendar::NoLeap.daily_range(start, values.len()).unwrap();
        DailySeries::new(stamps, values).unwrap()
    }

    #[test]
    fn test_nan_helpers() {
        assert!(nan_sum([f64::NAN, f64::NAN]).is_nan());
        assert_eq!(nan_sum([1.0, f64::NAN, 2.0]), 3.0);
        assert_eq!(nan_mean([1.0, f64::NAN, 3.0]), 2.0);
        assert!(nan_mean(Vec::<f64>::new()).is_nan());
    }

    #[test]
    fn test_annual_sums_and_stats() {
        let mut values = vec![1.0; 365];
        values.extend(vec![3.0; 365]);
        let s = series(DayStamp::new(1990, 1, 1), values);

        let annual = s.annual_sums();
        assert_eq!(annual.years, vec![1990, 1991]);
        assert_abs_diff_eq!(annual.values[0], 365.0);
        assert_abs_diff_eq!(annual.values[1], 1095.0);
        assert!(is_close!(annual.mean().unwrap(), 730.0));
        // Population standard deviation
        assert!(is_close!(annual.std().unwrap(), 365.0));
    }

    #[test]
    fn test_stats_ignore_non_finite_years() {
        let yearly: YearlyValues = vec![(2000, 2.0), (2001, f64::INFINITY), (2002, 4.0)]
            .into_iter()
            .collect();
        assert_eq!(yearly.mean(), Some(3.0));
        assert_eq!(yearly.get(2001), Some(f64::INFINITY));
        assert!(YearlyValues::default().mean().is_none());
        assert!(YearlyValues::default().std().is_none());
    }

    #[test]
    fn test_monthly_climatology() {
        let s = series(DayStamp::new(2000, 1, 1), vec![1.0; 730]);
        let monthly = s.monthly_sums();
        assert_eq!(monthly.len(), 24);
        let clim = monthly.climatology();
        assert_abs_diff_eq!(clim[0], 31.0);
        assert_abs_diff_eq!(clim[1], 28.0);
        assert_abs_diff_eq!(clim[10], 30.0);
    }

    #[test]
    fn test_slice_years() {
        let s = series(DayStamp::new(2000, 1, 1), vec![1.0; 730]);
        let w = TimeWindow::new(2001, 2005).unwrap();
        assert_eq!(s.slice_years(&w).unwrap().len(), 365);
        assert!(s.slice_years(&TimeWindow::new(2010, 2011).unwrap()).is_none());
    }
}
