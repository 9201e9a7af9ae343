//! Area-weighted climate indices and scenario deltas.
//!
//! All indices are computed on regional daily series, i.e. after the area-weighted spatial
//! mean, and then aggregated to calendar years. Missing values are carried as `NaN` and
//! excluded from every mean.
//!
//! ```rust
//! use rswb_components::indices::longest_run;
//!
//! let dry = [true, true, false, true, true, true, false];
//! assert_eq!(longest_run(&dry), 3);
//! ```

use crate::water_balance::{PET_DAILY, P_DAILY, WB_DAILY};
use rswb_core::domain::TimeWindow;
use rswb_core::errors::{RSWBError, RSWBResult};
use rswb_core::grid::GridDataset;
use rswb_core::series::{nan_mean, DailySeries};
use rswb_core::spatial::area_weighted_mean;
use serde::Serialize;

/// English month abbreviations, January first
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Regional daily precipitation, PET and water balance (mm/day).
#[derive(Clone, Debug, PartialEq)]
pub struct WaterBalanceSeries {
    pub p: DailySeries,
    pub pet: DailySeries,
    pub wb: DailySeries,
}

impl WaterBalanceSeries {
    /// Area-weighted means of a daily water-balance dataset.
    pub fn from_dataset(dataset: &GridDataset) -> RSWBResult<Self> {
        let series = |name: &str| {
            dataset
                .get(name)
                .map(area_weighted_mean)
                .ok_or_else(|| RSWBError::Error(format!("water balance dataset lacks '{name}'")))
        };
        Ok(Self {
            p: series(P_DAILY)?,
            pet: series(PET_DAILY)?,
            wb: series(WB_DAILY)?,
        })
    }

    /// Days inside `window`, or `None` when the window has no data.
    pub fn slice_years(&self, window: &TimeWindow) -> Option<Self> {
        Some(Self {
            p: self.p.slice_years(window)?,
            pet: self.pet.slice_years(window)?,
            wb: self.wb.slice_years(window)?,
        })
    }
}

/// Mean and population standard deviation of calendar-year totals.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct AnnualStats {
    /// unit: mm/year
    pub mean: f64,
    /// unit: mm/year
    pub std: f64,
}

pub fn annual_stats(series: &DailySeries) -> AnnualStats {
    let annual = series.annual_sums();
    AnnualStats {
        mean: annual.mean().unwrap_or(f64::NAN),
        std: annual.std().unwrap_or(f64::NAN),
    }
}

/// Mean over years of `P_year / PET_year`. Years with a non-finite ratio (e.g. zero PET) are
/// left out; `NaN` when no year remains.
pub fn aridity_index(p: &DailySeries, pet: &DailySeries) -> f64 {
    let pet_annual = pet.annual_sums();
    let p_annual = p.annual_sums();
    let ratios = p_annual.iter().filter_map(|(year, p_year)| {
        let ratio = p_year / pet_annual.get(year)?;
        ratio.is_finite().then_some(ratio)
    });
    nan_mean(ratios)
}

/// Lengths of the runs of consecutive `true` values.
pub fn run_lengths(flags: &[bool]) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut current = 0;
    for &flag in flags {
        if flag {
            current += 1;
        } else if current > 0 {
            runs.push(current);
            current = 0;
        }
    }
    if current > 0 {
        runs.push(current);
    }
    runs
}

pub fn longest_run(flags: &[bool]) -> usize {
    run_lengths(flags).into_iter().max().unwrap_or(0)
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct DryDayMetrics {
    /// Mean number of days per year below the threshold
    pub dry_days: f64,
    /// Mean over years of the longest dry spell (consecutive dry days)
    pub cdd: f64,
}

/// Dry-day count and CDD of a daily precipitation series.
///
/// A day is dry when its precipitation is below `threshold_mm`; a missing day breaks a spell.
pub fn dry_day_metrics(p: &DailySeries, threshold_mm: f64) -> DryDayMetrics {
    let (dry_days, cdd): (Vec<f64>, Vec<f64>) = p
        .by_year()
        .into_values()
        .map(|values| {
            let dry: Vec<bool> = values.iter().map(|&v| v < threshold_mm).collect();
            let count = dry.iter().filter(|&&d| d).count();
            (count as f64, longest_run(&dry) as f64)
        })
        .unzip();
    DryDayMetrics {
        dry_days: nan_mean(dry_days),
        cdd: nan_mean(cdd),
    }
}

/// Mean annual temperature from a regional daily series in °C.
pub fn mean_annual_temperature(tas: &DailySeries) -> Option<f64> {
    tas.annual_means().mean()
}

/// Wettest and driest three-month windows of the baseline climatology.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeasonalQuarters {
    /// Months (1-12) of the wettest quarter
    pub wet: [u32; 3],
    /// Months (1-12) of the driest quarter
    pub dry: [u32; 3],
}

fn quarter_starting(start: usize) -> [u32; 3] {
    [0, 1, 2].map(|k| ((start + k) % 12) as u32 + 1)
}

impl SeasonalQuarters {
    /// Select the quarters from baseline daily precipitation.
    ///
    /// The twelve circular three-month sums of the monthly climatology are compared; the first
    /// maximum is the wet quarter and the first minimum the dry one. `None` when any calendar
    /// month has no data.
    pub fn from_baseline(p: &DailySeries) -> Option<Self> {
        let climatology = p.monthly_sums().climatology();
        if climatology.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let sums: Vec<f64> = (0..12)
            .map(|k| (0..3).map(|j| climatology[(k + j) % 12]).sum::<f64>())
            .collect();

        let mut wet = 0;
        let mut dry = 0;
        for (k, &sum) in sums.iter().enumerate() {
            if sum > sums[wet] {
                wet = k;
            }
            if sum < sums[dry] {
                dry = k;
            }
        }
        Some(Self {
            wet: quarter_starting(wet),
            dry: quarter_starting(dry),
        })
    }

    /// Label such as `Mar-Apr-May`.
    pub fn label(months: &[u32; 3]) -> String {
        months
            .iter()
            .map(|&m| MONTH_ABBREVIATIONS[((m + 11) % 12) as usize])
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn wet_label(&self) -> String {
        Self::label(&self.wet)
    }

    pub fn dry_label(&self) -> String {
        Self::label(&self.dry)
    }
}

/// Climatological totals over the wet and dry quarters (mm).
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct QuarterSums {
    pub wet: f64,
    pub dry: f64,
}

/// Sum the monthly climatology of `series` over each quarter.
pub fn quarter_sums(series: &DailySeries, quarters: &SeasonalQuarters) -> QuarterSums {
    let climatology = series.monthly_sums().climatology();
    let total = |months: &[u32; 3]| {
        months
            .iter()
            .map(|&m| climatology[((m + 11) % 12) as usize])
            .sum::<f64>()
    };
    QuarterSums {
        wet: total(&quarters.wet),
        dry: total(&quarters.dry),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct SeasonalSums {
    pub p: QuarterSums,
    pub pet: QuarterSums,
    pub wb: QuarterSums,
}

/// Every index for one (region, domain, window).
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct WindowMetrics {
    pub p: AnnualStats,
    pub pet: AnnualStats,
    pub wb: AnnualStats,
    pub ai: f64,
    pub dry: DryDayMetrics,
    /// Mean annual temperature (°C), when a temperature grid is available
    pub temperature: Option<f64>,
    pub seasonal: Option<SeasonalSums>,
}

impl WindowMetrics {
    /// Compute from series already restricted to the window.
    pub fn compute(
        series: &WaterBalanceSeries,
        temperature: Option<&DailySeries>,
        quarters: Option<&SeasonalQuarters>,
        dry_threshold_mm: f64,
    ) -> Self {
        Self {
            p: annual_stats(&series.p),
            pet: annual_stats(&series.pet),
            wb: annual_stats(&series.wb),
            ai: aridity_index(&series.p, &series.pet),
            dry: dry_day_metrics(&series.p, dry_threshold_mm),
            temperature: temperature.and_then(mean_annual_temperature),
            seasonal: quarters.map(|q| SeasonalSums {
                p: quarter_sums(&series.p, q),
                pet: quarter_sums(&series.pet, q),
                wb: quarter_sums(&series.wb, q),
            }),
        }
    }
}

/// Absolute and relative change of one metric.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MetricDelta {
    /// `future - baseline`
    pub absolute: f64,
    /// Percentage of the baseline; non-finite when the baseline is zero
    pub percent: f64,
}

impl MetricDelta {
    pub fn between(baseline: f64, future: f64) -> Self {
        let absolute = future - baseline;
        let percent = if baseline == 0.0 {
            f64::NAN
        } else {
            absolute / baseline * 100.0
        };
        Self { absolute, percent }
    }
}

/// Quarter changes against the baseline quarters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct SeasonalDelta {
    pub p: QuarterSums,
    pub pet: QuarterSums,
    pub wb: QuarterSums,
}

fn quarter_delta(baseline: &QuarterSums, future: &QuarterSums) -> QuarterSums {
    QuarterSums {
        wet: future.wet - baseline.wet,
        dry: future.dry - baseline.dry,
    }
}

/// Change of every index between the baseline window and a future window.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioDelta {
    pub p: MetricDelta,
    pub pet: MetricDelta,
    pub wb: MetricDelta,
    pub ai: f64,
    pub dry_days: f64,
    pub cdd: f64,
    /// `None` unless both windows have a temperature
    pub temperature: Option<f64>,
    pub seasonal: Option<SeasonalDelta>,
}

impl ScenarioDelta {
    pub fn between(baseline: &WindowMetrics, future: &WindowMetrics) -> Self {
        let temperature = match (baseline.temperature, future.temperature) {
            (Some(b), Some(f)) => Some(f - b),
            _ => None,
        };
        let seasonal = match (&baseline.seasonal, &future.seasonal) {
            (Some(b), Some(f)) => Some(SeasonalDelta {
                p: quarter_delta(&b.p, &f.p),
                pet: quarter_delta(&b.pet, &f.pet),
                wb: quarter_delta(&b.wb, &f.wb),
            }),
            _ => None,
        };
        Self {
            p: MetricDelta::between(baseline.p.mean, future.p.mean),
            pet: MetricDelta::between(baseline.pet.mean, future.pet.mean),
            wb: MetricDelta::between(baseline.wb.mean, future.wb.mean),
            ai: future.ai - baseline.ai,
            dry_days: future.dry.dry_days - baseline.dry.dry_days,
            cdd: future.dry.cdd - baseline.dry.cdd,
            temperature,
            seasonal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use is_close::is_close;
    use rswb_core::calendar::{Calendar, DayStamp};

    fn series(start_year: i32, n_years: i32, f: impl Fn(DayStamp) -> f64) -> DailySeries {
        let n_days: u32 = (start_year..start_year + n_years)
            .map(|y| Calendar::Standard.days_in_year(y))
            .sum();
        let stamps = Calendar::Standard
            .daily_range(DayStamp::new(start_year, 1, 1), n_days as usize)
            .unwrap();
        let values = stamps.iter().map(|&s| f(s)).collect();
        DailySeries::new(stamps, values).unwrap()
    }

    #[test]
    fn test_run_lengths() {
        assert_eq!(run_lengths(&[]), Vec::<usize>::new());
        assert_eq!(run_lengths(&[true, false, true, true]), vec![1, 2]);
        assert_eq!(longest_run(&[false, false]), 0);
        assert_eq!(longest_run(&[true; 10]), 10);
    }

    #[test]
    fn test_annual_stats() {
        let s = series(2001, 2, |d| if d.year == 2001 { 1.0 } else { 3.0 });
        let stats = annual_stats(&s);
        assert_abs_diff_eq!(stats.mean, 730.0, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.std, 365.0, epsilon = 1e-9);
    }

    #[test]
    fn test_aridity_excludes_zero_pet_years() {
        let p = series(2001, 3, |_| 2.0);
        let pet = series(2001, 3, |d| match d.year {
            2001 => 4.0,
            2002 => 0.0,
            _ => 1.0,
        });
        // (0.5 + 2.0) / 2, with 2002 left out
        assert!(is_close!(aridity_index(&p, &pet), 1.25));

        let no_pet = series(2001, 1, |_| 0.0);
        assert!(aridity_index(&p, &no_pet).is_nan());
    }

    #[test]
    fn test_dry_days_and_cdd() {
        let wet = series(2001, 2, |_| 5.0);
        let metrics = dry_day_metrics(&wet, 1.0);
        assert_eq!(metrics.cdd, 0.0);
        assert_eq!(metrics.dry_days, 0.0);

        let dry = series(2003, 2, |_| 0.2);
        let metrics = dry_day_metrics(&dry, 1.0);
        assert_abs_diff_eq!(metrics.cdd, (365.0 + 366.0) / 2.0);

        // A 10-day spell in January and a 20-day spell in July each year
        let spells = series(2001, 2, |d| match (d.month, d.day) {
            (1, 1..=10) | (7, 1..=20) => 0.0,
            _ => 1.0,
        });
        let metrics = dry_day_metrics(&spells, 1.0);
        assert_eq!(metrics.cdd, 20.0);
        assert_eq!(metrics.dry_days, 30.0);
    }

    #[test]
    fn test_seasonal_quarters() {
        // Rain peaks in Dec-Jan-Feb and is lowest in Jun-Jul-Aug
        let monthly = [9.0, 8.0, 5.0, 4.0, 3.0, 1.0, 1.0, 1.0, 3.0, 4.0, 5.0, 9.0];
        let p = series(1981, 3, |d| monthly[(d.month - 1) as usize]);
        let quarters = SeasonalQuarters::from_baseline(&p).unwrap();
        assert_eq!(quarters.wet, [12, 1, 2]);
        assert_eq!(quarters.dry, [6, 7, 8]);
        assert_eq!(quarters.wet_label(), "Dec-Jan-Feb");
        assert_eq!(quarters.dry_label(), "Jun-Jul-Aug");

        let sums = quarter_sums(&p, &quarters);
        assert_abs_diff_eq!(sums.dry, 30.0 + 31.0 + 31.0, epsilon = 1e-9);

        let mut partial = series(1981, 1, |_| 1.0);
        partial.values.truncate(100);
        partial.stamps.truncate(100);
        assert!(SeasonalQuarters::from_baseline(&partial).is_none());
    }

    #[test]
    fn test_metric_delta() {
        let d = MetricDelta::between(1000.0, 900.0);
        assert_eq!(d.absolute, -100.0);
        assert!(is_close!(d.percent, -10.0));

        let zero = MetricDelta::between(0.0, 12.0);
        assert_eq!(zero.absolute, 12.0);
        assert!(!zero.percent.is_finite());

        assert!(MetricDelta::between(f64::NAN, 1.0).absolute.is_nan());
    }

    #[test]
    fn test_scenario_delta() {
        let base_series = WaterBalanceSeries {
            p: series(1981, 2, |_| 5.0),
            pet: series(1981, 2, |_| 4.0),
            wb: series(1981, 2, |_| 1.0),
        };
        let future_series = WaterBalanceSeries {
            p: series(2073, 2, |_| 4.0),
            pet: series(2073, 2, |_| 5.0),
            wb: series(2073, 2, |_| -1.0),
        };
        let tas = series(2073, 2, |_| 21.5);
        let base = WindowMetrics::compute(&base_series, None, None, 1.0);
        let future = WindowMetrics::compute(&future_series, Some(&tas), None, 1.0);
        let delta = ScenarioDelta::between(&base, &future);

        assert_eq!(delta.p.absolute, future.p.mean - base.p.mean);
        assert!(is_close!(delta.p.percent, -20.0));
        assert!(is_close!(delta.ai, 0.8 - 1.25));
        assert_eq!(delta.temperature, None);
        assert_eq!(delta.seasonal, None);
        assert_eq!(future.temperature, Some(21.5));
    }
}
