//! Key numbers per region: the structured JSON summary and its narrative text.
//!
//! Both files land in `<output>/24_Resumen_Ejecutivo/`. The JSON layout is consumed by the
//! dashboard and report collaborators, so key names and rounding are fixed: mm values are
//! integers, percentages and temperatures have one decimal, the aridity index two. Non-finite
//! values are written as `null`.

use crate::indices::{
    AnnualStats, QuarterSums, ScenarioDelta, SeasonalQuarters, WaterBalanceSeries, WindowMetrics,
};
use crate::resolver::{domain_file, read_variable};
use indexmap::IndexMap;
use rswb_core::config::PipelineConfig;
use rswb_core::domain::{Domain, TimeWindow};
use rswb_core::errors::{RSWBError, RSWBResult};
use rswb_core::io::GridStore;
use rswb_core::region::Region;
use rswb_core::series::DailySeries;
use rswb_core::spatial::area_weighted_mean;
use rswb_core::units::normalize_temperature;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const KEY_NUMBERS_JSON: &str = "key_numbers.json";
pub const KEY_NUMBERS_TEXT: &str = "key_numbers.txt";

/// Unrounded indices of one region, baseline and every scenario window.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionIndices {
    pub region: String,
    pub base_period: TimeWindow,
    pub dry_threshold_mm: f64,
    pub baseline: WindowMetrics,
    pub quarters: Option<SeasonalQuarters>,
    /// Per scenario, every configured window; `None` when the window has no data
    pub projections: IndexMap<Domain, Vec<(TimeWindow, Option<ScenarioDelta>)>>,
}

fn load_water_balance(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
) -> RSWBResult<Option<WaterBalanceSeries>> {
    let path = domain_file(&region.output_domain_dir(domain_dir), "wb", domain_dir);
    if !store.exists(&path) {
        return Ok(None);
    }
    WaterBalanceSeries::from_dataset(&store.read(&path)?).map(Some)
}

/// Regional mean temperature in °C, if the domain has a readable `tas` grid.
pub fn load_temperature(
    store: &dyn GridStore,
    region: &Region,
    domain_dir: &str,
) -> Option<DailySeries> {
    let in_dir = region.input_domain_dir(domain_dir);
    let path = [domain_file(&in_dir, "tas", domain_dir), in_dir.join("tas.nc")]
        .into_iter()
        .find(|p| store.exists(p))?;
    let loaded = read_variable(store, &path, &["tas", "tmean"])
        .and_then(|grid| normalize_temperature(&grid))
        .map(|(grid, _)| area_weighted_mean(&grid));
    match loaded {
        Ok(series) => Some(series),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unusable temperature grid");
            None
        }
    }
}

/// Compute the baseline and every scenario delta for a region.
///
/// Returns `Ok(None)` when the baseline water balance is missing or has no data in the base
/// period. A scenario that cannot be read is reported as having no data.
pub fn compute_region_indices(
    store: &dyn GridStore,
    region: &Region,
    config: &PipelineConfig,
) -> RSWBResult<Option<RegionIndices>> {
    let threshold = config.dry_threshold_mm;
    let historical = config.domain_dir(Domain::Historical);
    let Some(series) = load_water_balance(store, region, &historical)? else {
        warn!(region = %region.code, "No historical water balance, skipping indices");
        return Ok(None);
    };
    let Some(base_series) = series.slice_years(&config.base_period) else {
        warn!(
            region = %region.code,
            base_period = %config.base_period,
            "No historical data in the base period"
        );
        return Ok(None);
    };

    let base_tas = load_temperature(store, region, &historical)
        .and_then(|tas| tas.slice_years(&config.base_period));
    let quarters = SeasonalQuarters::from_baseline(&base_series.p);
    if quarters.is_none() {
        warn!(region = %region.code, "Baseline too short to define seasonal quarters");
    }
    let baseline = WindowMetrics::compute(
        &base_series,
        base_tas.as_ref(),
        quarters.as_ref(),
        threshold,
    );

    let mut projections = IndexMap::new();
    for scenario in Domain::SCENARIOS {
        let domain_dir = config.domain_dir(scenario);
        let series = match load_water_balance(store, region, &domain_dir) {
            Ok(series) => series,
            Err(e) => {
                warn!(region = %region.code, domain = %scenario, error = %e, "Unreadable water balance");
                None
            }
        };
        let tas = load_temperature(store, region, &domain_dir);

        let windows = config
            .windows
            .iter()
            .map(|window| {
                let delta = series.as_ref().and_then(|s| s.slice_years(window)).map(|s| {
                    let window_tas = tas.as_ref().and_then(|t| t.slice_years(window));
                    let metrics =
                        WindowMetrics::compute(&s, window_tas.as_ref(), quarters.as_ref(), threshold);
                    ScenarioDelta::between(&baseline, &metrics)
                });
                if delta.is_none() {
                    debug!(region = %region.code, domain = %scenario, window = %window, "No data");
                }
                (*window, delta)
            })
            .collect();
        projections.insert(scenario, windows);
    }

    Ok(Some(RegionIndices {
        region: region.name.clone(),
        base_period: config.base_period,
        dry_threshold_mm: threshold,
        baseline,
        quarters,
        projections,
    }))
}

/// Round half to even, as the downstream consumers expect; `None` when not finite.
pub fn round_int(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.round_ties_even() as i64)
}

pub fn round_to(value: f64, decimals: i32) -> Option<f64> {
    let scale = 10f64.powi(decimals);
    value
        .is_finite()
        .then(|| (value * scale).round_ties_even() / scale)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnualNumbers {
    pub mean: Option<i64>,
    pub std: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub wet_quarter: String,
    pub dry_quarter: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineNumbers {
    #[serde(rename = "P_annual")]
    pub p_annual: AnnualNumbers,
    #[serde(rename = "PET_annual")]
    pub pet_annual: AnnualNumbers,
    #[serde(rename = "WB_annual")]
    pub wb_annual: AnnualNumbers,
    #[serde(rename = "AI")]
    pub ai: Option<f64>,
    #[serde(rename = "Dry_Days")]
    pub dry_days: Option<i64>,
    #[serde(rename = "CDD")]
    pub cdd: Option<i64>,
    #[serde(rename = "Temp")]
    pub temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonality: Option<Seasonality>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuarterNumbers {
    #[serde(rename = "delta_P_mm")]
    pub delta_p_mm: Option<i64>,
    #[serde(rename = "delta_PET_mm")]
    pub delta_pet_mm: Option<i64>,
    #[serde(rename = "delta_WB_mm")]
    pub delta_wb_mm: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonalNumbers {
    pub wet: QuarterNumbers,
    pub dry: QuarterNumbers,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionNumbers {
    #[serde(rename = "delta_P_mm")]
    pub delta_p_mm: Option<i64>,
    #[serde(rename = "delta_P_pct")]
    pub delta_p_pct: Option<f64>,
    #[serde(rename = "delta_PET_mm")]
    pub delta_pet_mm: Option<i64>,
    #[serde(rename = "delta_PET_pct")]
    pub delta_pet_pct: Option<f64>,
    #[serde(rename = "delta_WB_mm")]
    pub delta_wb_mm: Option<i64>,
    #[serde(rename = "delta_WB_pct")]
    pub delta_wb_pct: Option<f64>,
    #[serde(rename = "delta_AI")]
    pub delta_ai: Option<f64>,
    #[serde(rename = "delta_DryDays")]
    pub delta_dry_days: Option<i64>,
    #[serde(rename = "delta_CDD")]
    pub delta_cdd: Option<i64>,
    #[serde(rename = "delta_Temp")]
    pub delta_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal: Option<SeasonalNumbers>,
}

/// The `key_numbers.json` document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyNumbers {
    pub region: String,
    pub base_period: String,
    pub baseline: BaselineNumbers,
    /// Scenario key, then window label
    pub projections: IndexMap<String, IndexMap<String, ProjectionNumbers>>,
}

impl From<&ScenarioDelta> for ProjectionNumbers {
    fn from(delta: &ScenarioDelta) -> Self {
        let quarter = |wet: bool| {
            delta.seasonal.map(|s| {
                let pick = |q: QuarterSums| if wet { q.wet } else { q.dry };
                QuarterNumbers {
                    delta_p_mm: round_int(pick(s.p)),
                    delta_pet_mm: round_int(pick(s.pet)),
                    delta_wb_mm: round_int(pick(s.wb)),
                }
            })
        };
        let seasonal = match (quarter(true), quarter(false)) {
            (Some(wet), Some(dry)) => Some(SeasonalNumbers { wet, dry }),
            _ => None,
        };
        Self {
            delta_p_mm: round_int(delta.p.absolute),
            delta_p_pct: round_to(delta.p.percent, 1),
            delta_pet_mm: round_int(delta.pet.absolute),
            delta_pet_pct: round_to(delta.pet.percent, 1),
            delta_wb_mm: round_int(delta.wb.absolute),
            delta_wb_pct: round_to(delta.wb.percent, 1),
            delta_ai: round_to(delta.ai, 2),
            delta_dry_days: round_int(delta.dry_days),
            delta_cdd: round_int(delta.cdd),
            delta_temp: delta.temperature.and_then(|t| round_to(t, 1)),
            seasonal,
        }
    }
}

impl KeyNumbers {
    pub fn from_indices(indices: &RegionIndices) -> Self {
        let base = &indices.baseline;
        let annual = |stats: AnnualStats| AnnualNumbers {
            mean: round_int(stats.mean),
            std: round_int(stats.std),
        };
        let baseline = BaselineNumbers {
            p_annual: annual(base.p),
            pet_annual: annual(base.pet),
            wb_annual: annual(base.wb),
            ai: round_to(base.ai, 2),
            dry_days: round_int(base.dry.dry_days),
            cdd: round_int(base.dry.cdd),
            temp: base.temperature.and_then(|t| round_to(t, 1)),
            seasonality: indices.quarters.map(|q| Seasonality {
                wet_quarter: q.wet_label(),
                dry_quarter: q.dry_label(),
            }),
        };

        let projections = indices
            .projections
            .iter()
            .map(|(scenario, windows)| {
                let entries = windows
                    .iter()
                    .filter_map(|(window, delta)| {
                        delta.as_ref().map(|d| (window.label(), ProjectionNumbers::from(d)))
                    })
                    .collect();
                (scenario.key().to_string(), entries)
            })
            .collect();

        Self {
            region: indices.region.clone(),
            base_period: indices.base_period.label(),
            baseline,
            projections,
        }
    }

    pub fn to_json(&self) -> RSWBResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| RSWBError::Serialization(e.to_string()))
    }
}

/// `1234.4` as `1,234`; `n/a` when not finite.
fn thousands(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let digits = format!("{:.0}", value.abs());
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if value.round() < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn signed(value: f64, decimals: usize) -> String {
    if value.is_finite() {
        format!("{value:+.decimals$}")
    } else {
        "n/a".to_string()
    }
}

fn percent(value: f64) -> String {
    if value.is_finite() {
        format!("{value:+.1}%")
    } else {
        "n/a".to_string()
    }
}

fn pathway(scenario: Domain) -> &'static str {
    match scenario {
        Domain::Ssp126 => "Low pathway",
        Domain::Ssp370 => "Intermediate pathway",
        Domain::Ssp585 => "High pathway",
        Domain::Historical => "Historical",
    }
}

fn executive_line(scenario: Domain, delta: Option<&ScenarioDelta>, window: &TimeWindow) -> String {
    let name = format!("{} ({})", pathway(scenario), scenario.label());
    let Some(d) = delta else {
        return format!("- {name}: no data for {window}.");
    };
    let mut line = format!(
        "- {name}: annual water balance changes by {} mm/year ({}); precipitation {} mm/year ({}) \
         and PET {} mm/year ({}). The aridity index shifts by {}. Dry days change by {} per year \
         and the longest dry spell by {} days.",
        signed(d.wb.absolute, 0),
        percent(d.wb.percent),
        signed(d.p.absolute, 0),
        percent(d.p.percent),
        signed(d.pet.absolute, 0),
        percent(d.pet.percent),
        signed(d.ai, 2),
        signed(d.dry_days, 0),
        signed(d.cdd, 0),
    );
    if let Some(t) = d.temperature {
        let _ = write!(line, " Temperature: {} °C.", signed(t, 1));
    }
    line
}

/// Narrative rendering of the region indices.
///
/// The executive summary covers `late_window` (normally the last configured window).
pub fn render_text(indices: &RegionIndices, late_window: Option<&TimeWindow>) -> String {
    let base = &indices.baseline;
    let bp = indices.base_period;
    let mut lines: Vec<String> = vec![
        format!("# CLIMATE CHANGE KEY NUMBERS - {}", indices.region),
        format!("Base period: {bp}"),
        String::new(),
        "## Water supply and balance - baseline (mean ± SD)".to_string(),
        format!(
            "- Annual precipitation: {} ± {} mm/year",
            thousands(base.p.mean),
            thousands(base.p.std)
        ),
        format!(
            "- Annual potential evapotranspiration: {} ± {} mm/year",
            thousands(base.pet.mean),
            thousands(base.pet.std)
        ),
        format!(
            "- Annual water balance (P - PET): {} ± {} mm/year",
            thousands(base.wb.mean),
            thousands(base.wb.std)
        ),
        format!("- Aridity index (AI = P/PET): {:.2}", base.ai),
        format!(
            "- Dry days per year (P < {} mm/day): {} days/year",
            indices.dry_threshold_mm,
            thousands(base.dry.dry_days)
        ),
        format!("- Mean longest dry spell (CDD): {} days", thousands(base.dry.cdd)),
    ];
    if let Some(t) = base.temperature {
        lines.push(format!("- Mean annual temperature: {t:.1} °C"));
    }
    lines.push(String::new());

    if let (Some(q), Some(s)) = (&indices.quarters, &base.seasonal) {
        lines.push("## Seasonality - baseline quarters".to_string());
        lines.push(format!(
            "- Wettest quarter: {} | P={} mm, PET={} mm, WB={} mm",
            q.wet_label(),
            thousands(s.p.wet),
            thousands(s.pet.wet),
            thousands(s.wb.wet)
        ));
        lines.push(format!(
            "- Driest quarter: {} | P={} mm, PET={} mm, WB={} mm",
            q.dry_label(),
            thousands(s.p.dry),
            thousands(s.pet.dry),
            thousands(s.wb.dry)
        ));
        lines.push(String::new());
    }

    lines.push(format!("## Projected changes vs {bp}"));
    for (scenario, windows) in &indices.projections {
        lines.push(format!("### {}", scenario.label()));
        for (window, delta) in windows {
            let Some(d) = delta else {
                lines.push(format!("- {window}: no data"));
                continue;
            };
            lines.push(format!("- {window}:"));
            lines.push(format!(
                "   ΔP = {} mm/year ({}) | ΔPET = {} mm/year ({}) | ΔWB = {} mm/year ({})",
                thousands(d.p.absolute),
                percent(d.p.percent),
                thousands(d.pet.absolute),
                percent(d.pet.percent),
                thousands(d.wb.absolute),
                percent(d.wb.percent)
            ));
            lines.push(format!("   ΔAI (P/PET) = {}", signed(d.ai, 2)));
            lines.push(format!(
                "   Δ dry days/year = {} | Δ CDD = {} days",
                signed(d.dry_days, 0),
                signed(d.cdd, 0)
            ));
            if let Some(t) = d.temperature {
                lines.push(format!("   Δ mean annual temperature = {} °C", signed(t, 1)));
            }
            if let (Some(q), Some(s)) = (&indices.quarters, &d.seasonal) {
                lines.push(format!(
                    "   Wet quarter ({}) ΔP={} mm, ΔPET={} mm, ΔWB={} mm",
                    q.wet_label(),
                    signed(s.p.wet, 0),
                    signed(s.pet.wet, 0),
                    signed(s.wb.wet, 0)
                ));
                lines.push(format!(
                    "   Dry quarter ({}) ΔP={} mm, ΔPET={} mm, ΔWB={} mm",
                    q.dry_label(),
                    signed(s.p.dry, 0),
                    signed(s.pet.dry, 0),
                    signed(s.wb.dry, 0)
                ));
            }
        }
        lines.push(String::new());
    }

    lines.push("Notes:".to_string());
    lines.push(format!(
        "- Dry days are days with P < {} mm/day in the area-weighted regional series.",
        indices.dry_threshold_mm
    ));
    lines.push("- CDD is the longest annual dry spell of the regional series.".to_string());
    lines.push("- AI = P/PET is averaged over yearly ratios (mm/year).".to_string());
    lines.push("- Seasonal changes use the wet and dry quarters of the baseline.".to_string());
    lines.push(String::new());

    if let Some(late) = late_window {
        lines.push("### Executive summary".to_string());
        lines.push(format!("Horizon: {late} relative to {bp}."));
        let mut late_wb = Vec::new();
        for (scenario, windows) in &indices.projections {
            let delta = windows
                .iter()
                .find(|(w, _)| w == late)
                .and_then(|(_, d)| d.as_ref());
            if let Some(d) = delta {
                late_wb.push(d.wb.absolute);
            }
            lines.push(executive_line(*scenario, delta, late));
        }
        lines.push(String::new());

        let finite: Vec<f64> = late_wb.iter().copied().filter(|v| v.is_finite()).collect();
        if late_wb.len() == indices.projections.len() && !finite.is_empty() {
            let mean = finite.iter().sum::<f64>() / finite.len() as f64;
            let direction = if mean < 0.0 {
                "lower water availability"
            } else {
                "higher water availability"
            };
            lines.push("Key messages:".to_string());
            lines.push(format!(
                "- Signals agree across scenarios: a tendency towards {direction} by the end of \
                 the century."
            ));
            lines.push(
                "- The aridity index moves with the water balance; a lower AI means more relative \
                 water stress."
                    .to_string(),
            );
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

/// Write `key_numbers.json` and `key_numbers.txt` into the region summary directory.
pub fn write_key_numbers(
    region: &Region,
    indices: &RegionIndices,
    late_window: Option<&TimeWindow>,
) -> RSWBResult<(PathBuf, PathBuf)> {
    let dir = region.summary_dir();
    fs::create_dir_all(&dir)?;

    let json_path = dir.join(KEY_NUMBERS_JSON);
    fs::write(&json_path, KeyNumbers::from_indices(indices).to_json()?)?;
    let text_path = dir.join(KEY_NUMBERS_TEXT);
    fs::write(&text_path, render_text(indices, late_window))?;

    info!(region = %region.code, path = %json_path.display(), "Wrote key numbers");
    Ok((json_path, text_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indices::{DryDayMetrics, MetricDelta, SeasonalSums};
    use serde_json::Value;

    fn metrics(p: f64, pet: f64, temperature: Option<f64>) -> WindowMetrics {
        let sums = |v: f64| QuarterSums { wet: v * 3.0, dry: v };
        WindowMetrics {
            p: AnnualStats { mean: p, std: 101.5 },
            pet: AnnualStats { mean: pet, std: 20.0 },
            wb: AnnualStats {
                mean: p - pet,
                std: 90.0,
            },
            ai: p / pet,
            dry: DryDayMetrics {
                dry_days: 120.4,
                cdd: 17.5,
            },
            temperature,
            seasonal: Some(SeasonalSums {
                p: sums(p / 4.0),
                pet: sums(pet / 4.0),
                wb: sums((p - pet) / 4.0),
            }),
        }
    }

    fn indices() -> RegionIndices {
        let baseline = metrics(1500.0, 1200.0, Some(18.04));
        let windows = |future: Option<WindowMetrics>| {
            let late = TimeWindow::new(2071, 2100).unwrap();
            vec![
                (TimeWindow::new(2021, 2050).unwrap(), None),
                (late, future.map(|f| ScenarioDelta::between(&baseline, &f))),
            ]
        };
        let mut projections = IndexMap::new();
        projections.insert(Domain::Ssp126, windows(Some(metrics(1450.0, 1250.0, Some(19.0)))));
        projections.insert(Domain::Ssp370, windows(Some(metrics(1400.0, 1300.0, None))));
        projections.insert(Domain::Ssp585, windows(None));
        RegionIndices {
            region: "Napo".to_string(),
            base_period: TimeWindow::new(1981, 2010).unwrap(),
            dry_threshold_mm: 1.0,
            baseline,
            quarters: Some(SeasonalQuarters {
                wet: [3, 4, 5],
                dry: [7, 8, 9],
            }),
            projections,
        }
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_int(2.5), Some(2));
        assert_eq!(round_int(3.5), Some(4));
        assert_eq!(round_int(-0.4), Some(0));
        assert_eq!(round_int(f64::NAN), None);
        assert_eq!(round_to(1.2345, 2), Some(1.23));
        assert_eq!(round_to(f64::INFINITY, 1), None);
        assert_eq!(thousands(1234567.4), "1,234,567");
        assert_eq!(thousands(-1234.0), "-1,234");
        assert_eq!(thousands(-0.2), "0");
        assert_eq!(thousands(f64::NAN), "n/a");
    }

    #[test]
    fn test_json_contract() {
        let json = KeyNumbers::from_indices(&indices()).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["region"], "Napo");
        assert_eq!(value["base_period"], "1981-2010");
        let baseline = &value["baseline"];
        assert_eq!(baseline["P_annual"]["mean"], 1500);
        assert_eq!(baseline["P_annual"]["std"], 102);
        assert_eq!(baseline["AI"], 1.25);
        assert_eq!(baseline["Dry_Days"], 120);
        assert_eq!(baseline["CDD"], 18);
        assert_eq!(baseline["Temp"], 18.0);
        assert_eq!(baseline["seasonality"]["wet_quarter"], "Mar-Apr-May");

        let late = &value["projections"]["ssp126"]["2071-2100"];
        assert_eq!(late["delta_P_mm"], -50);
        assert_eq!(late["delta_P_pct"], -3.3);
        assert_eq!(late["delta_WB_mm"], -100);
        assert_eq!(late["delta_WB_pct"], -33.3);
        assert_eq!(late["delta_Temp"], 1.0);
        assert_eq!(late["seasonal"]["dry"]["delta_P_mm"], -12);
        assert!(value["projections"]["ssp126"].get("2021-2050").is_none());

        assert!(value["projections"]["ssp370"]["2071-2100"]["delta_Temp"].is_null());
        assert_eq!(value["projections"]["ssp585"], serde_json::json!({}));

        let parsed: KeyNumbers = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, KeyNumbers::from_indices(&indices()));
    }

    #[test]
    fn test_zero_baseline_percent_is_null() {
        let delta = ScenarioDelta {
            p: MetricDelta::between(0.0, 10.0),
            ..ScenarioDelta::between(&metrics(1.0, 1.0, None), &metrics(1.0, 1.0, None))
        };
        let numbers = ProjectionNumbers::from(&delta);
        assert_eq!(numbers.delta_p_mm, Some(10));
        assert_eq!(numbers.delta_p_pct, None);
    }

    #[test]
    fn test_render_text() {
        let late = TimeWindow::new(2071, 2100).unwrap();
        let text = render_text(&indices(), Some(&late));
        assert!(text.starts_with("# CLIMATE CHANGE KEY NUMBERS - Napo"));
        assert!(text.contains("- Annual precipitation: 1,500 ± 102 mm/year"));
        assert!(text.contains("- Wettest quarter: Mar-Apr-May"));
        assert!(text.contains("- 2021-2050: no data"));
        assert!(text.contains("ΔAI (P/PET) = -0.09"));
        assert!(text.contains("### Executive summary"));
        assert!(text.contains("- High pathway (SSP5-8.5): no data for 2071-2100."));
        // One scenario lacks the late window, so no key messages
        assert!(!text.contains("Key messages"));
    }

    #[test]
    fn test_write_key_numbers() {
        let tmp = tempfile::tempdir().unwrap();
        let region = Region::new("Napo", tmp.path().join("in"), tmp.path().join("out"));
        let (json, text) = write_key_numbers(&region, &indices(), None).unwrap();
        assert!(json.ends_with("24_Resumen_Ejecutivo/key_numbers.json"));
        assert!(fs::read_to_string(text).unwrap().contains("Base period: 1981-2010"));
        assert!(fs::read_to_string(json).unwrap().contains("\"P_annual\""));
    }
}
