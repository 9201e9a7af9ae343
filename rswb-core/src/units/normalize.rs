use super::{
    Conversion, DecisionBasis, UnitDecision, CELSIUS, MM_PER_DAY, PRECIPITATION_RANGE_MM,
    TEMPERATURE_RANGE_C,
};
use crate::errors::{RSWBError, RSWBResult};
use crate::grid::ClimateGrid;
use tracing::{debug, warn};

/// Convert a temperature grid to degrees Celsius.
///
/// Candidates are tried in order and the first whose converted range is plausible wins:
///
/// 1. the declared units: containing `k` but not `c` means Kelvin, containing `c` means Celsius;
/// 2. the value heuristic: a centre-cell sample above 200 means Kelvin, otherwise any value
///    above 100 or below -100 means Kelvin, otherwise Celsius;
/// 3. whichever conversion has not been tried yet.
pub fn normalize_temperature(grid: &ClimateGrid) -> RSWBResult<(ClimateGrid, UnitDecision)> {
    let declared = declared_units(grid);
    let mut candidates = Vec::new();
    if declared.contains('k') && !declared.contains('c') {
        candidates.push(UnitDecision::new(
            Conversion::KelvinToCelsius,
            DecisionBasis::DeclaredMetadata,
            format!("declared units '{declared}' read as Kelvin"),
        ));
    } else if declared.contains('c') {
        candidates.push(UnitDecision::new(
            Conversion::Identity,
            DecisionBasis::DeclaredMetadata,
            format!("declared units '{declared}' read as Celsius"),
        ));
    }
    candidates.push(temperature_heuristic(grid));
    push_remaining(
        &mut candidates,
        &[Conversion::Identity, Conversion::KelvinToCelsius],
    );

    choose(grid, candidates, TEMPERATURE_RANGE_C, CELSIUS)
}

/// Convert a precipitation (or any water flux) grid to mm/day.
///
/// Declared mass-flux units (`kg`, `s-1`, `s^-1`) are multiplied by 86400; anything else is
/// taken to be mm/day already. A declaration that yields implausible values falls back to the
/// other conversion.
pub fn normalize_precipitation(grid: &ClimateGrid) -> RSWBResult<(ClimateGrid, UnitDecision)> {
    let declared = declared_units(grid).replace("**", "^");
    let mut candidates = Vec::new();
    if declared.contains("kg") || declared.contains("s-1") || declared.contains("s^-1") {
        candidates.push(UnitDecision::new(
            Conversion::FluxToDaily,
            DecisionBasis::DeclaredMetadata,
            format!("declared units '{declared}' read as a mass flux"),
        ));
    } else if declared.is_empty() {
        candidates.push(UnitDecision::new(
            Conversion::Identity,
            DecisionBasis::Assumed,
            "no declared units, assumed mm/day",
        ));
    } else {
        candidates.push(UnitDecision::new(
            Conversion::Identity,
            DecisionBasis::DeclaredMetadata,
            format!("declared units '{declared}' read as mm/day"),
        ));
    }
    push_remaining(
        &mut candidates,
        &[Conversion::Identity, Conversion::FluxToDaily],
    );

    choose(grid, candidates, PRECIPITATION_RANGE_MM, MM_PER_DAY)
}

fn declared_units(grid: &ClimateGrid) -> String {
    grid.units
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Value of the centre cell at the first time step, if finite.
fn sample_value(grid: &ClimateGrid) -> Option<f64> {
    let (n_time, n_lat, n_lon) = grid.values.dim();
    if n_time == 0 || n_lat == 0 || n_lon == 0 {
        return None;
    }
    let value = grid.values[[0, n_lat / 2, n_lon / 2]];
    value.is_finite().then_some(value)
}

fn temperature_heuristic(grid: &ClimateGrid) -> UnitDecision {
    if let Some(sample) = sample_value(grid) {
        if sample > 200.0 {
            return UnitDecision::new(
                Conversion::KelvinToCelsius,
                DecisionBasis::SampleMagnitude,
                format!("centre cell value {sample:.2} exceeds 200"),
            );
        }
    }
    match grid.finite_range() {
        Some((lo, hi)) if hi > 100.0 || lo < -100.0 => UnitDecision::new(
            Conversion::KelvinToCelsius,
            DecisionBasis::RangeHeuristic,
            format!("value range [{lo:.2}, {hi:.2}] exceeds Celsius bounds"),
        ),
        Some((lo, hi)) => UnitDecision::new(
            Conversion::Identity,
            DecisionBasis::RangeHeuristic,
            format!("value range [{lo:.2}, {hi:.2}] consistent with Celsius"),
        ),
        None => UnitDecision::new(
            Conversion::Identity,
            DecisionBasis::Assumed,
            "no finite values, assumed Celsius",
        ),
    }
}

fn push_remaining(candidates: &mut Vec<UnitDecision>, conversions: &[Conversion]) {
    for &conversion in conversions {
        if !candidates.iter().any(|c| c.conversion == conversion) {
            candidates.push(UnitDecision::new(
                conversion,
                DecisionBasis::RangeHeuristic,
                "earlier candidates gave implausible values",
            ));
        }
    }
}

fn choose(
    grid: &ClimateGrid,
    candidates: Vec<UnitDecision>,
    (min, max): (f64, f64),
    canonical_units: &str,
) -> RSWBResult<(ClimateGrid, UnitDecision)> {
    let raw = grid.finite_range();
    let mut rejected = Vec::new();

    for (rank, decision) in candidates.into_iter().enumerate() {
        // Every conversion is monotonically increasing
        let plausible = match raw {
            None => true,
            Some((lo, hi)) => {
                decision.conversion.apply(lo) >= min && decision.conversion.apply(hi) <= max
            }
        };
        if !plausible {
            rejected.push(format!("{:?}", decision.conversion));
            continue;
        }

        if rank == 0 {
            debug!(variable = %grid.name, decision = %decision, "Resolved units");
        } else {
            warn!(
                variable = %grid.name,
                decision = %decision,
                rejected = ?rejected,
                "Unit decision fell back after implausible candidates"
            );
        }
        let mut normalized = grid.clone();
        if decision.conversion != Conversion::Identity {
            normalized
                .values
                .mapv_inplace(|v| decision.conversion.apply(v));
        }
        normalized.units = Some(canonical_units.to_string());
        return Ok((normalized, decision));
    }

    let details = match raw {
        Some((lo, hi)) => format!("raw range [{lo}, {hi}], rejected {}", rejected.join(", ")),
        None => format!("rejected {}", rejected.join(", ")),
    };
    Err(RSWBError::ImplausibleUnits {
        variable: grid.name.clone(),
        details,
    })
}
