//! Unit normalization for temperature and precipitation grids.
//!
//! Source catalogs are inconsistent about units: some declare `K`, some `degC`, some declare
//! nothing at all. Every conversion is therefore returned together with a [`UnitDecision`]
//! recording which conversion was applied and on what basis, so the choice can be logged and
//! audited downstream.
//!
//! Decisions fail closed: if the converted values are outside a physically plausible range under
//! every candidate conversion, normalization returns [`crate::errors::RSWBError::ImplausibleUnits`]
//! rather than passing suspicious values to the PET and water-balance formulas.

mod normalize;

pub use normalize::{normalize_precipitation, normalize_temperature};

use serde::Serialize;
use std::fmt;

/// Seconds per day, converting `kg m-2 s-1` to `mm/day`
pub const SECONDS_PER_DAY: f64 = 86_400.0;
/// Offset between Kelvin and degrees Celsius
pub const KELVIN_OFFSET: f64 = 273.15;

/// Plausible near-surface air temperature, °C
pub const TEMPERATURE_RANGE_C: (f64, f64) = (-60.0, 60.0);
/// Plausible daily precipitation or evaporative flux, mm/day
pub const PRECIPITATION_RANGE_MM: (f64, f64) = (-1.0, 2000.0);

/// Canonical units written on normalized temperature grids
pub const CELSIUS: &str = "degC";
/// Canonical units written on normalized flux grids
pub const MM_PER_DAY: &str = "mm/day";

/// A conversion applied to every value of a grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Conversion {
    Identity,
    KelvinToCelsius,
    /// `kg m-2 s-1` to `mm/day`
    FluxToDaily,
}

impl Conversion {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Conversion::Identity => value,
            Conversion::KelvinToCelsius => value - KELVIN_OFFSET,
            Conversion::FluxToDaily => value * SECONDS_PER_DAY,
        }
    }
}

/// What a unit decision was based on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DecisionBasis {
    /// The declared `units` attribute
    DeclaredMetadata,
    /// Magnitude of a representative sample cell
    SampleMagnitude,
    /// Overall min/max of the grid
    RangeHeuristic,
    /// Nothing to go on; the canonical unit was assumed
    Assumed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitDecision {
    pub conversion: Conversion,
    pub basis: DecisionBasis,
    pub explanation: String,
}

impl UnitDecision {
    pub fn new(conversion: Conversion, basis: DecisionBasis, explanation: impl Into<String>) -> Self {
        Self {
            conversion,
            basis,
            explanation: explanation.into(),
        }
    }
}

impl fmt::Display for UnitDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:?}): {}", self.conversion, self.basis, self.explanation)
    }
}
