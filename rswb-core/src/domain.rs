//! Scenario domains and the calendar-year windows compared across them.

use crate::errors::{RSWBError, RSWBResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One historical or forward-scenario dataset category.
///
/// Domains are processed in the order of [`Domain::ALL`]; the historical domain always comes
/// first because seasonal quarters and baseline metrics are derived from it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Historical,
    Ssp126,
    Ssp370,
    Ssp585,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Historical,
        Domain::Ssp126,
        Domain::Ssp370,
        Domain::Ssp585,
    ];

    pub const SCENARIOS: [Domain; 3] = [Domain::Ssp126, Domain::Ssp370, Domain::Ssp585];

    /// Key used in file names and in the JSON summary.
    pub fn key(&self) -> &'static str {
        match self {
            Domain::Historical => "historical",
            Domain::Ssp126 => "ssp126",
            Domain::Ssp370 => "ssp370",
            Domain::Ssp585 => "ssp585",
        }
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Historical => "Historical",
            Domain::Ssp126 => "SSP1-2.6",
            Domain::Ssp370 => "SSP3-7.0",
            Domain::Ssp585 => "SSP5-8.5",
        }
    }

    /// Directory and file-name fragment, e.g. `ssp126_ecuador`.
    pub fn directory(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            self.key().to_string()
        } else {
            format!("{}_{}", self.key(), suffix)
        }
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, Domain::Historical)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Domain {
    type Err = RSWBError;

    /// Accepts a bare key (`ssp370`), a directory name (`ssp370_ecuador`) or a label (`SSP3-7.0`).
    fn from_str(s: &str) -> RSWBResult<Self> {
        let lowered = s.trim().to_lowercase();
        let head = lowered.split('_').next().unwrap_or_default();
        Domain::ALL
            .into_iter()
            .find(|d| d.key() == head || d.label().to_lowercase() == lowered)
            .ok_or_else(|| RSWBError::Config(format!("unknown domain '{s}'")))
    }
}

/// A closed calendar-year interval; both endpoints are inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i32,
    pub end: i32,
}

impl TimeWindow {
    pub fn new(start: i32, end: i32) -> RSWBResult<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> RSWBResult<()> {
        if self.start > self.end {
            return Err(RSWBError::Config(format!(
                "window start {} is after its end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn n_years(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// Key used in the JSON summary, e.g. `2021-2050`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

pub fn default_base_period() -> TimeWindow {
    TimeWindow {
        start: 1981,
        end: 2010,
    }
}

/// Near, mid and late horizons.
pub fn default_windows() -> Vec<TimeWindow> {
    vec![
        TimeWindow {
            start: 2021,
            end: 2050,
        },
        TimeWindow {
            start: 2041,
            end: 2070,
        },
        TimeWindow {
            start: 2071,
            end: 2100,
        },
    ]
}

/// Twenty-year periods of the exported water-balance maps.
pub fn default_export_periods() -> Vec<TimeWindow> {
    [2020, 2040, 2060, 2080]
        .into_iter()
        .map(|start| TimeWindow {
            start,
            end: start + 20,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parsing() {
        assert_eq!("historical".parse::<Domain>().unwrap(), Domain::Historical);
        assert_eq!("ssp370_ecuador".parse::<Domain>().unwrap(), Domain::Ssp370);
        assert_eq!("SSP5-8.5".parse::<Domain>().unwrap(), Domain::Ssp585);
        assert!("ssp245".parse::<Domain>().is_err());
    }

    #[test]
    fn test_domain_directory() {
        assert_eq!(Domain::Ssp126.directory("ecuador"), "ssp126_ecuador");
        assert_eq!(Domain::Historical.directory(""), "historical");
        assert!(Domain::ALL[0].is_baseline());
        assert!(Domain::SCENARIOS.iter().all(|d| !d.is_baseline()));
    }

    #[test]
    fn test_window_is_inclusive() {
        let w = TimeWindow::new(2021, 2050).unwrap();
        assert!(w.contains(2021));
        assert!(w.contains(2050));
        assert!(!w.contains(2051));
        assert_eq!(w.n_years(), 30);
        assert_eq!(w.label(), "2021-2050");
        assert!(TimeWindow::new(2050, 2021).is_err());
    }
}
