//! Calendar-aware daily time stamps.
//!
//! Climate projections are frequently stored on model calendars (`noleap`, `360_day`) that
//! cannot be represented by a proleptic Gregorian date type. [`DayStamp`] is a plain
//! `(year, month, day)` triple whose arithmetic is always interpreted through a [`Calendar`].
//!
//! ```rust
//! use rswb_core::calendar::{Calendar, DayStamp, TimeUnits};
//!
//! let units = TimeUnits::parse("days since 1850-01-01").unwrap();
//! let stamp = units.decode(365.0, Calendar::NoLeap).unwrap();
//! assert_eq!(stamp, DayStamp::new(1851, 1, 1));
//! ```

use crate::errors::{RSWBError, RSWBResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const DAYS_BEFORE_MONTH_365: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
const DAYS_BEFORE_MONTH_366: [u32; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

/// A calendar date with no calendar attached.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayStamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl DayStamp {
    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// First day of the month containing this stamp
    pub fn month_start(&self) -> Self {
        Self::new(self.year, self.month, 1)
    }

    /// First day of the year containing this stamp
    pub fn year_start(&self) -> Self {
        Self::new(self.year, 1, 1)
    }
}

impl fmt::Display for DayStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// CF calendars supported by the pipeline.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calendar {
    /// `standard`, `gregorian` and `proleptic_gregorian`
    #[default]
    Standard,
    /// `noleap` / `365_day`
    NoLeap,
    /// `all_leap` / `366_day`
    AllLeap,
    /// `360_day`: twelve 30-day months
    Day360,
}

impl Calendar {
    /// Parse the CF `calendar` attribute.
    pub fn parse(attribute: &str) -> RSWBResult<Self> {
        match attribute.trim().to_lowercase().as_str() {
            "" | "standard" | "gregorian" | "proleptic_gregorian" => Ok(Calendar::Standard),
            "noleap" | "no_leap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(RSWBError::TimeUnits(format!("unknown calendar '{other}'"))),
        }
    }

    /// Name written to the CF `calendar` attribute.
    pub fn cf_name(&self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
        }
    }

    pub fn is_leap(&self, year: i32) -> bool {
        match self {
            Calendar::Standard => (year % 4 == 0 && year % 100 != 0) || year % 400 == 0,
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
        }
    }

    pub fn days_in_year(&self, year: i32) -> u32 {
        match self {
            Calendar::Day360 => 360,
            _ if self.is_leap(year) => 366,
            _ => 365,
        }
    }

    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match (self, month) {
            (Calendar::Day360, _) => 30,
            (_, 2) if self.is_leap(year) => 29,
            (_, 2) => 28,
            (_, 4 | 6 | 9 | 11) => 30,
            _ => 31,
        }
    }

    /// Whether the stamp names a day that exists in this calendar.
    pub fn is_valid(&self, stamp: DayStamp) -> bool {
        (1..=12).contains(&stamp.month)
            && stamp.day >= 1
            && stamp.day <= self.days_in_month(stamp.year, stamp.month)
    }

    /// One-based day of the year.
    pub fn day_of_year(&self, stamp: DayStamp) -> u32 {
        let month_index = (stamp.month.clamp(1, 12) - 1) as usize;
        let before = match self {
            Calendar::Day360 => month_index as u32 * 30,
            _ if self.is_leap(stamp.year) => DAYS_BEFORE_MONTH_366[month_index],
            _ => DAYS_BEFORE_MONTH_365[month_index],
        };
        before + stamp.day
    }

    /// Days elapsed since 0001-01-01 in this calendar.
    fn ordinal(&self, stamp: DayStamp) -> RSWBResult<i64> {
        let doy = i64::from(self.day_of_year(stamp)) - 1;
        let year = i64::from(stamp.year);
        match self {
            Calendar::Standard => NaiveDate::from_ymd_opt(stamp.year, stamp.month, stamp.day)
                .map(|d| i64::from(d.num_days_from_ce()) - 1)
                .ok_or_else(|| RSWBError::TimeUnits(format!("invalid date {stamp}"))),
            Calendar::NoLeap => Ok(year * 365 + doy),
            Calendar::AllLeap => Ok(year * 366 + doy),
            Calendar::Day360 => Ok(year * 360 + doy),
        }
    }

    fn from_ordinal(&self, ordinal: i64) -> RSWBResult<DayStamp> {
        let out_of_range = || RSWBError::TimeUnits(format!("day {ordinal} is out of range"));
        let (year, doy) = match self {
            Calendar::Standard => {
                let days = i32::try_from(ordinal + 1).map_err(|_| out_of_range())?;
                return NaiveDate::from_num_days_from_ce_opt(days)
                    .map(|d| DayStamp::new(d.year(), d.month(), d.day()))
                    .ok_or_else(out_of_range);
            }
            Calendar::NoLeap => (ordinal.div_euclid(365), ordinal.rem_euclid(365) as u32),
            Calendar::AllLeap => (ordinal.div_euclid(366), ordinal.rem_euclid(366) as u32),
            Calendar::Day360 => (ordinal.div_euclid(360), ordinal.rem_euclid(360) as u32),
        };
        let year = i32::try_from(year).map_err(|_| out_of_range())?;
        if *self == Calendar::Day360 {
            return Ok(DayStamp::new(year, doy / 30 + 1, doy % 30 + 1));
        }
        let table = if self.is_leap(year) {
            &DAYS_BEFORE_MONTH_366
        } else {
            &DAYS_BEFORE_MONTH_365
        };
        let month_index = table.iter().rposition(|&before| before <= doy).unwrap_or(0);
        Ok(DayStamp::new(
            year,
            month_index as u32 + 1,
            doy - table[month_index] + 1,
        ))
    }

    /// Signed number of days from `epoch` to `stamp`.
    pub fn days_between(&self, epoch: DayStamp, stamp: DayStamp) -> RSWBResult<i64> {
        Ok(self.ordinal(stamp)? - self.ordinal(epoch)?)
    }

    /// The stamp `days` days after `epoch`.
    pub fn add_days(&self, epoch: DayStamp, days: i64) -> RSWBResult<DayStamp> {
        let ordinal = self
            .ordinal(epoch)?
            .checked_add(days)
            .ok_or_else(|| RSWBError::TimeUnits(format!("{days} days after {epoch} overflows")))?;
        self.from_ordinal(ordinal)
    }

    /// Consecutive daily stamps starting at `start`.
    pub fn daily_range(&self, start: DayStamp, n_days: usize) -> RSWBResult<Vec<DayStamp>> {
        let origin = self.ordinal(start)?;
        (0..n_days as i64)
            .map(|offset| self.from_ordinal(origin + offset))
            .collect()
    }
}

/// CF `"<unit> since <epoch>"` time encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeUnits {
    /// Length of one stored unit in days
    unit_days: f64,
    epoch: DayStamp,
    /// Time of day of the epoch, as a fraction of a day
    epoch_fraction: f64,
}

impl Default for TimeUnits {
    fn default() -> Self {
        Self {
            unit_days: 1.0,
            epoch: DayStamp::new(1850, 1, 1),
            epoch_fraction: 0.0,
        }
    }
}

impl TimeUnits {
    pub fn parse(units: &str) -> RSWBResult<Self> {
        let invalid = || RSWBError::TimeUnits(units.to_string());
        let lowered = units.trim().to_lowercase();
        let (unit, reference) = lowered.split_once(" since ").ok_or_else(invalid)?;
        let unit_days = match unit.trim() {
            "days" | "day" | "d" => 1.0,
            "hours" | "hour" | "h" => 1.0 / 24.0,
            "minutes" | "minute" | "min" => 1.0 / 1440.0,
            "seconds" | "second" | "s" => 1.0 / 86400.0,
            _ => return Err(invalid()),
        };

        let mut parts = reference.split(|c| c == ' ' || c == 'T').filter(|p| !p.is_empty());
        let date = parts.next().ok_or_else(invalid)?;
        let mut ymd = date.split('-').map(|p| p.parse::<i64>());
        let (year, month, day) = match (ymd.next(), ymd.next(), ymd.next()) {
            (Some(Ok(y)), Some(Ok(m)), Some(Ok(d))) => (y, m, d),
            _ => return Err(invalid()),
        };
        let epoch_fraction = match parts.next() {
            Some(clock) => {
                let mut hms = clock
                    .trim_end_matches('z')
                    .split(':')
                    .map(|p| p.parse::<f64>().unwrap_or(0.0));
                let hours = hms.next().unwrap_or(0.0);
                let minutes = hms.next().unwrap_or(0.0);
                let seconds = hms.next().unwrap_or(0.0);
                (hours * 3600.0 + minutes * 60.0 + seconds) / 86400.0
            }
            None => 0.0,
        };

        Ok(Self {
            unit_days,
            epoch: DayStamp::new(year as i32, month as u32, day as u32),
            epoch_fraction,
        })
    }

    pub fn epoch(&self) -> DayStamp {
        self.epoch
    }

    /// Decode one stored offset. Fractional days are floored to the containing day.
    ///
    /// Non-finite offsets and dates the calendar cannot represent are errors.
    pub fn decode(&self, offset: f64, calendar: Calendar) -> RSWBResult<DayStamp> {
        let days = (offset * self.unit_days + self.epoch_fraction).floor();
        if !days.is_finite() || days.abs() > i64::MAX as f64 {
            return Err(RSWBError::TimeUnits(format!(
                "time offset {offset} cannot be decoded"
            )));
        }
        calendar.add_days(self.epoch, days as i64)
    }

    pub fn encode(&self, stamp: DayStamp, calendar: Calendar) -> RSWBResult<f64> {
        let days = calendar.days_between(self.epoch, stamp)? as f64;
        Ok((days - self.epoch_fraction) / self.unit_days)
    }

    /// CF units string, e.g. `days since 1850-01-01 00:00:00`.
    pub fn to_cf_string(&self) -> String {
        let unit = if self.unit_days == 1.0 {
            "days"
        } else if self.unit_days == 1.0 / 24.0 {
            "hours"
        } else if self.unit_days == 1.0 / 1440.0 {
            "minutes"
        } else {
            "seconds"
        };
        let seconds = (self.epoch_fraction * 86400.0).round() as u32;
        format!(
            "{unit} since {} {:02}:{:02}:{:02}",
            self.epoch,
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    }
}
