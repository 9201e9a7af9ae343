//! Data model and shared plumbing for the regional water-balance pipeline.
//!
//! The computational stages live in `rswb-components`; this crate holds what every stage
//! agrees on: calendars and time axes, gridded climate variables, unit decisions, region
//! geometry, the region registry, configuration and grid storage.

pub mod calendar;
pub mod config;
pub mod domain;
pub mod errors;
pub mod geometry;
pub mod grid;
pub mod io;
pub mod region;
pub mod series;
pub mod spatial;
pub mod units;
