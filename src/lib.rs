//! Regional water-balance and drought indicators from gridded daily climate projections.
//!
//! National daily grids are clipped to each region, converted to potential evapotranspiration
//! and a climatic water balance, and summarised into scalar indices and scenario deltas.
//!
//! - [`rswb_core`]: data model, configuration and grid storage
//! - [`rswb_components`]: the computational stages
//! - [`pipeline`]: step orchestration over a region registry

pub use rswb_components;
pub use rswb_core;

pub mod pipeline;
