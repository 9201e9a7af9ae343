//! Computational stages of the water-balance pipeline.
//!
//! Each stage reads grids through a [`rswb_core::io::GridStore`] and writes its own products;
//! no stage mutates the grids of an earlier one.
//!
//! | Stage | Reads | Writes |
//! |---|---|---|
//! | [`resolver`] | source directory layout | - |
//! | [`clipper`] | national source grids | `<input>/<domain>/<var>_<domain>.nc` |
//! | [`pet`] | `tasmin`, `tasmax`, `tas` | `<output>/<domain>/pet_<domain>.nc` |
//! | [`water_balance`] | `pr`, `pet` | `wb_<domain>.nc`, `wb_agg_<domain>.nc` |
//! | [`indices`] | `wb_<domain>.nc` | - |
//! | [`periods`] | `wb_<domain>.nc` | `wb_periods/wb_<domain>_<period>.nc` |
//! | [`summary`] | indices | `24_Resumen_Ejecutivo/key_numbers.{json,txt}` |
//! | [`tables`] | `wb_agg_<domain>.nc` | `wb_monthly_mean_<domain>.csv`, `wb_annual_mean_<domain>.csv` |
//! | [`validation`] | clipped source grids, PET | - |

pub mod clipper;
pub mod indices;
pub mod periods;
pub mod pet;
pub mod resolver;
pub mod summary;
pub mod tables;
pub mod validation;
pub mod water_balance;

#[cfg(test)]
pub(crate) mod testing;
