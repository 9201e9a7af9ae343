use std::path::PathBuf;
use thiserror::Error;

/// Error type for pipeline operations.
///
/// Most variants describe a condition that the orchestrator turns into a logged skip
/// for a single (region, domain) unit. Only configuration errors are expected to end a run.
#[derive(Error, Debug)]
pub enum RSWBError {
    #[error("{0}")]
    Error(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Missing input file: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Variable '{variable}' not found in {}", path.display())]
    MissingVariable { variable: String, path: PathBuf },
    #[error("No latitude/longitude reference in {}", .0.display())]
    MissingCoordinates(PathBuf),
    #[error("Malformed grid '{name}': {details}")]
    MalformedGrid { name: String, details: String },
    #[error("Grids '{left}' and '{right}' are not on the same {axis} axis")]
    GridMismatch {
        left: String,
        right: String,
        axis: String,
    },
    #[error("Implausible values for '{variable}' under every candidate unit ({details})")]
    ImplausibleUnits { variable: String, details: String },
    #[error("Invalid time units '{0}'")]
    TimeUnits(String),
    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),
    #[error("Geometry error: {0}")]
    Geometry(String),
    #[error("No grid cells of '{0}' fall inside the region polygon")]
    EmptyClip(String),
    #[error("NetCDF error: {0}")]
    Netcdf(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("NetCDF support not enabled; rebuild with `--features netcdf`")]
    FeatureDisabled,
}

impl From<toml::de::Error> for RSWBError {
    fn from(e: toml::de::Error) -> Self {
        RSWBError::Config(e.to_string())
    }
}

impl From<shapefile::Error> for RSWBError {
    fn from(e: shapefile::Error) -> Self {
        RSWBError::Geometry(e.to_string())
    }
}

#[cfg(feature = "netcdf")]
impl From<netcdf::Error> for RSWBError {
    fn from(e: netcdf::Error) -> Self {
        RSWBError::Netcdf(e.to_string())
    }
}

/// Convenience type for `Result<T, RSWBError>`.
pub type RSWBResult<T> = Result<T, RSWBError>;
