//! Regions and the registry that maps region codes to their directories.
//!
//! The registry is a plain value: the orchestrator receives it (or a narrowed copy from
//! [`RegionRegistry::subset`]) as an argument, so there is no shared state to restore after a
//! partial run.

use crate::errors::{RSWBError, RSWBResult};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Numbered output categories consumed by the figure, dashboard and report collaborators.
pub const OUTPUT_CATEGORIES: [&str; 24] = [
    "01_Series_Temporales_Temperatura",
    "02_Series_Temporales_Hidrologicas",
    "03_Indicadores_Sequia",
    "04_Climatologia_Mensual_Comparativa",
    "05_Climatologia_Mensual_Precipitacion",
    "06_Climatologia_Mensual_Evapotranspiracion",
    "07_Climatologia_Mensual_Balance_Hidrico",
    "08_Barras_por_Ventana_Temporal",
    "09_Cambios_Balance_Hidrico",
    "10_Mapas_Componentes_Base",
    "11_Mapas_Cambios_Precipitacion",
    "12_Mapas_Cambios_Evapotranspiracion",
    "13_Mapas_Cambios_Balance_Hidrico",
    "14_Matriz_MultiVentana",
    "15_Trimestres_Base",
    "16_Trimestres_Cambios",
    "17_Mapas_Mensuales_Historico",
    "18_Mapas_Mensuales_SSP126",
    "19_Mapas_Mensuales_SSP370",
    "20_Mapas_Mensuales_SSP585",
    "21_Mapas_Mensuales_Delta_SSP126",
    "22_Mapas_Mensuales_Delta_SSP370",
    "23_Mapas_Mensuales_Delta_SSP585",
    "24_Resumen_Ejecutivo",
];

/// Category holding `key_numbers.json` and `key_numbers.txt`
pub const SUMMARY_CATEGORY: &str = "24_Resumen_Ejecutivo";

/// Normalized region identifier: upper case, spaces replaced by underscores.
pub fn region_code(name: &str) -> String {
    name.trim().to_uppercase().replace(' ', "_")
}

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub code: String,
    /// Display name; also names the default output directory
    pub name: String,
    /// Read-only root holding one sub-directory of clipped grids per domain
    pub input_dir: PathBuf,
    /// Root for derived grids, tables and summaries
    pub output_dir: PathBuf,
    pub geometry: Option<PathBuf>,
    /// CRS identifier overriding the geometry's `.prj`
    pub crs: Option<String>,
    /// Source namespace restricting domain discovery
    pub data_source: Option<String>,
}

impl Region {
    pub fn new(
        name: impl Into<String>,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let name = name.into();
        Self {
            code: region_code(&name),
            name,
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            geometry: None,
            crs: None,
            data_source: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_geometry(mut self, geometry: impl Into<PathBuf>, crs: Option<String>) -> Self {
        self.geometry = Some(geometry.into());
        self.crs = crs;
        self
    }

    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = Some(data_source.into());
        self
    }

    /// Clipped source grids for one domain, e.g. `<input>/ssp126_ecuador`.
    pub fn input_domain_dir(&self, domain_dir: &str) -> PathBuf {
        self.input_dir.join(domain_dir)
    }

    /// Derived grids and tables for one domain.
    pub fn output_domain_dir(&self, domain_dir: &str) -> PathBuf {
        self.output_dir.join(domain_dir)
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.output_dir.join(category)
    }

    pub fn summary_dir(&self) -> PathBuf {
        self.category_dir(SUMMARY_CATEGORY)
    }
}

/// Result of [`RegionRegistry::insert`].
#[derive(Clone, Debug, PartialEq)]
pub enum RegisterOutcome {
    Inserted,
    /// Another region already used the same code and was replaced
    Replaced { previous: Region },
}

/// Insertion-ordered map from region code to region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionRegistry {
    regions: IndexMap<String, Region>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a region. A code collision replaces the earlier region and is logged.
    pub fn insert(&mut self, region: Region) -> RegisterOutcome {
        let code = region.code.clone();
        match self.regions.insert(code.clone(), region) {
            None => RegisterOutcome::Inserted,
            Some(previous) => {
                warn!(
                    region = %code,
                    previous = %previous.name,
                    "Region code collision, replacing earlier region"
                );
                RegisterOutcome::Replaced { previous }
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<&Region> {
        self.regions.get(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// A copy holding only `codes`, in the order given. Unknown codes are an error.
    pub fn subset<S: AsRef<str>>(&self, codes: &[S]) -> RSWBResult<RegionRegistry> {
        let mut narrowed = RegionRegistry::new();
        for code in codes {
            let code = region_code(code.as_ref());
            let region = self.regions.get(&code).ok_or_else(|| {
                RSWBError::Config(format!(
                    "unknown region '{code}' (known: {})",
                    self.codes().collect::<Vec<_>>().join(", ")
                ))
            })?;
            narrowed.insert(region.clone());
        }
        Ok(narrowed)
    }
}

/// Default output directory for a region display name.
pub fn default_output_dir(outputs_dir: &Path, name: &str) -> PathBuf {
    outputs_dir.join(name)
}
