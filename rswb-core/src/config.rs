//! Pipeline configuration
//!
//! Loaded from a TOML file. Every field has a default, so a file only needs to list what it
//! changes, typically the region catalog:
//!
//! ```toml
//! outputs_dir = "outputs"
//!
//! [[regions]]
//! name = "Napo"
//! code = "FODESNA"
//! input_dir = "inputs/FODESNA"
//! geometry = "inputs/ne_countries/napo4326.shp"
//! ```

use crate::domain::{
    default_base_period, default_export_periods, default_windows, Domain, TimeWindow,
};
use crate::errors::{RSWBError, RSWBResult};
use crate::region::{default_output_dir, Region, RegionRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Static catalog entry for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEntry {
    /// Display name
    pub name: String,

    /// Explicit region code
    /// default: the normalized name
    #[serde(default)]
    pub code: Option<String>,

    /// Root of the region's clipped input grids
    /// default: `<inputs_dir>/<code>`
    #[serde(default)]
    pub input_dir: Option<PathBuf>,

    /// Region boundary shapefile
    #[serde(default)]
    pub geometry: Option<PathBuf>,

    /// Output root
    /// default: `<outputs_dir>/<name>`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Source namespace hint for domain discovery
    #[serde(default)]
    pub data_source: Option<String>,

    /// CRS of the geometry, overriding the `.prj` sidecar (e.g. `EPSG:32717`)
    #[serde(default)]
    pub crs: Option<String>,
}

/// Settings shared by every stage of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of per-region input directories
    /// default: inputs
    pub inputs_dir: PathBuf,

    /// Root of per-region output directories
    /// default: outputs
    pub outputs_dir: PathBuf,

    /// Root of the national source grids searched by the resolver
    /// default: .
    pub source_dir: PathBuf,

    /// Fragment appended to every domain key in directory and file names
    /// default: ecuador
    pub domain_suffix: String,

    /// Known source namespaces, in resolver precedence order
    /// default: ["FODESNA", "FMPLPT"]
    pub source_namespaces: Vec<String>,

    /// Historical reference window
    /// default: 1981-2010
    pub base_period: TimeWindow,

    /// Future comparison windows
    /// default: 2021-2050, 2041-2070, 2071-2100
    pub windows: Vec<TimeWindow>,

    /// Windows of the per-cell mean annual water-balance grids exported for future scenarios
    /// default: 2020-2040, 2040-2060, 2060-2080, 2080-2100
    pub export_periods: Vec<TimeWindow>,

    /// Daily precipitation below this counts as a dry day
    /// unit: mm/day
    /// default: 1.0
    pub dry_threshold_mm: f64,

    /// Deflate level for written grids (0-9)
    /// default: 4
    pub compression_level: i32,

    /// Static region catalog
    pub regions: Vec<RegionEntry>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs_dir: PathBuf::from("inputs"),
            outputs_dir: PathBuf::from("outputs"),
            source_dir: PathBuf::from("."),
            domain_suffix: "ecuador".to_string(),
            source_namespaces: vec!["FODESNA".to_string(), "FMPLPT".to_string()],
            base_period: default_base_period(),
            windows: default_windows(),
            export_periods: default_export_periods(),
            dry_threshold_mm: 1.0,
            compression_level: 4,
            regions: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(contents: &str) -> RSWBResult<Self> {
        let config: PipelineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> RSWBResult<Self> {
        if !path.exists() {
            return Err(RSWBError::MissingFile(path.to_path_buf()));
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> RSWBResult<()> {
        self.base_period.validate()?;
        for window in self.windows.iter().chain(&self.export_periods) {
            window.validate()?;
        }
        if !(0..=9).contains(&self.compression_level) {
            return Err(RSWBError::Config(format!(
                "compression_level must be within 0-9, got {}",
                self.compression_level
            )));
        }
        if self.dry_threshold_mm.is_nan() || self.dry_threshold_mm < 0.0 {
            return Err(RSWBError::Config(format!(
                "dry_threshold_mm must be non-negative, got {}",
                self.dry_threshold_mm
            )));
        }
        if self.source_namespaces.is_empty() {
            return Err(RSWBError::Config(
                "source_namespaces must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory and file-name fragment for a domain, e.g. `ssp126_ecuador`.
    pub fn domain_dir(&self, domain: Domain) -> String {
        domain.directory(&self.domain_suffix)
    }

    /// The window reported in the executive summary (the one ending last).
    pub fn late_window(&self) -> Option<TimeWindow> {
        self.windows.iter().copied().max_by_key(|w| (w.end, w.start))
    }

    pub fn region_from_entry(&self, entry: &RegionEntry) -> Region {
        let mut region = Region::new(
            entry.name.clone(),
            PathBuf::new(),
            entry
                .output_dir
                .clone()
                .unwrap_or_else(|| default_output_dir(&self.outputs_dir, &entry.name)),
        );
        if let Some(code) = &entry.code {
            region = region.with_code(code.clone());
        }
        region.input_dir = entry
            .input_dir
            .clone()
            .unwrap_or_else(|| self.inputs_dir.join(&region.code));
        if let Some(geometry) = &entry.geometry {
            region = region.with_geometry(geometry.clone(), entry.crs.clone());
        }
        if let Some(source) = &entry.data_source {
            region = region.with_data_source(source.clone());
        }
        region
    }

    /// Registry of every catalog region. Code collisions are logged and the later entry wins.
    pub fn registry(&self) -> RegionRegistry {
        let mut registry = RegionRegistry::new();
        for entry in &self.regions {
            registry.insert(self.region_from_entry(entry));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegisterOutcome;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.domain_dir(Domain::Ssp585), "ssp585_ecuador");
        assert_eq!(config.base_period, TimeWindow { start: 1981, end: 2010 });
        assert_eq!(config.late_window().unwrap().label(), "2071-2100");
        let periods: Vec<String> = config.export_periods.iter().map(|p| p.label()).collect();
        assert_eq!(periods, vec!["2020-2040", "2040-2060", "2060-2080", "2080-2100"]);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            outputs_dir = "/tmp/out"
            dry_threshold_mm = 0.5

            [[regions]]
            name = "FMPLPT (Tungurahua)"
            code = "FMPLPT"
            input_dir = "inputs/FMPLPT"
            geometry = "inputs/ne_countries/Tungurahua4326.shp"

            [[regions]]
            name = "Napo"
            data_source = "FODESNA"
        "#;
        let config = PipelineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.dry_threshold_mm, 0.5);
        assert_eq!(config.compression_level, 4);

        let registry = config.registry();
        assert_eq!(registry.codes().collect::<Vec<_>>(), vec!["FMPLPT", "NAPO"]);

        let napo = registry.get("NAPO").unwrap();
        assert_eq!(napo.input_dir, PathBuf::from("inputs/NAPO"));
        assert_eq!(napo.output_dir, PathBuf::from("/tmp/out/Napo"));
        assert_eq!(napo.data_source.as_deref(), Some("FODESNA"));

        let tungurahua = registry.get("FMPLPT").unwrap();
        assert!(tungurahua.geometry.is_some());
        assert_eq!(tungurahua.output_dir, PathBuf::from("/tmp/out/FMPLPT (Tungurahua)"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            PipelineConfig::from_toml_str("compression_level = 12"),
            Err(RSWBError::Config(_))
        ));
        assert!(PipelineConfig::from_toml_str("windows = [{ start = 2050, end = 2021 }]").is_err());
        assert!(
            PipelineConfig::from_toml_str("export_periods = [{ start = 2100, end = 2080 }]").is_err()
        );
        assert!(PipelineConfig::from_toml_str("dry_threshold_mm = \"one\"").is_err());
    }

    #[test]
    fn test_collisions_surface_in_registry() {
        let config = PipelineConfig {
            regions: vec![
                RegionEntry {
                    name: "Alto Napo".into(),
                    code: None,
                    input_dir: None,
                    geometry: None,
                    output_dir: None,
                    data_source: None,
                    crs: None,
                },
                RegionEntry {
                    name: "alto napo".into(),
                    code: None,
                    input_dir: Some("other".into()),
                    geometry: None,
                    output_dir: None,
                    data_source: None,
                    crs: None,
                },
            ],
            ..Default::default()
        };
        let mut registry = config.registry();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ALTO_NAPO").unwrap().input_dir, PathBuf::from("other"));
        let again = config.region_from_entry(&config.regions[0]);
        assert!(matches!(registry.insert(again), RegisterOutcome::Replaced { .. }));
    }
}
