//! Discovery of per-domain source directories.
//!
//! National source grids are not laid out consistently: a domain directory may sit under
//! `inputs/<namespace>/`, directly under `<namespace>/`, under a generic `inputs/`, or at the
//! source root itself. Resolution probes an explicit, ordered candidate list and reports every
//! directory it tried, so a missing domain or an ambiguous layout can be explained.

use indexmap::IndexMap;
use rswb_core::config::PipelineConfig;
use rswb_core::domain::Domain;
use rswb_core::errors::{RSWBError, RSWBResult};
use rswb_core::grid::ClimateGrid;
use rswb_core::io::GridStore;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Generic sub-directory holding national inputs
pub const INPUTS_SUBDIR: &str = "inputs";

#[derive(Clone, Debug, PartialEq)]
pub enum DomainResolution {
    Found {
        path: PathBuf,
        probed: Vec<PathBuf>,
        /// Later candidates that also exist but lost on precedence
        other_matches: Vec<PathBuf>,
    },
    NotFound {
        probed: Vec<PathBuf>,
    },
}

impl DomainResolution {
    pub fn path(&self) -> Option<&Path> {
        match self {
            DomainResolution::Found { path, .. } => Some(path),
            DomainResolution::NotFound { .. } => None,
        }
    }

    pub fn probed(&self) -> &[PathBuf] {
        match self {
            DomainResolution::Found { probed, .. } | DomainResolution::NotFound { probed } => probed,
        }
    }
}

/// Candidate parent directories, highest precedence first.
///
/// With a namespace hint that namespace is searched (`inputs/<hint>`, then `<hint>`) before
/// the generic `inputs/`. Without one: the root, the generic `inputs/`, then every known namespace under `inputs/`,
/// then every known namespace directly under the root.
pub fn candidate_roots(root: &Path, hint: Option<&str>, namespaces: &[String]) -> Vec<PathBuf> {
    let inputs = root.join(INPUTS_SUBDIR);
    match hint {
        Some(namespace) => vec![inputs.join(namespace), root.join(namespace), inputs],
        None => {
            let mut roots = vec![root.to_path_buf(), inputs.clone()];
            roots.extend(namespaces.iter().map(|ns| inputs.join(ns)));
            roots.extend(namespaces.iter().map(|ns| root.join(ns)));
            roots
        }
    }
}

/// Locate the directory holding one domain's grids.
pub fn resolve_domain(
    store: &dyn GridStore,
    root: &Path,
    domain_dir: &str,
    hint: Option<&str>,
    namespaces: &[String],
) -> DomainResolution {
    let probed: Vec<PathBuf> = candidate_roots(root, hint, namespaces)
        .into_iter()
        .map(|candidate| candidate.join(domain_dir))
        .collect();
    let mut matches = probed.iter().filter(|p| store.dir_exists(p)).cloned();

    match matches.next() {
        Some(path) => {
            let other_matches: Vec<PathBuf> = matches.collect();
            if !other_matches.is_empty() {
                warn!(
                    domain = %domain_dir,
                    chosen = %path.display(),
                    others = ?other_matches,
                    "Several source directories match; using the first by precedence"
                );
            }
            debug!(domain = %domain_dir, path = %path.display(), "Resolved domain");
            DomainResolution::Found {
                path,
                probed,
                other_matches,
            }
        }
        None => {
            warn!(domain = %domain_dir, probed = ?probed, "Domain not found");
            DomainResolution::NotFound { probed }
        }
    }
}

/// Resolve every domain in order. A missing domain does not affect the others.
pub fn resolve_all(
    store: &dyn GridStore,
    root: &Path,
    hint: Option<&str>,
    config: &PipelineConfig,
) -> IndexMap<Domain, DomainResolution> {
    Domain::ALL
        .into_iter()
        .map(|domain| {
            let resolution = resolve_domain(
                store,
                root,
                &config.domain_dir(domain),
                hint,
                &config.source_namespaces,
            );
            (domain, resolution)
        })
        .collect()
}

/// `<dir>/<var>_<domain>.nc`
pub fn domain_file(dir: &Path, variable: &str, domain_dir: &str) -> PathBuf {
    dir.join(format!("{variable}_{domain_dir}.nc"))
}

/// The first candidate set whose files all exist.
pub fn locate_inputs(store: &dyn GridStore, candidates: &[Vec<PathBuf>]) -> Option<Vec<PathBuf>> {
    candidates
        .iter()
        .find(|set| set.iter().all(|p| store.exists(p)))
        .cloned()
}

/// Read the first of `names` present in the file at `path`.
pub fn read_variable(
    store: &dyn GridStore,
    path: &Path,
    names: &[&str],
) -> RSWBResult<ClimateGrid> {
    store
        .read(path)?
        .find_any(names)
        .cloned()
        .ok_or_else(|| RSWBError::MissingVariable {
            variable: names.join("|"),
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use rswb_core::grid::GridDataset;
    use rswb_core::io::MemoryStore;

    fn namespaces() -> Vec<String> {
        vec!["FODESNA".to_string(), "FMPLPT".to_string()]
    }

    #[test]
    fn test_candidate_order_without_hint() {
        let roots = candidate_roots(Path::new("/src"), None, &namespaces());
        let expected: Vec<PathBuf> = [
            "/src",
            "/src/inputs",
            "/src/inputs/FODESNA",
            "/src/inputs/FMPLPT",
            "/src/FODESNA",
            "/src/FMPLPT",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(roots, expected);
    }

    #[test]
    fn test_hint_restricts_namespace() {
        let store = MemoryStore::new();
        store.create_dir("/src/FODESNA/historical_ecuador");
        store.create_dir("/src/FMPLPT/historical_ecuador");

        let resolution = resolve_domain(
            &store,
            Path::new("/src"),
            "historical_ecuador",
            Some("FMPLPT"),
            &namespaces(),
        );
        assert_eq!(
            resolution.path(),
            Some(Path::new("/src/FMPLPT/historical_ecuador"))
        );
        assert_eq!(
            resolution.probed(),
            &[
                PathBuf::from("/src/inputs/FMPLPT/historical_ecuador"),
                PathBuf::from("/src/FMPLPT/historical_ecuador"),
                PathBuf::from("/src/inputs/historical_ecuador"),
            ]
        );

        let resolution = resolve_domain(
            &store,
            Path::new("/src"),
            "ssp126_ecuador",
            Some("FODESNA"),
            &namespaces(),
        );
        assert!(matches!(resolution, DomainResolution::NotFound { .. }));
    }

    #[test]
    fn test_hint_falls_back_to_generic_inputs() {
        let store = MemoryStore::new();
        store.create_dir("/src/inputs/historical_ecuador");
        store.create_dir("/src/FMPLPT/ssp126_ecuador");

        let resolution = resolve_domain(
            &store,
            Path::new("/src"),
            "historical_ecuador",
            Some("FODESNA"),
            &namespaces(),
        );
        assert_eq!(
            resolution.path(),
            Some(Path::new("/src/inputs/historical_ecuador"))
        );

        // Other namespaces stay out of reach
        let resolution = resolve_domain(
            &store,
            Path::new("/src"),
            "ssp126_ecuador",
            Some("FODESNA"),
            &namespaces(),
        );
        assert!(resolution.path().is_none());
    }

    #[test]
    fn test_ambiguous_layout_is_surfaced() {
        let store = MemoryStore::new();
        store.create_dir("/src/inputs/FMPLPT/ssp126_ecuador");
        store.create_dir("/src/inputs/ssp126_ecuador");

        match resolve_domain(&store, Path::new("/src"), "ssp126_ecuador", None, &namespaces()) {
            DomainResolution::Found {
                path,
                other_matches,
                ..
            } => {
                assert_eq!(path, PathBuf::from("/src/inputs/ssp126_ecuador"));
                assert_eq!(
                    other_matches,
                    vec![PathBuf::from("/src/inputs/FMPLPT/ssp126_ecuador")]
                );
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_all_continues_past_missing_domains() {
        let store = MemoryStore::new();
        store.create_dir("/src/FODESNA/historical_ecuador");
        store.create_dir("/src/FODESNA/ssp585_ecuador");

        let resolved = resolve_all(&store, Path::new("/src"), None, &PipelineConfig::default());
        assert_eq!(resolved.len(), 4);
        assert!(resolved[&Domain::Historical].path().is_some());
        assert!(resolved[&Domain::Ssp126].path().is_none());
        assert_eq!(resolved[&Domain::Ssp370].probed().len(), 6);
        assert!(resolved[&Domain::Ssp585].path().is_some());
    }

    #[test]
    fn test_locate_inputs_prefers_domain_names() {
        let store = MemoryStore::new();
        let dir = Path::new("/in/historical_ecuador");
        let grid = || GridDataset::from_grids([testing::uniform("tmin", 10.0, 2000, 1)]);
        store.insert(dir.join("tasmin.nc"), grid());
        store.insert(dir.join("tasmax.nc"), grid());
        store.insert(domain_file(dir, "tasmin", "historical_ecuador"), grid());

        let primary = vec![
            domain_file(dir, "tasmin", "historical_ecuador"),
            domain_file(dir, "tasmax", "historical_ecuador"),
        ];
        let fallback = vec![dir.join("tasmin.nc"), dir.join("tasmax.nc")];
        assert_eq!(
            locate_inputs(&store, &[primary.clone(), fallback.clone()]),
            Some(fallback)
        );
        assert_eq!(locate_inputs(&store, &[primary]), None);

        let tmin = read_variable(&store, &dir.join("tasmin.nc"), &["tasmin", "tmin"]).unwrap();
        assert_eq!(tmin.name, "tmin");
        assert!(matches!(
            read_variable(&store, &dir.join("tasmin.nc"), &["tas"]),
            Err(RSWBError::MissingVariable { .. })
        ));
    }
}
