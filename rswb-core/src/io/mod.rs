//! Grid storage.
//!
//! Stages read and write whole grid files through the [`GridStore`] trait. [`NetcdfStore`] is the
//! production implementation (real NetCDF I/O needs the `netcdf` feature); [`MemoryStore`] keeps
//! datasets in process, which lets the full pipeline run in tests without the NetCDF C library.

mod netcdf_store;

pub use netcdf_store::NetcdfStore;

use crate::errors::{RSWBError, RSWBResult};
use crate::grid::GridDataset;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// File extension of grid files
pub const GRID_EXTENSION: &str = "nc";

pub trait GridStore {
    /// Read every grid variable of one file.
    fn read(&self, path: &Path) -> RSWBResult<GridDataset>;

    /// Write a dataset, replacing any existing file. Parent directories are created.
    fn write(&self, path: &Path, dataset: &GridDataset, compression_level: i32) -> RSWBResult<()>;

    fn exists(&self, path: &Path) -> bool;

    fn dir_exists(&self, path: &Path) -> bool;

    /// Grid files directly inside `dir`, sorted by path.
    fn list_grids(&self, dir: &Path) -> RSWBResult<Vec<PathBuf>>;
}

fn is_grid_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(GRID_EXTENSION)
}

/// In-process store keyed by path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RefCell<BTreeMap<PathBuf, GridDataset>>,
    dirs: RefCell<BTreeSet<PathBuf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset without going through [`GridStore::write`].
    pub fn insert(&self, path: impl Into<PathBuf>, dataset: GridDataset) {
        self.files.borrow_mut().insert(path.into(), dataset);
    }

    /// Register an empty directory.
    pub fn create_dir(&self, path: impl Into<PathBuf>) {
        self.dirs.borrow_mut().insert(path.into());
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.borrow().is_empty()
    }
}

impl GridStore for MemoryStore {
    fn read(&self, path: &Path) -> RSWBResult<GridDataset> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| RSWBError::MissingFile(path.to_path_buf()))
    }

    fn write(&self, path: &Path, dataset: &GridDataset, _compression_level: i32) -> RSWBResult<()> {
        if dataset.is_empty() {
            return Err(RSWBError::Error(format!(
                "refusing to write an empty dataset to {}",
                path.display()
            )));
        }
        self.insert(path, dataset.clone());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.dirs.borrow().iter().any(|d| d.starts_with(path))
            || self
                .files
                .borrow()
                .keys()
                .any(|f| f.parent().map_or(false, |p| p.starts_with(path)))
    }

    fn list_grids(&self, dir: &Path) -> RSWBResult<Vec<PathBuf>> {
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|f| f.parent() == Some(dir) && is_grid_file(f))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Calendar, DayStamp};
    use crate::grid::{ClimateGrid, TimeAxis};
    use ndarray::array;

    fn dataset() -> GridDataset {
        let stamps = Calendar::Standard
            .daily_range(DayStamp::new(2000, 1, 1), 2)
            .unwrap();
        GridDataset::from_grids([ClimateGrid::filled(
            "pr",
            array![0.0],
            array![0.0],
            TimeAxis::daily(stamps),
            Calendar::Standard,
            1.0,
        )])
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let path = Path::new("/in/FODESNA/historical_ecuador/pr_historical_ecuador.nc");
        store.write(path, &dataset(), 4).unwrap();

        assert!(store.exists(path));
        assert_eq!(store.read(path).unwrap(), dataset());
        assert!(store.dir_exists(Path::new("/in/FODESNA")));
        assert!(store.dir_exists(Path::new("/in/FODESNA/historical_ecuador")));
        assert!(!store.dir_exists(Path::new("/in/FMPLPT")));
        assert!(matches!(
            store.read(Path::new("/in/missing.nc")),
            Err(RSWBError::MissingFile(_))
        ));
    }

    #[test]
    fn test_list_grids_is_shallow_and_sorted() {
        let store = MemoryStore::new();
        store.insert("/d/tas.nc", dataset());
        store.insert("/d/pr.nc", dataset());
        store.insert("/d/sub/tasmax.nc", dataset());
        store.insert("/d/readme.txt", dataset());
        store.create_dir("/empty");

        assert_eq!(
            store.list_grids(Path::new("/d")).unwrap(),
            vec![PathBuf::from("/d/pr.nc"), PathBuf::from("/d/tas.nc")]
        );
        assert!(store.dir_exists(Path::new("/empty")));
        assert!(store.list_grids(Path::new("/empty")).unwrap().is_empty());
    }
}
