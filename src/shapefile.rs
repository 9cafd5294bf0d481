//! Shapefile artifacts as atomic multi-file units.
//!
//! A shapefile is never one file: the `.shp` geometry file travels with a set
//! of sibling files sharing its base name. Deleting or copying only some of
//! them leaves a corrupt dataset, so every operation here works on the full
//! extension set.
use std::path::{Path, PathBuf};

/// Extensions that together make up one shapefile dataset on disk, including
/// the transient `.lock` files some readers leave behind.
pub const SIBLING_EXTENSIONS: &[&str] = &[
    "shp", "shx", "dbf", "prj", "sbn", "sbx", "cpg", "xml", "lock",
];

/// One shapefile dataset addressed by directory plus base name.
#[derive(Debug, Clone)]
pub struct ShapefileArtifact {
    dir: PathBuf,
    base_name: String,
}

impl ShapefileArtifact {
    pub fn new(dir: &Path, base_name: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            base_name: base_name.to_string(),
        }
    }

    /// Path of the `.shp` component, the name backends address the dataset by.
    pub fn shp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.shp", self.base_name))
    }

    /// Every possible component path, whether or not it exists yet.
    pub fn sibling_paths(&self) -> Vec<PathBuf> {
        SIBLING_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{ext}", self.base_name)))
            .collect()
    }

    /// Component paths currently present on disk.
    pub fn existing_siblings(&self) -> Vec<PathBuf> {
        self.sibling_paths()
            .into_iter()
            .filter(|path| path.exists())
            .collect()
    }
}

/// True when a file name carries one of the shapefile sibling extensions.
/// Matching is case-insensitive because Windows-produced artifacts show up
/// with uppercase extensions.
pub fn has_sibling_extension(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    SIBLING_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}
