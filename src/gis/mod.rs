//! Capability interface for the geospatial operations the pipeline needs.
//!
//! The pipeline is pure orchestration: it decides which file goes where and in
//! what order, while every geometric or schema operation goes through this
//! trait. Production uses the GDAL command-line tools ([`ogr::OgrBackend`]);
//! tests substitute an in-memory fake.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod ogr;

/// A feature class inside an external datasource, e.g. an enterprise
/// geodatabase connection file plus a qualified layer name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureClassSource {
    /// Datasource path or connection string the backend can open.
    pub datasource: String,
    /// Layer name within the datasource.
    pub layer: String,
}

/// Geospatial operations backing the export pipeline. Every error is fatal to
/// the run; retry and recovery are not this layer's concern.
pub trait GisBackend {
    /// Copy a feature class out of an external source into a local shapefile,
    /// overwriting any existing dataset at `out_shp`.
    fn export_feature_class(&self, source: &FeatureClassSource, out_shp: &Path) -> Result<()>;

    /// Join point features against polygon features by containment. All
    /// points are kept; a point inside no polygon gets null join attributes,
    /// and a point inside several polygons takes the first polygon in the
    /// join layer's row order.
    fn spatial_join(&self, points_shp: &Path, polygons_shp: &Path, out_shp: &Path) -> Result<()>;

    /// Attribute field names in the dataset's current schema, excluding the
    /// feature id and geometry pseudo-fields.
    fn list_fields(&self, shp: &Path) -> Result<Vec<String>>;

    /// Permanently drop the named attribute fields, in place.
    fn drop_fields(&self, shp: &Path, fields: &[String]) -> Result<()>;

    /// Add a fixed-width text field to the schema.
    fn add_text_field(&self, shp: &Path, name: &str, width: u32) -> Result<()>;

    /// Set the named field to a constant value on every record.
    fn calculate_field(&self, shp: &Path, name: &str, value: &str) -> Result<()>;

    /// Reproject the dataset into the coordinate system given by an EPSG
    /// code, writing a new shapefile and overwriting any existing one.
    fn project(&self, in_shp: &Path, out_shp: &Path, srid: u32) -> Result<()>;
}
