//! The CodeRED export pipeline.
//!
//! One run is a single forward pass: clean the workspace, rebuild the scratch
//! directory, export the two source feature classes, join point-in-polygon,
//! trim attributes, reproject into the delivery coordinate system, stamp the
//! state code, and zip the dated output. Each stage's output file is the next
//! stage's input; there is no branching back and no mid-run recovery beyond
//! the cleaner's soft-fail deletions.
use crate::archive;
use crate::cleaner;
use crate::config::ExportConfig;
use crate::gis::GisBackend;
use crate::shapefile::ShapefileArtifact;
use anyhow::Result;
use std::path::PathBuf;

const POINT_BASE: &str = "AddressPoints";
const PARCEL_BASE: &str = "Parcels";
const JOIN_BASE: &str = "Temp_SpatialJoin";

/// Implicit identity and geometry fields every shapefile carries; the
/// attribute filter never drops them.
const PROTECTED_FIELDS: &[&str] = &["FID", "Shape"];

/// Today's date in the `YYYYMMDD` form used in output names.
pub fn date_stamp_today() -> String {
    chrono::Local::now().format("%Y%m%d").to_string()
}

/// Final artifacts of a successful run.
pub struct ExportOutcome {
    pub shapefile: PathBuf,
    pub archive: PathBuf,
}

/// Run the full export against `backend`, producing the dated shapefile and
/// its zip archive in the workspace.
///
/// A failed run may leave a mix of old and new scratch files behind; the next
/// run's cleanup stages resolve them.
pub fn run_export(
    config: &ExportConfig,
    backend: &dyn GisBackend,
    date_stamp: &str,
) -> Result<ExportOutcome> {
    let workspace = &config.workspace;
    let temp_dir = config.temp_dir();
    let base_name = config.output_base_name(date_stamp);
    let final_output = workspace.join(format!("{base_name}.shp"));

    tracing::info!("cleaning stale outputs in {}", workspace.display());
    cleaner::clean_workspace(workspace, &config.output_prefix)?;

    tracing::info!("preparing scratch dir {}", temp_dir.display());
    cleaner::prepare_temp_dir(&temp_dir)?;
    let points = ShapefileArtifact::new(&temp_dir, POINT_BASE);
    let parcels = ShapefileArtifact::new(&temp_dir, PARCEL_BASE);
    cleaner::force_clear_scratch(&[points.clone(), parcels.clone()]);

    tracing::info!("exporting {}", config.point_source.layer);
    backend.export_feature_class(&config.point_source, &points.shp_path())?;
    tracing::info!("exporting {}", config.parcel_source.layer);
    backend.export_feature_class(&config.parcel_source, &parcels.shp_path())?;

    let joined = ShapefileArtifact::new(&temp_dir, JOIN_BASE);
    cleaner::delete_artifact(&joined);
    tracing::info!("joining {POINT_BASE} to {PARCEL_BASE}");
    backend.spatial_join(&points.shp_path(), &parcels.shp_path(), &joined.shp_path())?;

    let schema = backend.list_fields(&joined.shp_path())?;
    let drop_fields = fields_to_drop(&schema, &config.keep_fields);
    if !drop_fields.is_empty() {
        tracing::info!("dropping {} joined fields", drop_fields.len());
        backend.drop_fields(&joined.shp_path(), &drop_fields)?;
    }

    tracing::info!(
        "projecting to EPSG:{} as {}",
        config.target_srid,
        final_output.display()
    );
    backend.project(&joined.shp_path(), &final_output, config.target_srid)?;

    let output_fields = backend.list_fields(&final_output)?;
    if !output_fields.contains(&config.state_field) {
        let width = u32::try_from(config.state_code.len()).unwrap_or(2);
        backend.add_text_field(&final_output, &config.state_field, width)?;
    }
    tracing::info!("stamping {} = {}", config.state_field, config.state_code);
    backend.calculate_field(&final_output, &config.state_field, &config.state_code)?;

    tracing::info!("archiving {base_name}");
    let archive = archive::zip_output(workspace, &base_name)?;
    Ok(ExportOutcome {
        shapefile: final_output,
        archive,
    })
}

/// Drop list: current schema minus the allow-list minus protected fields.
/// Allow-list names missing from the schema are ignored by construction.
fn fields_to_drop(schema: &[String], keep_fields: &[String]) -> Vec<String> {
    schema
        .iter()
        .filter(|field| {
            !keep_fields.contains(field) && !PROTECTED_FIELDS.contains(&field.as_str())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::gis::FeatureClassSource;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::path::Path;

    #[derive(Clone, Default)]
    struct MockRecord {
        attrs: BTreeMap<String, String>,
        /// Index of the parcel containing this point, if any. Stands in for
        /// geometry so the mock join can decide containment.
        inside_parcel: Option<usize>,
    }

    #[derive(Clone, Default)]
    struct MockLayer {
        fields: Vec<String>,
        records: Vec<MockRecord>,
        srid: u32,
    }

    #[derive(Default)]
    struct MockBackend {
        layers: RefCell<HashMap<PathBuf, MockLayer>>,
    }

    impl MockBackend {
        fn layer(&self, shp: &Path) -> MockLayer {
            self.layers
                .borrow()
                .get(shp)
                .cloned()
                .expect("layer should exist")
        }

        fn store(&self, shp: &Path, layer: MockLayer) {
            write_siblings(shp);
            self.layers.borrow_mut().insert(shp.to_path_buf(), layer);
        }
    }

    /// Fake the multi-file dataset on disk so the cleaner and archiver see
    /// realistic siblings.
    fn write_siblings(shp: &Path) {
        let base = shp.with_extension("");
        for ext in ["shp", "shx", "dbf", "prj"] {
            fs::write(base.with_extension(ext), ext.as_bytes()).expect("write sibling");
        }
    }

    fn point_record(site_num: &str, inside_parcel: Option<usize>) -> MockRecord {
        let mut attrs = BTreeMap::new();
        attrs.insert("SITE_NUM".to_string(), site_num.to_string());
        attrs.insert("SITE_DR".to_string(), "MAIN".to_string());
        attrs.insert("EDIT_USER".to_string(), "gisadmin".to_string());
        MockRecord {
            attrs,
            inside_parcel,
        }
    }

    fn parcel_record(property_a: &str) -> MockRecord {
        let mut attrs = BTreeMap::new();
        attrs.insert("PROPERTY_A".to_string(), property_a.to_string());
        attrs.insert("PARCEL_ID".to_string(), format!("P-{property_a}"));
        MockRecord {
            attrs,
            inside_parcel: None,
        }
    }

    impl GisBackend for MockBackend {
        fn export_feature_class(
            &self,
            source: &FeatureClassSource,
            out_shp: &Path,
        ) -> Result<()> {
            let layer = if source.layer.contains("AddressPoints") {
                MockLayer {
                    fields: vec![
                        "SITE_NUM".to_string(),
                        "SITE_DR".to_string(),
                        "EDIT_USER".to_string(),
                    ],
                    records: vec![point_record("101", Some(0)), point_record("202", None)],
                    srid: 2231,
                }
            } else {
                MockLayer {
                    fields: vec!["PROPERTY_A".to_string(), "PARCEL_ID".to_string()],
                    records: vec![parcel_record("123 MAIN ST")],
                    srid: 2231,
                }
            };
            self.store(out_shp, layer);
            Ok(())
        }

        fn spatial_join(
            &self,
            points_shp: &Path,
            polygons_shp: &Path,
            out_shp: &Path,
        ) -> Result<()> {
            let points = self.layer(points_shp);
            let polygons = self.layer(polygons_shp);
            let mut fields = points.fields.clone();
            fields.extend(polygons.fields.iter().cloned());

            let records = points
                .records
                .iter()
                .map(|point| {
                    let mut attrs = point.attrs.clone();
                    for field in &polygons.fields {
                        let value = point
                            .inside_parcel
                            .and_then(|index| polygons.records.get(index))
                            .and_then(|parcel| parcel.attrs.get(field))
                            .cloned()
                            .unwrap_or_default();
                        attrs.insert(field.clone(), value);
                    }
                    MockRecord {
                        attrs,
                        inside_parcel: point.inside_parcel,
                    }
                })
                .collect();

            self.store(
                out_shp,
                MockLayer {
                    fields,
                    records,
                    srid: points.srid,
                },
            );
            Ok(())
        }

        fn list_fields(&self, shp: &Path) -> Result<Vec<String>> {
            Ok(self.layer(shp).fields)
        }

        fn drop_fields(&self, shp: &Path, fields: &[String]) -> Result<()> {
            let mut layers = self.layers.borrow_mut();
            let layer = layers
                .get_mut(shp)
                .ok_or_else(|| anyhow!("unknown layer {}", shp.display()))?;
            layer.fields.retain(|field| !fields.contains(field));
            for record in &mut layer.records {
                record.attrs.retain(|field, _| !fields.contains(field));
            }
            Ok(())
        }

        fn add_text_field(&self, shp: &Path, name: &str, _width: u32) -> Result<()> {
            let mut layers = self.layers.borrow_mut();
            let layer = layers
                .get_mut(shp)
                .ok_or_else(|| anyhow!("unknown layer {}", shp.display()))?;
            layer.fields.push(name.to_string());
            for record in &mut layer.records {
                record.attrs.insert(name.to_string(), String::new());
            }
            Ok(())
        }

        fn calculate_field(&self, shp: &Path, name: &str, value: &str) -> Result<()> {
            let mut layers = self.layers.borrow_mut();
            let layer = layers
                .get_mut(shp)
                .ok_or_else(|| anyhow!("unknown layer {}", shp.display()))?;
            for record in &mut layer.records {
                record.attrs.insert(name.to_string(), value.to_string());
            }
            Ok(())
        }

        fn project(&self, in_shp: &Path, out_shp: &Path, srid: u32) -> Result<()> {
            let mut layer = self.layer(in_shp);
            layer.srid = srid;
            self.store(out_shp, layer);
            Ok(())
        }
    }

    fn workspace_config(workspace: &Path) -> crate::config::ExportConfig {
        default_config(workspace.to_path_buf())
    }

    #[test]
    fn full_run_produces_filtered_stamped_dated_output() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = workspace_config(dir.path());
        let backend = MockBackend::default();

        // Stale leftovers from an earlier day must not survive the run.
        fs::write(dir.path().join("LPC_CodeRED_20200101.shp"), b"old").expect("seed stale");
        fs::write(dir.path().join("LPC_CodeRED_20200101.zip"), b"old").expect("seed stale");

        let outcome = run_export(&config, &backend, "20250829").expect("run export");

        assert_eq!(
            outcome.shapefile,
            dir.path().join("LPC_CodeRED_20250829.shp")
        );
        assert!(outcome.shapefile.exists());
        assert!(outcome.archive.exists());
        assert!(!dir.path().join("LPC_CodeRED_20200101.shp").exists());
        assert!(!dir.path().join("LPC_CodeRED_20200101.zip").exists());

        let layer = backend.layer(&outcome.shapefile);
        assert_eq!(layer.srid, 4269);

        // Join-only and editing fields are gone; the state field is present.
        assert!(!layer.fields.contains(&"EDIT_USER".to_string()));
        assert!(!layer.fields.contains(&"PARCEL_ID".to_string()));
        assert!(layer.fields.contains(&"SITE_NUM".to_string()));
        assert!(layer.fields.contains(&"PROPERTY_A".to_string()));
        assert!(layer.fields.contains(&"State".to_string()));

        // Keep-all join: both points survive, the unmatched one with empty
        // parcel attributes; every record carries the state constant.
        assert_eq!(layer.records.len(), 2);
        let matched = &layer.records[0];
        let unmatched = &layer.records[1];
        assert_eq!(matched.attrs["PROPERTY_A"], "123 MAIN ST");
        assert_eq!(unmatched.attrs["PROPERTY_A"], "");
        for record in &layer.records {
            assert_eq!(record.attrs["State"], "CO");
        }
    }

    #[test]
    fn archive_contains_exactly_the_output_siblings() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = workspace_config(dir.path());
        let backend = MockBackend::default();

        let outcome = run_export(&config, &backend, "20250829").expect("run export");

        let file = File::open(&outcome.archive).expect("open archive");
        let archive = zip::ZipArchive::new(file).expect("read archive");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "LPC_CodeRED_20250829.dbf",
                "LPC_CodeRED_20250829.prj",
                "LPC_CodeRED_20250829.shp",
                "LPC_CodeRED_20250829.shx",
            ]
        );
    }

    #[test]
    fn same_day_rerun_leaves_a_single_output_set() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = workspace_config(dir.path());
        let backend = MockBackend::default();

        run_export(&config, &backend, "20250829").expect("first run");
        let outcome = run_export(&config, &backend, "20250829").expect("second run");

        let mut dated: Vec<String> = fs::read_dir(dir.path())
            .expect("read workspace")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("LPC_CodeRED_20250829."))
            .collect();
        dated.sort();
        assert_eq!(
            dated,
            vec![
                "LPC_CodeRED_20250829.dbf",
                "LPC_CodeRED_20250829.prj",
                "LPC_CodeRED_20250829.shp",
                "LPC_CodeRED_20250829.shx",
                "LPC_CodeRED_20250829.zip",
            ]
        );
        assert!(outcome.archive.exists());
    }

    #[test]
    fn drop_list_ignores_allow_list_names_absent_from_schema() {
        let schema = vec![
            "FID".to_string(),
            "Shape".to_string(),
            "SITE_NUM".to_string(),
            "Join_Count".to_string(),
        ];
        let keep = vec!["SITE_NUM".to_string(), "SITE_ZIP".to_string()];
        assert_eq!(fields_to_drop(&schema, &keep), vec!["Join_Count"]);
    }
}
