//! GDAL command-line backend.
//!
//! Drives `ogr2ogr` and `ogrinfo` as subprocesses rather than binding GDAL
//! directly: the tools are present wherever the feed runs, and a command
//! override in the config lets operators point at a wrapper script or a
//! containerized GDAL without rebuilding.
//!
//! The spatial join runs through the SQLite dialect. The `MIN(ROWID)`
//! subquery pins the multi-match case to the first containing polygon in row
//! order, so repeated runs over the same data produce the same join.
use super::{FeatureClassSource, GisBackend};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::path::Path;
use std::process::Command;

pub struct OgrBackend {
    ogr2ogr: Vec<String>,
    ogrinfo: Vec<String>,
}

impl OgrBackend {
    /// Resolve the GDAL tools, preferring explicit command overrides and
    /// falling back to a PATH lookup.
    pub fn locate(ogr2ogr_override: Option<&str>, ogrinfo_override: Option<&str>) -> Result<Self> {
        Ok(Self {
            ogr2ogr: resolve_tool("ogr2ogr", ogr2ogr_override)?,
            ogrinfo: resolve_tool("ogrinfo", ogrinfo_override)?,
        })
    }
}

fn resolve_tool(name: &str, override_cmd: Option<&str>) -> Result<Vec<String>> {
    if let Some(raw) = override_cmd {
        let words = shell_words::split(raw)
            .with_context(|| format!("parse {name} command override: {raw}"))?;
        if words.is_empty() {
            return Err(anyhow!("{name} command override is empty"));
        }
        return Ok(words);
    }
    let path =
        which::which(name).with_context(|| format!("locate {name} on PATH (is GDAL installed?)"))?;
    Ok(vec![path.to_string_lossy().to_string()])
}

fn run_tool(command: &[String], args: &[String], label: &str) -> Result<String> {
    let (program, base_args) = command
        .split_first()
        .ok_or_else(|| anyhow!("empty command for {label}"))?;
    let output = Command::new(program)
        .args(base_args)
        .args(args)
        .output()
        .with_context(|| format!("spawn {program} for {label}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "{label} failed (exit {:?}): {}",
            output.status.code(),
            stderr.trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Layer name a shapefile dataset is addressed by: its base file name.
fn layer_name(shp: &Path) -> Result<String> {
    shp.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("shapefile path has no UTF-8 base name: {}", shp.display()))
}

fn path_arg(path: &Path, label: &str) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{label} path is not valid UTF-8: {}", path.display()))
}

/// Select list for the join: all point columns, then every polygon column,
/// aliased with a `_1` suffix where the name collides with a point column.
/// Names longer than the DBF limit are laundered by OGR on write.
fn join_select_list(point_fields: &[String], polygon_fields: &[String]) -> String {
    let mut select = vec!["p.*".to_string()];
    for field in polygon_fields {
        if point_fields.iter().any(|f| f == field) {
            select.push(format!("j.\"{field}\" AS \"{field}_1\""));
        } else {
            select.push(format!("j.\"{field}\""));
        }
    }
    select.join(", ")
}

fn join_sql(points_layer: &str, polygons_layer: &str, select_list: &str) -> String {
    format!(
        "SELECT {select_list} FROM \"{points_layer}\" p \
         LEFT JOIN \"{polygons_layer}\" j ON j.ROWID = \
         (SELECT MIN(c.ROWID) FROM \"{polygons_layer}\" c \
         WHERE ST_Within(p.geometry, c.geometry))"
    )
}

/// Pull attribute field names out of `ogrinfo -so` summary output. Field
/// definition lines look like `SITE_DR: String (50.0)`; geometry and feature
/// count lines do not match the type alternation.
fn parse_field_names(summary: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(
        r"(?m)^\s*([A-Za-z_][A-Za-z0-9_]*): (?:Integer64List|IntegerList|RealList|StringList|Integer64|Integer|Real|String|DateTime|Date|Time|Binary)",
    )
    .context("compile ogrinfo field pattern")?;
    Ok(pattern
        .captures_iter(summary)
        .map(|captures| captures[1].to_string())
        .collect())
}

fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

impl GisBackend for OgrBackend {
    fn export_feature_class(&self, source: &FeatureClassSource, out_shp: &Path) -> Result<()> {
        let args = vec![
            "-f".to_string(),
            "ESRI Shapefile".to_string(),
            "-overwrite".to_string(),
            path_arg(out_shp, "export output")?,
            source.datasource.clone(),
            source.layer.clone(),
        ];
        run_tool(
            &self.ogr2ogr,
            &args,
            &format!("export {}", source.layer),
        )?;
        Ok(())
    }

    fn spatial_join(&self, points_shp: &Path, polygons_shp: &Path, out_shp: &Path) -> Result<()> {
        let datasource_dir = points_shp
            .parent()
            .ok_or_else(|| anyhow!("points shapefile has no parent directory"))?;
        if polygons_shp.parent() != Some(datasource_dir) {
            return Err(anyhow!(
                "spatial join inputs must share a directory: {} vs {}",
                points_shp.display(),
                polygons_shp.display()
            ));
        }

        let points_layer = layer_name(points_shp)?;
        let polygons_layer = layer_name(polygons_shp)?;
        let point_fields = self.list_fields(points_shp)?;
        let polygon_fields = self.list_fields(polygons_shp)?;
        let select_list = join_select_list(&point_fields, &polygon_fields);
        let sql = join_sql(&points_layer, &polygons_layer, &select_list);

        let args = vec![
            "-f".to_string(),
            "ESRI Shapefile".to_string(),
            "-overwrite".to_string(),
            path_arg(out_shp, "join output")?,
            path_arg(datasource_dir, "join datasource")?,
            "-dialect".to_string(),
            "SQLITE".to_string(),
            "-sql".to_string(),
            sql,
        ];
        run_tool(&self.ogr2ogr, &args, "spatial join")?;
        Ok(())
    }

    fn list_fields(&self, shp: &Path) -> Result<Vec<String>> {
        let layer = layer_name(shp)?;
        let args = vec![
            "-ro".to_string(),
            "-so".to_string(),
            path_arg(shp, "schema input")?,
            layer.clone(),
        ];
        let summary = run_tool(&self.ogrinfo, &args, &format!("list fields of {layer}"))?;
        parse_field_names(&summary)
    }

    fn drop_fields(&self, shp: &Path, fields: &[String]) -> Result<()> {
        let layer = layer_name(shp)?;
        for field in fields {
            let args = vec![
                path_arg(shp, "field drop input")?,
                "-sql".to_string(),
                format!("ALTER TABLE \"{layer}\" DROP COLUMN \"{field}\""),
            ];
            run_tool(&self.ogrinfo, &args, &format!("drop field {field}"))?;
        }
        Ok(())
    }

    fn add_text_field(&self, shp: &Path, name: &str, width: u32) -> Result<()> {
        let layer = layer_name(shp)?;
        let args = vec![
            path_arg(shp, "field add input")?,
            "-sql".to_string(),
            format!("ALTER TABLE \"{layer}\" ADD COLUMN \"{name}\" character({width})"),
        ];
        run_tool(&self.ogrinfo, &args, &format!("add field {name}"))?;
        Ok(())
    }

    fn calculate_field(&self, shp: &Path, name: &str, value: &str) -> Result<()> {
        let layer = layer_name(shp)?;
        let literal = escape_sql_literal(value);
        let args = vec![
            path_arg(shp, "field calc input")?,
            "-dialect".to_string(),
            "SQLITE".to_string(),
            "-sql".to_string(),
            format!("UPDATE \"{layer}\" SET \"{name}\" = '{literal}'"),
        ];
        run_tool(&self.ogrinfo, &args, &format!("calculate field {name}"))?;
        Ok(())
    }

    fn project(&self, in_shp: &Path, out_shp: &Path, srid: u32) -> Result<()> {
        let args = vec![
            "-f".to_string(),
            "ESRI Shapefile".to_string(),
            "-overwrite".to_string(),
            "-t_srs".to_string(),
            format!("EPSG:{srid}"),
            path_arg(out_shp, "projection output")?,
            path_arg(in_shp, "projection input")?,
        ];
        run_tool(&self.ogr2ogr, &args, &format!("project to EPSG:{srid}"))?;
        Ok(())
    }
}
