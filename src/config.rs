//! Export configuration.
//!
//! Every stage takes explicit paths derived from this config; there is no
//! ambient "current workspace" state. Defaults reproduce the production
//! CodeRED feed; a JSON config file can override any field, and the
//! `--workspace` CLI flag wins over both.
use crate::gis::FeatureClassSource;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Workspace directory receiving the dated output and archive.
    pub workspace: PathBuf,
    /// Scratch directory name under the workspace.
    #[serde(default = "default_temp_dir_name")]
    pub temp_dir_name: String,
    /// Prefix of dated output base names, e.g. `LPC_CodeRED_`.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Address-point feature class in the enterprise source.
    #[serde(default = "default_point_source")]
    pub point_source: FeatureClassSource,
    /// Parcel feature class in the enterprise source.
    #[serde(default = "default_parcel_source")]
    pub parcel_source: FeatureClassSource,
    /// Attribute fields kept in the final output.
    #[serde(default = "default_keep_fields")]
    pub keep_fields: Vec<String>,
    /// EPSG code of the delivery coordinate system.
    #[serde(default = "default_target_srid")]
    pub target_srid: u32,
    /// Name of the jurisdiction field stamped onto every record.
    #[serde(default = "default_state_field")]
    pub state_field: String,
    /// Two-character constant written into the jurisdiction field.
    #[serde(default = "default_state_code")]
    pub state_code: String,
    /// Optional override for the ogr2ogr invocation, shell-split.
    #[serde(default)]
    pub ogr2ogr_command: Option<String>,
    /// Optional override for the ogrinfo invocation, shell-split.
    #[serde(default)]
    pub ogrinfo_command: Option<String>,
}

fn default_temp_dir_name() -> String {
    "temp".to_string()
}

fn default_output_prefix() -> String {
    "LPC_CodeRED_".to_string()
}

fn default_point_source() -> FeatureClassSource {
    FeatureClassSource {
        datasource: "SQLDB4GIS.sde".to_string(),
        layer: "EntGDB.SDE.AddressPoints".to_string(),
    }
}

fn default_parcel_source() -> FeatureClassSource {
    FeatureClassSource {
        datasource: "SQLDB4GIS.sde".to_string(),
        layer: "EntGDB.sde.VWPARCEL".to_string(),
    }
}

fn default_keep_fields() -> Vec<String> {
    [
        "SITE_DR",
        "SITE_ST",
        "SITE_MD",
        "SITE_UNIT",
        "SITE_NUM",
        "LABEL_TYPE",
        "PROPERTY_A",
        "SITE_CITY",
        "SITE_ZIP",
        "STATE_CO",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

fn default_target_srid() -> u32 {
    // NAD83 geographic, the coordinate system CodeRED ingests.
    4269
}

fn default_state_field() -> String {
    "State".to_string()
}

fn default_state_code() -> String {
    "CO".to_string()
}

/// Config used when no config file is given: production defaults rooted at
/// the given workspace.
pub fn default_config(workspace: PathBuf) -> ExportConfig {
    ExportConfig {
        workspace,
        temp_dir_name: default_temp_dir_name(),
        output_prefix: default_output_prefix(),
        point_source: default_point_source(),
        parcel_source: default_parcel_source(),
        keep_fields: default_keep_fields(),
        target_srid: default_target_srid(),
        state_field: default_state_field(),
        state_code: default_state_code(),
        ogr2ogr_command: None,
        ogrinfo_command: None,
    }
}

/// Load a config file and apply the CLI workspace override. Exactly one of
/// the two must supply the workspace.
pub fn resolve_config(
    config_path: Option<&Path>,
    workspace_override: Option<&Path>,
) -> Result<ExportConfig> {
    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => {
            let workspace = workspace_override
                .ok_or_else(|| anyhow!("either --workspace or --config is required"))?;
            default_config(workspace.to_path_buf())
        }
    };
    if let Some(workspace) = workspace_override {
        config.workspace = workspace.to_path_buf();
    }
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<ExportConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: ExportConfig =
        serde_json::from_slice(&bytes).context("parse export config JSON")?;
    Ok(config)
}

pub fn validate_config(config: &ExportConfig) -> Result<()> {
    if config.workspace.as_os_str().is_empty() {
        return Err(anyhow!("workspace must be non-empty"));
    }
    if config.output_prefix.trim().is_empty() {
        return Err(anyhow!("output_prefix must be non-empty"));
    }
    if config.keep_fields.is_empty() {
        return Err(anyhow!("keep_fields must list at least one field"));
    }
    if config.state_code.len() != 2 {
        return Err(anyhow!(
            "state_code must be exactly two characters (got {:?})",
            config.state_code
        ));
    }
    if config.state_field.trim().is_empty() {
        return Err(anyhow!("state_field must be non-empty"));
    }
    Ok(())
}

impl ExportConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.workspace.join(&self.temp_dir_name)
    }

    /// Base name of the dated output, e.g. `LPC_CodeRED_20250829`.
    pub fn output_base_name(&self, date_stamp: &str) -> String {
        format!("{}{date_stamp}", self.output_prefix)
    }
}
