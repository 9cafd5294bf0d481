//! Best-effort cleanup of stale run artifacts.
//!
//! Deletions here are soft failures: a file another process still holds open
//! is retried, then logged and skipped. The run continues either way; the next
//! run's cleanup pass picks up whatever was left behind.
use crate::retry;
use crate::shapefile::{self, ShapefileArtifact};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Retry budget for a single file deletion: 5 attempts, 2 s apart.
pub const DELETE_ATTEMPTS: u32 = 5;
pub const DELETE_PAUSE: Duration = Duration::from_secs(2);

/// Pause after force-clearing scratch shapefiles so the OS releases handles
/// before the same base names are recreated.
const SETTLE_PAUSE: Duration = Duration::from_secs(2);

/// Delete one file with the given retry budget. Returns whether the file is
/// gone; exhaustion is logged, never propagated.
pub fn try_delete(path: &Path, attempts: u32, pause: Duration) -> bool {
    let label = format!("delete {}", path.display());
    let outcome = retry::with_fixed_pause(attempts, pause, &label, || {
        fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
        Ok(())
    });
    match outcome {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!("giving up after {attempts} attempts: {err:#}");
            false
        }
    }
}

/// Delete prior outputs and archives in the workspace: every file whose name
/// starts with `output_prefix` and carries a shapefile sibling extension or
/// `.zip`.
pub fn clean_workspace(workspace: &Path, output_prefix: &str) -> Result<()> {
    for entry in
        fs::read_dir(workspace).with_context(|| format!("read workspace {}", workspace.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(output_prefix) && is_stale_output_name(name) {
            try_delete(&path, DELETE_ATTEMPTS, DELETE_PAUSE);
        }
    }
    Ok(())
}

fn is_stale_output_name(name: &str) -> bool {
    shapefile::has_sibling_extension(name) || name.to_ascii_lowercase().ends_with(".zip")
}

/// Ensure the scratch directory exists and holds no shapefile components from
/// a previous run.
pub fn prepare_temp_dir(temp_dir: &Path) -> Result<()> {
    fs::create_dir_all(temp_dir)
        .with_context(|| format!("create temp dir {}", temp_dir.display()))?;
    for entry in
        fs::read_dir(temp_dir).with_context(|| format!("read temp dir {}", temp_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if shapefile::has_sibling_extension(name) {
            try_delete(&path, DELETE_ATTEMPTS, DELETE_PAUSE);
        }
    }
    Ok(())
}

/// Force-clear specific scratch shapefiles by base name before regenerating
/// them, then settle so recreation does not race handle release.
pub fn force_clear_scratch(artifacts: &[ShapefileArtifact]) {
    for artifact in artifacts {
        delete_artifact(artifact);
    }
    thread::sleep(SETTLE_PAUSE);
}

/// Delete every existing component of a shapefile. The extension set is one
/// unit; leaving a partial set behind corrupts the dataset.
pub fn delete_artifact(artifact: &ShapefileArtifact) {
    for path in artifact.existing_siblings() {
        try_delete(&path, DELETE_ATTEMPTS, DELETE_PAUSE);
    }
}
