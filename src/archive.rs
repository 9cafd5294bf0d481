//! Zip packaging of the dated output shapefile.
use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip every sibling of the dated output base name into
/// `<base_name>.zip` in the workspace, excluding `.lock` files. Entry names
/// are bare file names so the feed consumer can extract flat.
pub fn zip_output(workspace: &Path, base_name: &str) -> Result<PathBuf> {
    let zip_name = format!("{base_name}.zip");
    let zip_path = workspace.join(&zip_name);
    let members = collect_members(workspace, base_name, &zip_name)?;
    if members.is_empty() {
        return Err(anyhow!(
            "no output files named {base_name}.* to archive in {}",
            workspace.display()
        ));
    }

    let file = File::create(&zip_path)
        .with_context(|| format!("create archive {}", zip_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, path) in &members {
        writer
            .start_file(name.as_str(), options)
            .with_context(|| format!("start archive entry {name}"))?;
        let mut input =
            File::open(path).with_context(|| format!("open {}", path.display()))?;
        io::copy(&mut input, &mut writer)
            .with_context(|| format!("write archive entry {name}"))?;
    }
    writer.finish().context("finalize archive")?;
    Ok(zip_path)
}

fn collect_members(
    workspace: &Path,
    base_name: &str,
    zip_name: &str,
) -> Result<Vec<(String, PathBuf)>> {
    let prefix = format!("{base_name}.");
    let mut members = Vec::new();
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
        if !name.starts_with(&prefix) || name == zip_name {
            continue;
        }
        if name.to_ascii_lowercase().ends_with(".lock") {
            continue;
        }
        members.push((name.to_string(), path));
    }
    members.sort();
    Ok(members)
}
