use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Component, Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use glob::Pattern;

use super::list::matches_any;
use crate::superbundle_fs::{LoadReport, LoadedBundle, TocLayer};

/// `<output>/<data|patch>/<bundle name>.json`
fn output_path(output_folder: &Path, bundle: &LoadedBundle) -> Result<PathBuf> {
    let relative = PathBuf::from(format!("{}.json", bundle.name));
    ensure!(
        relative
            .components()
            .all(|c| matches!(c, Component::Normal(_))),
        "Bundle name can't be used as a path: {:?}",
        bundle.name
    );

    let layer = match bundle.layer {
        TocLayer::Base => "data",
        TocLayer::Patch => "patch",
    };
    Ok(output_folder.join(layer).join(relative))
}

fn dump_bundle(output_folder: &Path, bundle: &LoadedBundle) -> Result<PathBuf> {
    let path = output_path(output_folder, bundle)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create folder")?;
    }

    let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), bundle)
        .context("Failed to serialize bundle")?;

    Ok(path)
}

/// Write every bundle whose name matches a pattern out as a JSON tree
pub fn dump_bundles(report: &LoadReport, patterns: &[Pattern], output_folder: &Path) -> Result<()> {
    report
        .bundles
        .iter()
        .filter(|bundle| matches_any(patterns, &bundle.name))
        .map(|bundle| dump_bundle(output_folder, bundle).map_err(|e| (&bundle.name, e)))
        // Report results
        .for_each(|result| match result {
            Ok(path) => eprintln!("Dumped bundle: {:?}", path),
            Err((name, e)) => eprintln!("Failed to dump bundle {:?}: {:?}", name, e),
        });

    Ok(())
}
