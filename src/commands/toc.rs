use std::{
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};

use crate::superbundle_fs::SuperbundleFs;

/// Dump the decoded TOC files as JSON, without touching any bundles
pub fn dump_tocs(fs: &SuperbundleFs) -> Result<()> {
    let mut stdout = BufWriter::new(io::stdout().lock());

    for (layer, path) in fs.toc_paths()? {
        let toc = fs.read_toc(&path)?;

        let tree = serde_json::json!({
            "path": path_string(&path),
            "layer": layer,
            "toc": toc,
        });
        serde_json::to_writer_pretty(&mut stdout, &tree).context("Failed to write TOC")?;
        writeln!(stdout).context("Failed to write to stdout")?;
    }

    stdout.flush().context("Failed to flush stdout")
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
