use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::superbundle_fs::{LoadReport, SuperbundleFs};

/// Write the decompressed contents of an entry to stdout. `name` is an ebx or res name, or a
/// chunk GUID.
pub fn cat_entry(fs: &SuperbundleFs, report: &LoadReport, name: &str) -> Result<()> {
    let contents = match report.find_entry(name) {
        Some(entry) => fs.read_entry(&entry),
        None => {
            let id = Uuid::parse_str(name)
                .with_context(|| format!("No entry named {name:?} and it isn't a GUID"))?;
            let record = report
                .chunks
                .get(&id)
                .with_context(|| format!("Chunk not found: {id}"))?;
            fs.read_chunk(record)
        }
    }
    .context("Failed to read entry")?;

    let mut stdout = BufWriter::new(io::stdout().lock());
    stdout
        .write_all(&contents)
        .context("Failed to write to stdout")?;

    stdout.flush().context("Failed to flush stdout")
}
