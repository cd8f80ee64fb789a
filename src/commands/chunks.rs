use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};

use crate::superbundle_fs::LoadReport;

/// Print the chunk catalog after every layer has been applied
pub fn list_chunks(report: &LoadReport) -> Result<()> {
    let mut stdout = BufWriter::new(io::stdout().lock());

    for record in report.chunks.sorted() {
        let location = &record.location;
        writeln!(
            stdout,
            "{}\t{:?}\t{}\t{}\t{:#x}\t{:#x}",
            record.id,
            record.layer,
            if record.toc_chunk { "toc" } else { "bundle" },
            location.path.display(),
            location.offset,
            location.size,
        )
        .context("Failed to write to stdout")?;
    }

    stdout.flush().context("Failed to flush stdout")
}
