use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};

use crate::superbundle_fs::LoadReport;

/// One line per loaded bundle, failures go to stderr
pub fn list_bundles(report: &LoadReport) -> Result<()> {
    let mut stdout = BufWriter::new(io::stdout().lock());

    writeln!(stdout, "layer\tindex\tname\tebx\tres\tchunks\tcas\toffset\tsize")
        .context("Failed to write to stdout")?;
    for bundle in &report.bundles {
        let contents = &bundle.bundle;
        writeln!(
            stdout,
            "{:?}\t{}\t{}\t{}\t{}\t{}\t{}\t{:#x}\t{:#x}",
            bundle.layer,
            bundle.index,
            bundle.name,
            contents.ebx.len(),
            contents.res.len(),
            contents.chunks.len(),
            bundle.location.path.display(),
            bundle.location.offset,
            bundle.location.size,
        )
        .context("Failed to write to stdout")?;
    }
    stdout.flush().context("Failed to flush stdout")?;

    for failure in &report.failures {
        eprintln!(
            "Failed to load bundle {} of {:?}: {:?}",
            failure.index, failure.toc, failure.error
        );
    }

    Ok(())
}
