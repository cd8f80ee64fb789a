use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};

use crate::superbundle_fs::LoadReport;

pub fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    patterns.iter().any(|pattern| {
        pattern.matches_with(
            name,
            MatchOptions {
                case_sensitive: false,
                require_literal_separator: true,
                ..Default::default()
            },
        )
    })
}

/// List entry names matching a glob pattern, one `<kind> <bundle> <name>` per line
pub fn list_entries(report: &LoadReport, patterns: &[Pattern]) -> Result<()> {
    // Use a buffered writer since we're dumping a lot of data
    let mut stdout = BufWriter::new(io::stdout().lock());

    report
        .bundles
        .iter()
        .flat_map(|bundle| bundle.entries().map(move |entry| (bundle, entry)))
        .filter(|(_, entry)| matches_any(patterns, &entry.entry.name()))
        .try_for_each(|(bundle, entry)| {
            writeln!(
                stdout,
                "{}\t{}\t{}",
                entry.entry.kind(),
                bundle.name,
                entry.entry.name()
            )
            .context("Failed to write to stdout")
        })?;

    stdout.flush().context("Failed to flush stdout")
}
