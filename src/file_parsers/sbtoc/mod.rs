//! Table of contents listing a superbundle's bundles and the chunks stored alongside them

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::file_parsers::FileParser;

pub mod parser;
pub mod types;
pub use parser::SbTocReader;
use types::{SbToc, TocFormat};

pub struct SbTocParser {
    pub format: TocFormat,
}

impl FileParser for SbTocParser {
    type Output = SbToc;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Output> {
        SbTocReader::new(Bytes::copy_from_slice(bytes))
            .read(self.format)
            .context("Failed to parse superbundle TOC")
    }
}
