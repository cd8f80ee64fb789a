//! Binary superbundle payloads: the entry table describing a bundle's ebx, res and chunk
//! objects, followed by the objects' frame data

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::{cursor::Endian, file_parsers::FileParser, keys::KeyStore};

pub mod decrypt;
pub mod parser;
pub mod types;
pub use parser::BinarySbReader;
use types::{BinarySb, DecodeOptions};

pub struct BinarySbParser<'k> {
    pub endian: Endian,
    pub keys: &'k dyn KeyStore,
    pub options: DecodeOptions,
}

impl FileParser for BinarySbParser<'_> {
    type Output = BinarySb;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Output> {
        BinarySbReader::new(self.endian, self.keys)
            .read(Bytes::copy_from_slice(bytes), &self.options)
            .context("Failed to parse binary superbundle")
    }
}
