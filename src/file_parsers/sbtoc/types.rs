use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

/// Packed chunk indices address three related slots per chunk. Nothing documents this, a format
/// revision could well change it.
pub const CHUNK_INDEX_DIVISOR: u32 = 3;

/// Which sections a TOC carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TocFormat {
    /// Bundles followed by the chunk GUID table and chunk entries
    #[default]
    WithChunks,
    /// Bundles only, any chunk sections are ignored
    BundlesOnly,
}

impl FromStr for TocFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "with-chunks" => Ok(TocFormat::WithChunks),
            "bundles-only" => Ok(TocFormat::BundlesOnly),
            _ => Err(format!(
                "Invalid TOC format: {s:?}, expected with-chunks or bundles-only"
            )),
        }
    }
}

/// Offsets are relative to `data_start_offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SbTocHeader {
    pub data_start_offset: usize,
    pub bundle_references_offset: i32,
    pub bundles_offset: i32,
    pub bundles_count: i32,
    pub chunks_flag_offset: i32,
    pub chunks_guid_offset: i32,
    pub chunks_count: i32,
    pub chunks_entry_offset: i32,
}

/// One slice of a storage container. The first sub-entry of a bundle is the bundle itself,
/// the rest line up with its ebx, res and chunk entries in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSubEntry {
    pub unknown: u8,
    pub is_patch: bool,
    pub catalog: u8,
    pub cas: u8,
    pub cas_offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDescriptor {
    pub unknown: i32,
    /// Top nibble is an unrelated flag and has been masked off
    pub size: i32,
    pub offset: i64,
    pub entries: Vec<BundleSubEntry>,
}

impl BundleDescriptor {
    /// Where the bundle's own payload lives
    pub fn bundle_location(&self) -> Option<&BundleSubEntry> {
        self.entries.first()
    }

    /// Locations of the bundle's ebx, res and chunk objects
    pub fn object_locations(&self) -> &[BundleSubEntry] {
        self.entries.get(1..).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkGuidEntry {
    pub guid: Uuid,
    pub flag: u8,
    /// 24-bit packed index
    pub index_raw: u32,
}

impl ChunkGuidEntry {
    /// Position of the raw chunk entry this GUID belongs to
    pub fn index(&self) -> usize {
        (self.index_raw / CHUNK_INDEX_DIVISOR) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChunkEntry {
    pub unknown: u8,
    pub is_patch: bool,
    pub catalog: u8,
    pub cas: u8,
    pub chunk_offset: u32,
    pub chunk_size: u32,
    /// Nil until the GUID table has been applied
    pub guid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SbToc {
    pub header: SbTocHeader,
    pub bundle_references: Vec<u32>,
    pub bundles: Vec<BundleDescriptor>,
    pub chunk_guids: Vec<ChunkGuidEntry>,
    pub chunks: Vec<RawChunkEntry>,
}
