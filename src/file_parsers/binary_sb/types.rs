use std::ops::Range;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::file_parsers::{db_object::DbValue, shared::Sha1};

/// The raw magic is XORed with this before being matched
pub const XOR_MAGIC: u32 = 0x7065_636E;
pub const MAGIC_PLAIN: u32 = 0xC388_9333;
pub const MAGIC_ENCRYPTED: u32 = 0xC3E5_D5C3;
pub const MAGIC_HEADER_ONLY: u32 = 0xED1C_EDB8;

/// On-disk string table and chunk metadata offsets include the fixed header
pub const HEADER_SIZE: u32 = 0x24;
/// Offsets are measured from the end of the data offset field, i.e. 4 bytes before the payload
/// buffer starts once the header size has been taken off
pub const PAYLOAD_BASE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MagicKind {
    /// No hash table, not encrypted
    Plain,
    /// No hash table, payload encrypted
    Encrypted,
    /// Hash table present, no data block follows the entries
    HeaderOnly,
    /// Hash table present
    Hashed,
}

impl MagicKind {
    pub fn classify(magic: u32) -> Self {
        match magic {
            MAGIC_PLAIN => MagicKind::Plain,
            MAGIC_ENCRYPTED => MagicKind::Encrypted,
            MAGIC_HEADER_ONLY => MagicKind::HeaderOnly,
            _ => MagicKind::Hashed,
        }
    }

    pub fn contains_hashes(self) -> bool {
        matches!(self, MagicKind::HeaderOnly | MagicKind::Hashed)
    }

    pub fn is_encrypted(self) -> bool {
        self == MagicKind::Encrypted
    }
}

/// Where the payload buffer handed to the entry table decoder ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadExtent {
    /// Up to the start of the data block
    #[default]
    UntilDataOffset,
    /// Everything after the header, as some titles lay it out
    ToEnd,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// The data block holds raw bytes rather than compression frames
    pub uncompressed: bool,
    /// Added to every located payload offset, for bundles embedded in a larger file
    pub base_offset: u64,
    pub extent: PayloadExtent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTableHeader {
    pub total_count: u32,
    pub ebx_count: u32,
    pub res_count: u32,
    pub chunk_count: u32,
    /// Header size already subtracted
    pub strings_offset: u32,
    /// Header size already subtracted
    pub meta_offset: u32,
    pub meta_size: u32,
}

impl EntryTableHeader {
    /// Hash bucket slots belonging to ebx entries
    pub fn asset_range(&self) -> Range<usize> {
        0..self.ebx_count as usize
    }

    pub fn resource_range(&self) -> Range<usize> {
        let start = self.asset_range().end;
        start..start + self.res_count as usize
    }

    pub fn chunk_range(&self) -> Range<usize> {
        let start = self.resource_range().end;
        start..start + self.chunk_count as usize
    }

    pub fn entry_count(&self) -> u64 {
        u64::from(self.ebx_count) + u64::from(self.res_count) + u64::from(self.chunk_count)
    }
}

/// Content hashes shared by the ebx, res and chunk lists, indexed by position across all three
#[derive(Debug, Clone, PartialEq)]
pub enum HashBucket {
    Present(Vec<Sha1>),
    Absent,
}

impl HashBucket {
    pub fn get(&self, index: usize) -> Sha1 {
        match self {
            HashBucket::Present(hashes) => hashes.get(index).copied().unwrap_or(Sha1::ZERO),
            HashBucket::Absent => Sha1::ZERO,
        }
    }
}

/// Where an entry's payload sits within the container
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadLocation {
    pub offset: u64,
    /// On-disk size, frame headers included
    pub size: u64,
    /// Raw bytes, only kept for uncompressed containers
    #[serde(skip)]
    pub data: Option<Bytes>,
    #[serde(rename = "sb")]
    pub from_superbundle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EbxEntry {
    pub sha1: Sha1,
    pub name: String,
    pub name_hash: u32,
    pub original_size: u32,
    #[serde(flatten)]
    pub location: Option<PayloadLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResEntry {
    pub sha1: Sha1,
    pub name: String,
    pub name_hash: u32,
    pub original_size: u32,
    pub res_type: u32,
    #[serde(serialize_with = "crate::file_parsers::shared::serialize_hex")]
    pub res_meta: [u8; 16],
    pub res_rid: i64,
    #[serde(flatten)]
    pub location: Option<PayloadLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEntry {
    pub id: Uuid,
    pub sha1: Sha1,
    pub logical_offset: u32,
    pub logical_size: u32,
    /// Low 16 bits of the logical offset OR'd onto the logical size
    pub original_size: u64,
    #[serde(flatten)]
    pub location: Option<PayloadLocation>,
}

/// Entries which get a payload location once the data block is walked
pub trait PayloadEntry {
    fn original_size(&self) -> u64;
    fn set_location(&mut self, location: PayloadLocation);
}

impl PayloadEntry for EbxEntry {
    fn original_size(&self) -> u64 {
        u64::from(self.original_size)
    }

    fn set_location(&mut self, location: PayloadLocation) {
        self.location = Some(location);
    }
}

impl PayloadEntry for ResEntry {
    fn original_size(&self) -> u64 {
        u64::from(self.original_size)
    }

    fn set_location(&mut self, location: PayloadLocation) {
        self.location = Some(location);
    }
}

impl PayloadEntry for ChunkEntry {
    fn original_size(&self) -> u64 {
        self.original_size
    }

    fn set_location(&mut self, location: PayloadLocation) {
        self.location = Some(location);
    }
}

/// A decoded bundle. Serializes to the `ebx` / `res` / `chunks` / `dataOffset` / `chunkMeta`
/// tree handed to the asset manager.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinarySb {
    #[serde(skip)]
    pub header: EntryTableHeader,
    #[serde(skip)]
    pub magic: u32,
    pub ebx: Vec<EbxEntry>,
    pub res: Vec<ResEntry>,
    pub chunks: Vec<ChunkEntry>,
    pub data_offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_meta: Option<DbValue>,
}

impl BinarySb {
    pub fn kind(&self) -> MagicKind {
        MagicKind::classify(self.magic)
    }

    /// Total number of ebx, res and chunk entries
    pub fn entry_count(&self) -> usize {
        self.ebx.len() + self.res.len() + self.chunks.len()
    }
}
