//! Encoders for small synthetic containers, used to exercise the decoders without game files.
//! They only write what the decoders read and make no attempt at producing valid game data.

use std::io::Write;

use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use flate2::{write::ZlibEncoder, Compression};
use uuid::Uuid;

use crate::{
    cursor::Endian,
    file_parsers::{
        binary_sb::types::{MagicKind, HEADER_SIZE, PAYLOAD_BASE, XOR_MAGIC},
        db_object::{types::ANONYMOUS_FLAG, DbValue},
        sbtoc::types::{BundleSubEntry, ChunkGuidEntry, RawChunkEntry},
        shared::Sha1,
    },
};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

fn put_u32(out: &mut Vec<u8>, value: u32, endian: Endian) {
    match endian {
        Endian::Little => out.extend(value.to_le_bytes()),
        Endian::Big => out.extend(value.to_be_bytes()),
    }
}

fn put_i64(out: &mut Vec<u8>, value: i64, endian: Endian) {
    match endian {
        Endian::Little => out.extend(value.to_le_bytes()),
        Endian::Big => out.extend(value.to_be_bytes()),
    }
}

fn put_7bit(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Encrypt whole blocks with the key doubling as the IV
pub fn encrypt_in_place(buffer: &mut [u8], key: &[u8]) {
    let aligned = buffer.len() - buffer.len() % 16;
    Aes128CbcEnc::new_from_slices(key, key)
        .expect("Invalid key length")
        .encrypt_padded_mut::<NoPadding>(&mut buffer[..aligned], aligned)
        .expect("Unaligned buffer");
}

/// A frame with the given compression type. Size extension bits are filled in as needed.
pub fn frame(compression_type: u16, body: &[u8], decompressed_size: u32) -> Vec<u8> {
    let size = body.len() as u32;
    let extension = ((size >> 16) & 0x0F) as u16;

    let mut out = decompressed_size.to_be_bytes().to_vec();
    out.extend((compression_type | (extension << 8)).to_le_bytes());
    out.extend((size as u16).to_be_bytes());
    out.extend(body);
    out
}

pub fn stored_frame(contents: &[u8]) -> Vec<u8> {
    frame(0x00, contents, contents.len() as u32)
}

pub fn zlib_frame(contents: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(vec![], Compression::default());
    encoder.write_all(contents).expect("Writing to a Vec can't fail");
    let compressed = encoder.finish().expect("Writing to a Vec can't fail");

    frame(0x02, &compressed, contents.len() as u32)
}

/// Typed tree value, anonymous when `name` is `None`
pub fn encode_db_value(name: Option<&str>, value: &DbValue) -> Vec<u8> {
    let mut out = vec![];

    let mut type_byte = value.db_type().code();
    if name.is_none() {
        type_byte |= ANONYMOUS_FLAG;
    }
    out.push(type_byte);
    if let Some(name) = name {
        out.extend(name.as_bytes());
        out.push(0);
    }

    match value {
        DbValue::List(items) => {
            let mut body: Vec<u8> = items.iter().flat_map(|v| encode_db_value(None, v)).collect();
            body.push(0);
            put_7bit(&mut out, body.len() as u64);
            out.extend(body);
        }
        DbValue::Object(object) => {
            let mut body: Vec<u8> = object
                .0
                .iter()
                .flat_map(|(n, v)| encode_db_value(Some(n), v))
                .collect();
            body.push(0);
            put_7bit(&mut out, body.len() as u64);
            out.extend(body);
        }
        DbValue::Boolean(b) => out.push(u8::from(*b)),
        DbValue::String(s) => {
            put_7bit(&mut out, s.len() as u64 + 1);
            out.extend(s.as_bytes());
            out.push(0);
        }
        DbValue::Int(i) => out.extend(i.to_le_bytes()),
        DbValue::Long(l) => out.extend(l.to_le_bytes()),
        DbValue::Float(f) => out.extend(f.to_le_bytes()),
        DbValue::Double(d) => out.extend(d.to_le_bytes()),
        DbValue::Guid(g) => out.extend(g.to_bytes_le()),
        DbValue::Sha1(s) => out.extend(s.0),
        DbValue::ByteArray(b) => {
            put_7bit(&mut out, b.len() as u64);
            out.extend(b.iter());
        }
    }

    out
}

#[derive(Debug, Clone)]
pub struct SyntheticEbx {
    pub name: String,
    pub original_size: u32,
    pub sha1: Sha1,
}

#[derive(Debug, Clone)]
pub struct SyntheticRes {
    pub name: String,
    pub original_size: u32,
    pub sha1: Sha1,
    pub res_type: u32,
    pub res_meta: [u8; 16],
    pub res_rid: i64,
}

#[derive(Debug, Clone)]
pub struct SyntheticChunk {
    pub id: Uuid,
    pub sha1: Sha1,
    pub logical_offset: u32,
    pub logical_size: u32,
}

/// Binary superbundle: header, entry table, then whatever `data` holds as the data block
#[derive(Debug, Clone)]
pub struct SyntheticBundle {
    pub endian: Endian,
    /// Magic before XORing
    pub magic: u32,
    pub ebx: Vec<SyntheticEbx>,
    pub res: Vec<SyntheticRes>,
    pub chunks: Vec<SyntheticChunk>,
    pub chunk_meta: Option<DbValue>,
    pub data: Vec<u8>,
    pub total_count_override: Option<u32>,
    pub encrypt_with: Option<[u8; 16]>,
}

impl SyntheticBundle {
    pub fn new(endian: Endian, magic: u32) -> Self {
        Self {
            endian,
            magic,
            ebx: vec![],
            res: vec![],
            chunks: vec![],
            chunk_meta: None,
            data: vec![],
            total_count_override: None,
            encrypt_with: None,
        }
    }

    pub fn ebx(&mut self, name: &str, original_size: u32, sha1: Sha1) -> &mut Self {
        self.ebx.push(SyntheticEbx {
            name: name.to_string(),
            original_size,
            sha1,
        });
        self
    }

    /// Payload offsets as stored on disk for something read at `position` in the payload
    fn raw_offset(position: usize) -> u32 {
        position as u32 + HEADER_SIZE - PAYLOAD_BASE as u32
    }

    pub fn encode(&self) -> Vec<u8> {
        let endian = self.endian;
        let mut payload = vec![];

        if MagicKind::classify(self.magic).contains_hashes() {
            let hashes = self
                .ebx
                .iter()
                .map(|e| e.sha1)
                .chain(self.res.iter().map(|r| r.sha1))
                .chain(self.chunks.iter().map(|c| c.sha1));
            for hash in hashes {
                payload.extend(hash.0);
            }
        }

        let mut strings = vec![];
        let mut name_offsets = vec![];
        for name in self.ebx.iter().map(|e| &e.name).chain(self.res.iter().map(|r| &r.name)) {
            name_offsets.push(strings.len() as u32);
            strings.extend(name.as_bytes());
            strings.push(0);
        }
        let mut name_offsets = name_offsets.into_iter();

        for entry in &self.ebx {
            put_u32(&mut payload, name_offsets.next().unwrap_or_default(), endian);
            put_u32(&mut payload, entry.original_size, endian);
        }
        for entry in &self.res {
            put_u32(&mut payload, name_offsets.next().unwrap_or_default(), endian);
            put_u32(&mut payload, entry.original_size, endian);
        }
        for entry in &self.res {
            put_u32(&mut payload, entry.res_type, endian);
        }
        for entry in &self.res {
            payload.extend(entry.res_meta);
        }
        for entry in &self.res {
            put_i64(&mut payload, entry.res_rid, endian);
        }
        for chunk in &self.chunks {
            match endian {
                Endian::Little => payload.extend(chunk.id.to_bytes_le()),
                Endian::Big => payload.extend(chunk.id.as_bytes()),
            }
            put_u32(&mut payload, chunk.logical_offset, endian);
            put_u32(&mut payload, chunk.logical_size, endian);
        }

        let strings_offset = Self::raw_offset(payload.len());
        payload.extend(strings);

        let (meta_offset, meta_size) = match &self.chunk_meta {
            Some(meta) => {
                let encoded = encode_db_value(None, meta);
                // 4 bytes of block header, skipped by the decoder
                payload.extend([0; 4]);
                let offset = Self::raw_offset(payload.len());
                payload.extend(&encoded);
                (offset, encoded.len() as u32)
            }
            None => (HEADER_SIZE, 0),
        };

        if let Some(key) = &self.encrypt_with {
            encrypt_in_place(&mut payload, key);
        }

        let entry_count = (self.ebx.len() + self.res.len() + self.chunks.len()) as u32;
        let data_start = HEADER_SIZE as usize + payload.len();

        let mut out = ((data_start - PAYLOAD_BASE) as u32).to_be_bytes().to_vec();
        put_u32(&mut out, self.magic ^ XOR_MAGIC, endian);
        put_u32(&mut out, self.total_count_override.unwrap_or(entry_count), endian);
        put_u32(&mut out, self.ebx.len() as u32, endian);
        put_u32(&mut out, self.res.len() as u32, endian);
        put_u32(&mut out, self.chunks.len() as u32, endian);
        put_u32(&mut out, strings_offset, endian);
        put_u32(&mut out, meta_offset, endian);
        put_u32(&mut out, meta_size, endian);
        out.extend(payload);
        out.extend(&self.data);

        out
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticTocBundle {
    pub unknown: i32,
    /// Written as-is, flag nibble included
    pub size: u32,
    /// Flag byte and sub-entry. Storage fields of non-explicit entries aren't written.
    pub entries: Vec<(u8, BundleSubEntry)>,
}

/// TOC with every offset measured from the start of the buffer. The decoder reads one GUID
/// record per chunk, so `chunk_guids` and `chunks` must be the same length.
#[derive(Debug, Clone, Default)]
pub struct SyntheticToc {
    pub bundles: Vec<SyntheticTocBundle>,
    pub chunk_guids: Vec<ChunkGuidEntry>,
    pub chunks: Vec<RawChunkEntry>,
}

impl SyntheticToc {
    pub fn encode(&self) -> Vec<u8> {
        const HEADER: usize = 28;
        const BLOCK_HEADER: usize = 20;
        let be = Endian::Big;
        assert_eq!(
            self.chunk_guids.len(),
            self.chunks.len(),
            "One GUID record per chunk"
        );

        let references_offset = HEADER;
        let descriptors_offset = references_offset + 4 * self.bundles.len();
        let mut blocks_offset = descriptors_offset + 16 * self.bundles.len();

        let mut descriptors = vec![];
        let mut blocks = vec![];
        for bundle in &self.bundles {
            let count = bundle.entries.len();

            descriptors.extend(bundle.unknown.to_be_bytes());
            put_u32(&mut descriptors, bundle.size, be);
            descriptors.extend((blocks_offset as i64).to_be_bytes());

            let mut block = vec![0; 8];
            put_u32(&mut block, BLOCK_HEADER as u32, be);
            put_u32(&mut block, count as u32, be);
            put_u32(&mut block, (BLOCK_HEADER + count) as u32, be);
            block.extend(bundle.entries.iter().map(|(flag, _)| *flag));
            for (flag, entry) in &bundle.entries {
                if *flag == 1 {
                    block.extend([entry.unknown, u8::from(entry.is_patch), entry.catalog, entry.cas]);
                }
                put_u32(&mut block, entry.cas_offset, be);
                put_u32(&mut block, entry.size, be);
            }

            blocks_offset += block.len();
            blocks.extend(block);
        }

        let chunk_flags_offset = blocks_offset;
        let chunk_guids_offset = chunk_flags_offset + self.chunks.len();
        let chunk_entries_offset = chunk_guids_offset + 20 * self.chunk_guids.len();

        let mut out = vec![];
        for value in [
            references_offset,
            descriptors_offset,
            self.bundles.len(),
            chunk_flags_offset,
            chunk_guids_offset,
            self.chunks.len(),
            chunk_entries_offset,
        ] {
            put_u32(&mut out, value as u32, be);
        }
        for i in 0..self.bundles.len() {
            put_u32(&mut out, i as u32, be);
        }
        out.extend(descriptors);
        out.extend(blocks);
        out.extend(vec![0; self.chunks.len()]);
        for entry in &self.chunk_guids {
            let mut guid = entry.guid.to_bytes_le();
            guid.reverse();
            out.extend(guid);
            put_u32(&mut out, (u32::from(entry.flag) << 24) | entry.index_raw, be);
        }
        for chunk in &self.chunks {
            out.extend([chunk.unknown, u8::from(chunk.is_patch), chunk.catalog, chunk.cas]);
            put_u32(&mut out, chunk.chunk_offset, be);
            put_u32(&mut out, chunk.chunk_size, be);
        }

        out
    }
}
