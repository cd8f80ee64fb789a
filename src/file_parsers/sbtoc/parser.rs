use bytes::Bytes;
use tracing::debug;

use super::types::*;
use crate::{
    cursor::{ByteCursor, Endian},
    error::DecodeError,
};

const ENDIAN: Endian = Endian::Big;
const DESCRIPTOR_SIZE: usize = 16;
const CHUNK_GUID_SIZE: usize = 20;
const RAW_CHUNK_SIZE: usize = 12;
/// The sub-entry table pointers sit after 8 unknown bytes of the bundle block
const BUNDLE_BLOCK_SKIP: i64 = 8;
const EXPLICIT_ENTRY: u8 = 1;

/// Storage identity shared by runs of sub-entries. Only sub-entries flagged as explicit carry
/// their own copy, the rest inherit the last one seen in the same bundle.
#[derive(Debug, Clone, Copy, Default)]
struct CarryForward {
    unknown: u8,
    is_patch: bool,
    catalog: u8,
    cas: u8,
}

impl CarryForward {
    fn read(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        Ok(Self {
            unknown: reader.read_u8()?,
            is_patch: reader.read_bool()?,
            catalog: reader.read_u8()?,
            cas: reader.read_u8()?,
        })
    }
}

pub struct SbTocReader {
    reader: ByteCursor,
}

impl SbTocReader {
    pub fn new(data: Bytes) -> Self {
        Self {
            reader: ByteCursor::new(data),
        }
    }

    pub fn read(mut self, format: TocFormat) -> Result<SbToc, DecodeError> {
        let header = self.header()?;
        debug!(?header, "Read TOC header");

        let bundle_references = self.bundle_references(&header)?;
        let bundles = self.bundles(&header)?;

        let (chunk_guids, chunks) = match format {
            TocFormat::WithChunks => self.chunks(&header)?,
            TocFormat::BundlesOnly => (vec![], vec![]),
        };

        Ok(SbToc {
            header,
            bundle_references,
            bundles,
            chunk_guids,
            chunks,
        })
    }

    fn header(&mut self) -> Result<SbTocHeader, DecodeError> {
        let data_start_offset = self.reader.position();

        Ok(SbTocHeader {
            data_start_offset,
            bundle_references_offset: self.reader.read_i32(ENDIAN)?,
            bundles_offset: self.reader.read_i32(ENDIAN)?,
            bundles_count: self.reader.read_i32(ENDIAN)?,
            chunks_flag_offset: self.reader.read_i32(ENDIAN)?,
            chunks_guid_offset: self.reader.read_i32(ENDIAN)?,
            chunks_count: self.reader.read_i32(ENDIAN)?,
            chunks_entry_offset: self.reader.read_i32(ENDIAN)?,
        })
    }

    /// Seek relative to the start of the TOC data
    fn seek(&mut self, header: &SbTocHeader, relative: i64) -> Result<(), DecodeError> {
        let position = usize::try_from(relative)
            .ok()
            .and_then(|r| r.checked_add(header.data_start_offset))
            .ok_or_else(|| {
                DecodeError::MalformedHeader(format!("Offset {relative:#x} is out of bounds"))
            })?;

        self.reader.set_position(position);
        Ok(())
    }

    fn count(value: i32, what: &str) -> Result<usize, DecodeError> {
        usize::try_from(value)
            .map_err(|_| DecodeError::MalformedHeader(format!("Negative {what} count: {value}")))
    }

    fn bundle_references(&mut self, header: &SbTocHeader) -> Result<Vec<u32>, DecodeError> {
        let count = Self::count(header.bundles_count, "bundle")?;
        self.seek(header, header.bundle_references_offset.into())?;

        let mut references = Vec::with_capacity(self.reader.capacity_for(count, 4));
        for _ in 0..count {
            references.push(self.reader.read_u32(ENDIAN)?);
        }

        Ok(references)
    }

    fn bundles(&mut self, header: &SbTocHeader) -> Result<Vec<BundleDescriptor>, DecodeError> {
        let count = Self::count(header.bundles_count, "bundle")?;
        self.seek(header, header.bundles_offset.into())?;

        let mut bundles = Vec::with_capacity(self.reader.capacity_for(count, DESCRIPTOR_SIZE));
        for _ in 0..count {
            bundles.push(BundleDescriptor {
                unknown: self.reader.read_i32(ENDIAN)?,
                size: self.reader.read_i32(ENDIAN)? & 0x0FFF_FFFF,
                offset: self.reader.read_i64(ENDIAN)?,
                entries: vec![],
            });
        }

        for bundle in bundles.iter_mut() {
            bundle.entries = self.sub_entries(header, bundle.offset)?;
        }

        Ok(bundles)
    }

    /// Flag table and sub-entry table of one bundle block. Carry-forward state starts fresh
    /// for every bundle.
    fn sub_entries(
        &mut self,
        header: &SbTocHeader,
        bundle_offset: i64,
    ) -> Result<Vec<BundleSubEntry>, DecodeError> {
        self.seek(header, block_offset(bundle_offset, BUNDLE_BLOCK_SKIP)?)?;
        let flags_offset = self.reader.read_i32(ENDIAN)?;
        let entries_count = Self::count(self.reader.read_i32(ENDIAN)?, "sub-entry")?;
        let entries_offset = self.reader.read_i32(ENDIAN)?;

        self.seek(header, block_offset(bundle_offset, flags_offset.into())?)?;
        let flags = self.reader.read_bytes(entries_count)?;

        self.seek(header, block_offset(bundle_offset, entries_offset.into())?)?;
        let mut last = CarryForward::default();
        let mut entries = Vec::with_capacity(entries_count);

        for &flag in flags.iter() {
            if flag == EXPLICIT_ENTRY {
                last = CarryForward::read(&mut self.reader)?;
            }

            entries.push(BundleSubEntry {
                unknown: last.unknown,
                is_patch: last.is_patch,
                catalog: last.catalog,
                cas: last.cas,
                cas_offset: self.reader.read_u32(ENDIAN)?,
                size: self.reader.read_u32(ENDIAN)?,
            });
        }

        Ok(entries)
    }

    fn chunks(
        &mut self,
        header: &SbTocHeader,
    ) -> Result<(Vec<ChunkGuidEntry>, Vec<RawChunkEntry>), DecodeError> {
        let count = Self::count(header.chunks_count, "chunk")?;

        self.seek(header, header.chunks_guid_offset.into())?;
        let mut guids = Vec::with_capacity(self.reader.capacity_for(count, CHUNK_GUID_SIZE));
        for _ in 0..count {
            let guid = self.reader.read_guid_reversed()?;
            let flags = self.reader.read_u32(ENDIAN)?;

            guids.push(ChunkGuidEntry {
                guid,
                flag: (flags >> 24) as u8,
                index_raw: flags & 0x00FF_FFFF,
            });
        }

        self.seek(header, header.chunks_entry_offset.into())?;
        let mut chunks = Vec::with_capacity(self.reader.capacity_for(count, RAW_CHUNK_SIZE));
        for _ in 0..count {
            chunks.push(RawChunkEntry {
                unknown: self.reader.read_u8()?,
                is_patch: self.reader.read_bool()?,
                catalog: self.reader.read_u8()?,
                cas: self.reader.read_u8()?,
                chunk_offset: self.reader.read_u32(ENDIAN)?,
                chunk_size: self.reader.read_u32(ENDIAN)?,
                guid: Default::default(),
            });
        }

        apply_chunk_guids(&guids, &mut chunks)?;

        Ok((guids, chunks))
    }
}

fn block_offset(bundle_offset: i64, relative: i64) -> Result<i64, DecodeError> {
    bundle_offset.checked_add(relative).ok_or_else(|| {
        DecodeError::MalformedHeader(format!(
            "Bundle offset {bundle_offset:#x} + {relative:#x} overflows"
        ))
    })
}

/// Give every raw chunk entry the GUID that points at it
pub fn apply_chunk_guids(
    guids: &[ChunkGuidEntry],
    chunks: &mut [RawChunkEntry],
) -> Result<(), DecodeError> {
    let len = chunks.len();
    for entry in guids {
        let index = entry.index();
        let chunk = chunks
            .get_mut(index)
            .ok_or(DecodeError::IndexOutOfRange { index, len })?;
        chunk.guid = entry.guid;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use uuid::Uuid;

    use super::{apply_chunk_guids, SbTocReader};
    use crate::{
        error::DecodeError,
        file_parsers::sbtoc::types::*,
        synthetic::{SyntheticToc, SyntheticTocBundle},
    };

    fn sub_entry(catalog: u8, cas: u8, is_patch: bool, cas_offset: u32) -> BundleSubEntry {
        BundleSubEntry {
            unknown: 0x10 + catalog,
            is_patch,
            catalog,
            cas,
            cas_offset,
            size: 0x100,
        }
    }

    fn decode(toc: &SyntheticToc, format: TocFormat) -> Result<SbToc, DecodeError> {
        SbTocReader::new(Bytes::from(toc.encode())).read(format)
    }

    #[test]
    fn test_carry_forward_within_bundle() {
        let explicit = sub_entry(2, 7, true, 0);
        let mut toc = SyntheticToc::default();
        toc.bundles.push(SyntheticTocBundle {
            unknown: 5,
            size: 0x4000_0123,
            entries: vec![
                (1, explicit),
                // Storage fields here are ignored by the encoder and inherited on decode
                (0, sub_entry(9, 9, false, 0x40)),
                (0, sub_entry(9, 9, false, 0x80)),
            ],
        });

        let decoded = decode(&toc, TocFormat::WithChunks).unwrap();
        let bundle = &decoded.bundles[0];

        assert_eq!(bundle.unknown, 5);
        assert_eq!(bundle.size, 0x123);
        assert_eq!(bundle.entries.len(), 3);
        for (entry, offset) in bundle.entries.iter().zip([0, 0x40, 0x80]) {
            assert_eq!(entry.catalog, 2);
            assert_eq!(entry.cas, 7);
            assert!(entry.is_patch);
            assert_eq!(entry.unknown, explicit.unknown);
            assert_eq!(entry.cas_offset, offset);
            assert_eq!(entry.size, 0x100);
        }
        assert_eq!(bundle.bundle_location(), Some(&bundle.entries[0]));
        assert_eq!(bundle.object_locations().len(), 2);
    }

    #[test]
    fn test_carry_forward_resets_between_bundles() {
        let mut toc = SyntheticToc::default();
        toc.bundles.push(SyntheticTocBundle {
            unknown: 0,
            size: 0x10,
            entries: vec![(1, sub_entry(3, 4, true, 0))],
        });
        toc.bundles.push(SyntheticTocBundle {
            unknown: 0,
            size: 0x10,
            entries: vec![(0, sub_entry(3, 4, true, 0x20)), (1, sub_entry(6, 1, false, 0x30))],
        });

        let decoded = decode(&toc, TocFormat::WithChunks).unwrap();
        let second = &decoded.bundles[1].entries;

        // Nothing explicit yet in this bundle, so nothing to inherit from the first one
        assert_eq!(second[0].catalog, 0);
        assert_eq!(second[0].cas, 0);
        assert!(!second[0].is_patch);
        assert_eq!(second[0].cas_offset, 0x20);
        assert_eq!(second[1].catalog, 6);
        assert_eq!(second[1].cas, 1);
        assert_eq!(decoded.bundle_references, vec![0, 1]);
    }

    #[test]
    fn test_chunk_guid_relation() {
        let first = Uuid::from_u128(0xAAAA_0000_0000_0000_0000_0000_0000_0001);
        let second = Uuid::from_u128(0xBBBB_0000_0000_0000_0000_0000_0000_0002);
        let third = Uuid::from_u128(0xCCCC_0000_0000_0000_0000_0000_0000_0003);
        let fourth = Uuid::from_u128(0xDDDD_0000_0000_0000_0000_0000_0000_0004);

        let mut toc = SyntheticToc::default();
        toc.chunks = (0..4)
            .map(|i| RawChunkEntry {
                unknown: 0,
                is_patch: i % 2 == 1,
                catalog: 1,
                cas: i,
                chunk_offset: 0x1000 * u32::from(i),
                chunk_size: 0x200,
                guid: Uuid::nil(),
            })
            .collect();
        toc.chunk_guids = vec![
            ChunkGuidEntry {
                guid: first,
                flag: 0x7F,
                index_raw: 9,
            },
            ChunkGuidEntry {
                guid: second,
                flag: 0,
                index_raw: 2,
            },
            ChunkGuidEntry {
                guid: third,
                flag: 1,
                index_raw: 3,
            },
            ChunkGuidEntry {
                guid: fourth,
                flag: 0,
                index_raw: 7,
            },
        ];

        let decoded = decode(&toc, TocFormat::WithChunks).unwrap();

        assert_eq!(decoded.chunk_guids.len(), 4);
        assert_eq!(decoded.chunk_guids[0].flag, 0x7F);
        assert_eq!(decoded.chunk_guids[0].index(), 3);
        assert_eq!(decoded.chunk_guids[3].index(), 2);
        assert_eq!(decoded.chunks[3].guid, first);
        assert_eq!(decoded.chunks[0].guid, second);
        assert_eq!(decoded.chunks[1].guid, third);
        assert_eq!(decoded.chunks[2].guid, fourth);
        assert_eq!(decoded.chunks[3].chunk_offset, 0x3000);
        assert!(decoded.chunks[3].is_patch);
        assert!(!decoded.chunks[2].is_patch);
    }

    #[test]
    fn test_chunk_index_out_of_range() {
        let mut toc = SyntheticToc::default();
        toc.chunks = vec![RawChunkEntry::default(); 3];
        toc.chunk_guids = vec![ChunkGuidEntry {
            guid: Uuid::from_u128(1),
            flag: 0,
            index_raw: 9,
        }; 3];

        assert!(matches!(
            decode(&toc, TocFormat::WithChunks),
            Err(DecodeError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_bundles_only_skips_chunks() {
        let mut toc = SyntheticToc::default();
        toc.bundles.push(SyntheticTocBundle {
            unknown: 0,
            size: 0x10,
            entries: vec![(1, sub_entry(1, 1, false, 0))],
        });
        toc.chunks = vec![RawChunkEntry::default(); 1];
        toc.chunk_guids = vec![ChunkGuidEntry {
            guid: Uuid::from_u128(1),
            flag: 0,
            index_raw: 300,
        }];

        let decoded = decode(&toc, TocFormat::BundlesOnly).unwrap();
        assert_eq!(decoded.bundles.len(), 1);
        assert!(decoded.chunks.is_empty());
        assert!(decoded.chunk_guids.is_empty());
    }

    #[test]
    fn test_apply_guids_directly() {
        let mut chunks = vec![RawChunkEntry::default(); 2];
        let guids = [ChunkGuidEntry {
            guid: Uuid::from_u128(5),
            flag: 0,
            index_raw: 5,
        }];

        apply_chunk_guids(&guids, &mut chunks).unwrap();
        assert_eq!(chunks[1].guid, Uuid::from_u128(5));
    }

    #[test]
    fn test_bundle_offset_overflow() {
        let mut toc = SyntheticToc::default();
        toc.bundles.push(SyntheticTocBundle {
            unknown: 0,
            size: 0x10,
            entries: vec![(1, sub_entry(1, 1, false, 0))],
        });
        let mut bytes = toc.encode();
        // Single descriptor sits right after the header and its reference
        let offset_at = 28 + 4 + 8;
        bytes[offset_at..offset_at + 8].copy_from_slice(&i64::MAX.to_be_bytes());

        assert!(matches!(
            SbTocReader::new(Bytes::from(bytes)).read(TocFormat::WithChunks),
            Err(DecodeError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_truncated_toc() {
        let mut toc = SyntheticToc::default();
        toc.bundles.push(SyntheticTocBundle {
            unknown: 0,
            size: 0x10,
            entries: vec![(1, sub_entry(1, 1, false, 0))],
        });
        let mut bytes = toc.encode();
        bytes.truncate(bytes.len() - 30);

        assert!(SbTocReader::new(Bytes::from(bytes))
            .read(TocFormat::WithChunks)
            .is_err());
    }
}
