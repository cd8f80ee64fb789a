use bytes::Bytes;
use tracing::debug;

use super::{decrypt::open_payload, types::*};
use crate::{
    cursor::{latin1, ByteCursor, Endian},
    error::DecodeError,
    file_parsers::{db_object::read_db_object, frames::measure_compressed_stream, shared::Sha1},
    hasher::hash_name,
    keys::KeyStore,
};

const SHA1_SIZE: usize = 20;
const NAMED_RECORD_SIZE: usize = 8;
const RES_META_SIZE: usize = 16;
const CHUNK_RECORD_SIZE: usize = 24;

/// Decoder for one bundle. The data offset and frame fields have a fixed byte order, everything
/// else in the header and entry table uses `endian`.
pub struct BinarySbReader<'k> {
    endian: Endian,
    keys: &'k dyn KeyStore,
}

impl<'k> BinarySbReader<'k> {
    pub fn new(endian: Endian, keys: &'k dyn KeyStore) -> Self {
        Self { endian, keys }
    }

    pub fn read(&self, data: Bytes, options: &DecodeOptions) -> Result<BinarySb, DecodeError> {
        let mut reader = ByteCursor::new(data);

        let data_offset = reader.read_u32(Endian::Big)? as usize + PAYLOAD_BASE;
        let magic = reader.read_u32(self.endian)? ^ XOR_MAGIC;
        let kind = MagicKind::classify(magic);

        let header = self.header(&mut reader, kind)?;
        debug!(?kind, ?header, "Read entry table header");

        let payload = match options.extent {
            PayloadExtent::UntilDataOffset => {
                let len = data_offset.checked_sub(reader.position()).ok_or_else(|| {
                    DecodeError::MalformedHeader(format!(
                        "Data offset {:#x} points inside the header",
                        data_offset
                    ))
                })?;
                reader.read_bytes(len)?
            }
            PayloadExtent::ToEnd => reader.read_to_end(),
        };
        let payload = open_payload(payload, kind, self.keys)?;

        let mut payload_reader = ByteCursor::new(payload);
        let bucket = hash_bucket(&mut payload_reader, &header, kind)?;
        let mut ebx = self.ebx(&mut payload_reader, &header, &bucket)?;
        let mut res = self.res(&mut payload_reader, &header, &bucket)?;
        let mut chunks = self.chunks(&mut payload_reader, &header, &bucket)?;

        let chunk_meta = if header.chunk_count > 0 {
            payload_reader.set_position(header.meta_offset as usize + PAYLOAD_BASE);
            read_db_object(&mut payload_reader)?
        } else {
            None
        };

        // Both of these mean there's no data block to walk
        reader.set_position(data_offset);
        if !reader.is_eof() && kind != MagicKind::HeaderOnly {
            locate_payloads(&mut reader, &mut ebx, options)?;
            locate_payloads(&mut reader, &mut res, options)?;
            locate_payloads(&mut reader, &mut chunks, options)?;
        }

        Ok(BinarySb {
            header,
            magic,
            ebx,
            res,
            chunks,
            data_offset: (data_offset - PAYLOAD_BASE) as u32,
            chunk_meta,
        })
    }

    fn header(
        &self,
        reader: &mut ByteCursor,
        kind: MagicKind,
    ) -> Result<EntryTableHeader, DecodeError> {
        let total_count = reader.read_u32(self.endian)?;
        let ebx_count = reader.read_u32(self.endian)?;
        let res_count = reader.read_u32(self.endian)?;
        let chunk_count = reader.read_u32(self.endian)?;
        let strings_offset = past_header(reader.read_u32(self.endian)?, "String table")?;
        let meta_offset = past_header(reader.read_u32(self.endian)?, "Chunk metadata")?;
        let meta_size = reader.read_u32(self.endian)?;

        let header = EntryTableHeader {
            total_count,
            ebx_count,
            res_count,
            chunk_count,
            strings_offset,
            meta_offset,
            meta_size,
        };

        // Bucket positions are only meaningful when the counts line up
        if kind.contains_hashes() && u64::from(total_count) != header.entry_count() {
            return Err(DecodeError::MalformedHeader(format!(
                "Total count {} doesn't match {} ebx + {} res + {} chunks",
                total_count, ebx_count, res_count, chunk_count
            )));
        }

        Ok(header)
    }

    /// Jump to the string table for an entry's name, then come back. The hash covers the raw
    /// name bytes.
    fn name(
        &self,
        reader: &mut ByteCursor,
        header: &EntryTableHeader,
        name_offset: u32,
    ) -> Result<(String, u32), DecodeError> {
        let resume = reader.position();
        reader.set_position(PAYLOAD_BASE + header.strings_offset as usize + name_offset as usize);
        let raw = reader.read_null_terminated_bytes()?;
        reader.set_position(resume);

        Ok((latin1(&raw), hash_name(&raw)))
    }

    fn ebx(
        &self,
        reader: &mut ByteCursor,
        header: &EntryTableHeader,
        bucket: &HashBucket,
    ) -> Result<Vec<EbxEntry>, DecodeError> {
        let range = header.asset_range();
        let mut entries = Vec::with_capacity(reader.capacity_for(range.len(), NAMED_RECORD_SIZE));

        for i in range {
            let name_offset = reader.read_u32(self.endian)?;
            let original_size = reader.read_u32(self.endian)?;
            let (name, name_hash) = self.name(reader, header, name_offset)?;

            entries.push(EbxEntry {
                sha1: bucket.get(i),
                name_hash,
                name,
                original_size,
                location: None,
            });
        }

        Ok(entries)
    }

    fn res(
        &self,
        reader: &mut ByteCursor,
        header: &EntryTableHeader,
        bucket: &HashBucket,
    ) -> Result<Vec<ResEntry>, DecodeError> {
        let range = header.resource_range();
        let mut entries = Vec::with_capacity(reader.capacity_for(range.len(), NAMED_RECORD_SIZE));

        for i in range {
            let name_offset = reader.read_u32(self.endian)?;
            let original_size = reader.read_u32(self.endian)?;
            let (name, name_hash) = self.name(reader, header, name_offset)?;

            entries.push(ResEntry {
                sha1: bucket.get(i),
                name_hash,
                name,
                original_size,
                res_type: 0,
                res_meta: [0; RES_META_SIZE],
                res_rid: 0,
                location: None,
            });
        }

        // The remaining fields are stored column by column
        for entry in entries.iter_mut() {
            entry.res_type = reader.read_u32(self.endian)?;
        }
        for entry in entries.iter_mut() {
            entry.res_meta = reader.read_array()?;
        }
        for entry in entries.iter_mut() {
            entry.res_rid = reader.read_i64(self.endian)?;
        }

        Ok(entries)
    }

    fn chunks(
        &self,
        reader: &mut ByteCursor,
        header: &EntryTableHeader,
        bucket: &HashBucket,
    ) -> Result<Vec<ChunkEntry>, DecodeError> {
        let range = header.chunk_range();
        let mut entries = Vec::with_capacity(reader.capacity_for(range.len(), CHUNK_RECORD_SIZE));

        for i in range {
            let id = reader.read_guid(self.endian)?;
            let logical_offset = reader.read_u32(self.endian)?;
            let logical_size = reader.read_u32(self.endian)?;

            entries.push(ChunkEntry {
                id,
                sha1: bucket.get(i),
                logical_offset,
                logical_size,
                original_size: u64::from((logical_offset & 0xFFFF) | logical_size),
                location: None,
            });
        }

        Ok(entries)
    }
}

fn past_header(offset: u32, what: &str) -> Result<u32, DecodeError> {
    offset.checked_sub(HEADER_SIZE).ok_or_else(|| {
        DecodeError::MalformedHeader(format!(
            "{what} offset {offset:#x} is inside the {HEADER_SIZE:#x} byte header"
        ))
    })
}

fn hash_bucket(
    reader: &mut ByteCursor,
    header: &EntryTableHeader,
    kind: MagicKind,
) -> Result<HashBucket, DecodeError> {
    if !kind.contains_hashes() {
        return Ok(HashBucket::Absent);
    }

    let count = header.total_count as usize;
    let mut hashes: Vec<Sha1> = Vec::with_capacity(reader.capacity_for(count, SHA1_SIZE));
    for _ in 0..count {
        hashes.push(reader.read_sha1()?);
    }

    Ok(HashBucket::Present(hashes))
}

/// Walk the data block from the reader's position, giving each entry its offset and on-disk
/// size. Every entry is marked as coming from the superbundle.
pub fn locate_payloads<E: PayloadEntry>(
    reader: &mut ByteCursor,
    entries: &mut [E],
    options: &DecodeOptions,
) -> Result<(), DecodeError> {
    for entry in entries.iter_mut() {
        let start = reader.position() as u64;
        let original_size = entry.original_size();

        let (size, data) = if options.uncompressed {
            let data = reader.read_bytes(original_size as usize)?;
            (original_size, Some(data))
        } else {
            let size = measure_compressed_stream(reader, original_size as i64)?;
            (size, None)
        };

        entry.set_location(PayloadLocation {
            offset: options.base_offset + start,
            size,
            data,
            from_superbundle: true,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use uuid::Uuid;

    use super::BinarySbReader;
    use crate::{
        cursor::Endian,
        error::DecodeError,
        file_parsers::{
            binary_sb::types::*,
            db_object::{DbObject, DbValue},
            shared::Sha1,
        },
        hasher::hash_name,
        keys::StaticKeyStore,
        synthetic::{stored_frame, zlib_frame, SyntheticBundle, SyntheticChunk, SyntheticRes},
    };

    fn decode_with(
        endian: Endian,
        bytes: Vec<u8>,
        options: DecodeOptions,
    ) -> Result<BinarySb, DecodeError> {
        let keys = StaticKeyStore::new();
        BinarySbReader::new(endian, &keys).read(Bytes::from(bytes), &options)
    }

    fn decode(bytes: Vec<u8>, options: DecodeOptions) -> Result<BinarySb, DecodeError> {
        decode_with(Endian::Little, bytes, options)
    }

    fn uncompressed(base_offset: u64) -> DecodeOptions {
        DecodeOptions {
            uncompressed: true,
            base_offset,
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_bundle() {
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_PLAIN);
        bundle.ebx("a", 4, Sha1::ZERO);
        bundle.data = b"abcd".to_vec();

        let sb = decode(bundle.encode(), uncompressed(0x1000)).unwrap();

        assert_eq!(sb.ebx.len(), 1);
        assert!(sb.res.is_empty() && sb.chunks.is_empty());

        let entry = &sb.ebx[0];
        assert_eq!(entry.name, "a");
        assert_eq!(entry.name_hash, hash_name(b"a"));
        assert_eq!(entry.original_size, 4);

        let location = entry.location.as_ref().unwrap();
        assert_eq!(location.offset, 0x1000 + u64::from(sb.data_offset) + 4);
        assert_eq!(location.size, 4);
        assert_eq!(location.data.as_deref(), Some(b"abcd".as_slice()));
        assert!(location.from_superbundle);
    }

    #[test]
    fn test_minimal_bundle_tree() {
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_PLAIN);
        bundle.ebx("a", 4, Sha1::ZERO);
        bundle.data = b"abcd".to_vec();

        let sb = decode(bundle.encode(), uncompressed(0)).unwrap();
        let tree = serde_json::to_value(&sb).unwrap();

        assert_eq!(tree["ebx"].as_array().unwrap().len(), 1);
        assert_eq!(tree["ebx"][0]["name"], "a");
        assert_eq!(tree["ebx"][0]["nameHash"], hash_name(b"a"));
        assert_eq!(tree["ebx"][0]["sb"], true);
        assert_eq!(tree["res"].as_array().unwrap().len(), 0);
        assert_eq!(tree["dataOffset"], sb.data_offset);
        assert!(tree.get("chunkMeta").is_none());
    }

    #[test]
    fn test_round_trip_all_lists() {
        let hash = |b: u8| Sha1([b; 20]);
        let guid = Uuid::from_u128(0x1234_5678_9abc_def0_0fed_cba9_8765_4321);

        let mut bundle = SyntheticBundle::new(Endian::Big, 0x1234_5678);
        bundle.ebx("ui/menu", 5, hash(1));
        bundle.ebx("ui/hud", 3, hash(2));
        bundle.res.push(SyntheticRes {
            name: "textures/rock".into(),
            original_size: 6,
            sha1: hash(3),
            res_type: 0x5C4954A6,
            res_meta: [9; 16],
            res_rid: -42,
        });
        bundle.res.push(SyntheticRes {
            name: "textures/sand".into(),
            original_size: 2,
            sha1: hash(4),
            res_type: 0x6BDE20BA,
            res_meta: [8; 16],
            res_rid: 77,
        });
        bundle.chunks.push(SyntheticChunk {
            id: guid,
            sha1: hash(5),
            logical_offset: 0x0003_0001,
            logical_size: 0x0000_0010,
        });
        bundle.chunk_meta = Some(DbValue::List(vec![DbValue::Object(DbObject(vec![(
            "h32".into(),
            DbValue::Int(99),
        )]))]));

        let mut data = stored_frame(b"hello");
        data.extend(zlib_frame(b"abc"));
        data.extend(stored_frame(b"rock!!"));
        data.extend(zlib_frame(b"sa"));
        data.extend(stored_frame(&[0xAA; 0x11]));
        bundle.data = data;

        let sb = decode_with(Endian::Big, bundle.encode(), DecodeOptions::default()).unwrap();

        assert_eq!(sb.header.total_count, 5);
        assert_eq!(sb.header.chunk_count, 1);
        let names: Vec<_> = sb.ebx.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["ui/menu", "ui/hud"]);
        assert_eq!(sb.ebx[1].sha1, hash(2));
        assert_eq!(sb.ebx[1].original_size, 3);

        assert_eq!(sb.res[0].sha1, hash(3));
        assert_eq!(sb.res[0].res_type, 0x5C4954A6);
        assert_eq!(sb.res[1].res_meta, [8; 16]);
        assert_eq!(sb.res[0].res_rid, -42);
        assert_eq!(sb.res[1].res_rid, 77);
        assert_eq!(sb.res[1].name_hash, hash_name(b"textures/sand"));

        let chunk = &sb.chunks[0];
        assert_eq!(chunk.id, guid);
        assert_eq!(chunk.sha1, hash(5));
        assert_eq!(chunk.original_size, 0x11);

        // Frame boundaries follow each other with no gaps
        let locations: Vec<_> = sb
            .ebx
            .iter()
            .map(|e| e.location.clone())
            .chain(sb.res.iter().map(|e| e.location.clone()))
            .chain(sb.chunks.iter().map(|e| e.location.clone()))
            .map(|l| l.unwrap())
            .collect();
        let start = u64::from(sb.data_offset) + 4;
        assert_eq!(locations[0].offset, start);
        assert_eq!(locations[0].size, 5 + 8);
        for pair in locations.windows(2) {
            assert_eq!(pair[0].offset + pair[0].size, pair[1].offset);
        }
        assert!(locations.iter().all(|l| l.from_superbundle && l.data.is_none()));

        let meta = sb.chunk_meta.as_ref().unwrap().as_list().unwrap();
        assert_eq!(
            meta[0].as_object().unwrap().get("h32"),
            Some(&DbValue::Int(99))
        );
    }

    #[test]
    fn test_name_bytes_survive() {
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_PLAIN);
        bundle.ebx("placeholder", 4, Sha1::ZERO);
        bundle.data = b"abcd".to_vec();
        let mut bytes = bundle.encode();

        // Swap the name for one that isn't valid UTF-8
        let at = bytes
            .windows(11)
            .position(|w| w == b"placeholder")
            .unwrap();
        bytes[at..at + 5].copy_from_slice(b"caf\xe9\0");

        let sb = decode(bytes, uncompressed(0)).unwrap();
        assert_eq!(sb.ebx[0].name, "caf\u{e9}");
        assert_eq!(sb.ebx[0].name_hash, hash_name(b"caf\xe9"));
        assert_eq!(sb.ebx[0].name_hash, 2087763752);
    }

    #[test]
    fn test_count_mismatch() {
        let mut bundle = SyntheticBundle::new(Endian::Little, 0x1111_1111);
        bundle.ebx("a", 4, Sha1::ZERO);
        bundle.total_count_override = Some(2);

        assert!(matches!(
            decode(bundle.encode(), uncompressed(0)),
            Err(DecodeError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_count_mismatch_allowed_without_hashes() {
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_PLAIN);
        bundle.ebx("a", 4, Sha1::ZERO);
        bundle.total_count_override = Some(7);
        bundle.data = vec![0; 4];

        let sb = decode(bundle.encode(), uncompressed(0)).unwrap();
        assert_eq!(sb.ebx[0].sha1, Sha1::ZERO);
    }

    #[test]
    fn test_header_only() {
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_HEADER_ONLY);
        bundle.ebx("a", 4, Sha1([1; 20]));
        // Junk that would fail to parse as frames
        bundle.data = vec![0xFF; 3];

        let sb = decode(bundle.encode(), DecodeOptions::default()).unwrap();
        assert_eq!(sb.kind(), MagicKind::HeaderOnly);
        assert_eq!(sb.ebx[0].sha1, Sha1([1; 20]));
        assert!(sb.ebx[0].location.is_none());
    }

    #[test]
    fn test_no_data_block() {
        let mut bundle = SyntheticBundle::new(Endian::Little, 0x4242_4242);
        bundle.ebx("a", 4, Sha1([1; 20]));

        let sb = decode(bundle.encode(), DecodeOptions::default()).unwrap();
        assert!(sb.ebx[0].location.is_none());
    }

    #[test]
    fn test_encrypted_bundle() {
        let key = *b"fedcba9876543210";
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_ENCRYPTED);
        bundle.ebx("encrypted/asset", 2, Sha1::ZERO);
        bundle.encrypt_with = Some(key);
        bundle.data = vec![1, 2];

        let bytes = bundle.encode();

        let keys = StaticKeyStore::new().with_key("Key2", key.to_vec());
        let sb = BinarySbReader::new(Endian::Little, &keys)
            .read(Bytes::from(bytes.clone()), &uncompressed(0))
            .unwrap();
        assert_eq!(sb.ebx[0].name, "encrypted/asset");
        assert_eq!(sb.ebx[0].sha1, Sha1::ZERO);

        // Without the key nothing comes back
        assert!(matches!(
            decode(bytes, uncompressed(0)),
            Err(DecodeError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_payload_to_end() {
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_PLAIN);
        bundle.ebx("a", 4, Sha1::ZERO);
        bundle.data = b"wxyz".to_vec();

        let options = DecodeOptions {
            extent: PayloadExtent::ToEnd,
            ..uncompressed(0)
        };
        let sb = decode(bundle.encode(), options).unwrap();
        assert_eq!(
            sb.ebx[0].location.as_ref().unwrap().data.as_deref(),
            Some(b"wxyz".as_slice())
        );
    }

    #[test]
    fn test_truncated_entry_table() {
        let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_PLAIN);
        bundle.ebx("a", 4, Sha1::ZERO);
        let mut bytes = bundle.encode();
        bytes.truncate(0x24 + 6);
        // Point the data offset at the new end
        let data_offset = (bytes.len() - 4) as u32;
        bytes[..4].copy_from_slice(&data_offset.to_be_bytes());

        assert!(matches!(
            decode(bytes, uncompressed(0)),
            Err(DecodeError::UnexpectedEndOfStream { .. })
        ));
    }

    #[test]
    fn test_magic_table() {
        assert!(!MagicKind::classify(MAGIC_PLAIN).contains_hashes());
        assert!(!MagicKind::classify(MAGIC_ENCRYPTED).contains_hashes());
        assert!(MagicKind::classify(MAGIC_ENCRYPTED).is_encrypted());
        assert!(MagicKind::classify(MAGIC_HEADER_ONLY).contains_hashes());
        assert!(MagicKind::classify(0).contains_hashes());
        assert!(!MagicKind::classify(0).is_encrypted());
    }
}
