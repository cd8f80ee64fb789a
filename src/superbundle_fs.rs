//! Loads every bundle listed by a superbundle's TOC, stamping each decoded entry with the
//! storage container slice it lives in, and keeps a catalog of all known chunks by GUID.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    cas::{CasResolver, DATA_FOLDER, PATCH_FOLDER},
    cursor::{ByteCursor, Endian},
    file_parsers::{
        binary_sb::{
            types::{BinarySb, ChunkEntry, DecodeOptions, EbxEntry, PayloadLocation, ResEntry},
            BinarySbParser,
        },
        frames::{read_compressed_span, read_compressed_stream},
        sbtoc::{
            types::{BundleDescriptor, BundleSubEntry, RawChunkEntry, SbToc, TocFormat},
            SbTocParser,
        },
        FileParser,
    },
    keys::KeyStore,
    source::{read_file, read_range, Deobfuscator, NoDeobfuscation},
};

#[derive(Debug, Clone)]
pub enum TocSource {
    /// A single TOC file
    Single(PathBuf),
    /// `native_data/<name>.toc` overlaid with `native_patch/<name>.toc`. Either may be missing.
    Overlay(String),
}

/// Which TOC something was loaded from. Later layers override earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TocLayer {
    Base,
    Patch,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub game_dir: PathBuf,
    pub source: TocSource,
    /// Byte order of the bundles' entry tables
    pub endian: Endian,
    pub format: TocFormat,
    pub decode: DecodeOptions,
}

/// A slice of a storage container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CasLocation {
    pub path: PathBuf,
    pub catalog: u8,
    pub cas: u8,
    pub is_patch: bool,
    pub offset: u32,
    pub size: u32,
}

impl CasLocation {
    pub fn from_sub_entry(entry: &BundleSubEntry, resolver: &dyn CasResolver) -> Result<Self> {
        Ok(Self {
            path: resolver.resolve(entry.catalog, entry.cas, entry.is_patch)?,
            catalog: entry.catalog,
            cas: entry.cas,
            is_patch: entry.is_patch,
            offset: entry.cas_offset,
            size: entry.size,
        })
    }

    pub fn from_raw_chunk(entry: &RawChunkEntry, resolver: &dyn CasResolver) -> Result<Self> {
        Ok(Self {
            path: resolver.resolve(entry.catalog, entry.cas, entry.is_patch)?,
            catalog: entry.catalog,
            cas: entry.cas,
            is_patch: entry.is_patch,
            offset: entry.chunk_offset,
            size: entry.chunk_size,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum EntryRef<'a> {
    Ebx(&'a EbxEntry),
    Res(&'a ResEntry),
    Chunk(&'a ChunkEntry),
}

impl EntryRef<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            EntryRef::Ebx(_) => "ebx",
            EntryRef::Res(_) => "res",
            EntryRef::Chunk(_) => "chunk",
        }
    }

    /// Chunks have no name, their GUID stands in for one
    pub fn name(&self) -> String {
        match self {
            EntryRef::Ebx(e) => e.name.clone(),
            EntryRef::Res(e) => e.name.clone(),
            EntryRef::Chunk(e) => e.id.to_string(),
        }
    }

    pub fn original_size(&self) -> u64 {
        match self {
            EntryRef::Ebx(e) => u64::from(e.original_size),
            EntryRef::Res(e) => u64::from(e.original_size),
            EntryRef::Chunk(e) => e.original_size,
        }
    }

    pub fn payload(&self) -> Option<&PayloadLocation> {
        match self {
            EntryRef::Ebx(e) => e.location.as_ref(),
            EntryRef::Res(e) => e.location.as_ref(),
            EntryRef::Chunk(e) => e.location.as_ref(),
        }
    }
}

/// A decoded entry along with the container slice the TOC gave it
#[derive(Debug, Clone, Copy)]
pub struct LocatedEntry<'a> {
    pub entry: EntryRef<'a>,
    pub cas: Option<&'a CasLocation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedBundle {
    /// Name of the bundle's last ebx entry, or a placeholder built from its index
    pub name: String,
    pub layer: TocLayer,
    /// Position within its TOC
    pub index: usize,
    pub location: CasLocation,
    pub bundle: BinarySb,
    /// Locations of the ebx, res and chunk entries, in that order
    pub object_locations: Vec<CasLocation>,
}

impl LoadedBundle {
    pub fn entries(&self) -> impl Iterator<Item = LocatedEntry<'_>> {
        let bundle = &self.bundle;
        bundle
            .ebx
            .iter()
            .map(EntryRef::Ebx)
            .chain(bundle.res.iter().map(EntryRef::Res))
            .chain(bundle.chunks.iter().map(EntryRef::Chunk))
            .enumerate()
            .map(|(i, entry)| LocatedEntry {
                entry,
                cas: self.object_locations.get(i),
            })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: Uuid,
    pub layer: TocLayer,
    pub location: CasLocation,
    /// Listed by the TOC itself rather than by a bundle
    pub toc_chunk: bool,
    /// Only known for chunks listed by a bundle
    pub original_size: Option<u64>,
}

/// Every chunk seen so far, by GUID
#[derive(Debug, Default)]
pub struct ChunkCatalog {
    chunks: HashMap<Uuid, ChunkRecord>,
}

impl ChunkCatalog {
    /// TOC chunks always replace what's already there
    pub fn insert_toc_chunk(&mut self, record: ChunkRecord) -> Option<ChunkRecord> {
        self.chunks.insert(record.id, record)
    }

    /// Bundle chunks only replace bundle chunks, or anything from an earlier layer
    pub fn insert_bundle_chunk(&mut self, record: ChunkRecord) -> bool {
        let replace = match self.chunks.get(&record.id) {
            Some(existing) => {
                existing.layer < record.layer
                    || (existing.layer == record.layer && !existing.toc_chunk)
            }
            None => true,
        };

        if replace {
            self.chunks.insert(record.id, record);
        }
        replace
    }

    pub fn get(&self, id: &Uuid) -> Option<&ChunkRecord> {
        self.chunks.get(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Records ordered by GUID
    pub fn sorted(&self) -> Vec<&ChunkRecord> {
        let mut records: Vec<_> = self.chunks.values().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[derive(Debug)]
pub struct BundleFailure {
    pub toc: PathBuf,
    pub index: usize,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    /// TOCs in the order they were applied
    pub tocs: Vec<(TocLayer, PathBuf)>,
    pub bundles: Vec<LoadedBundle>,
    pub failures: Vec<BundleFailure>,
    pub chunks: ChunkCatalog,
}

impl LoadReport {
    /// Later bundles shadow earlier ones with the same name
    pub fn find_bundle(&self, name: &str) -> Option<&LoadedBundle> {
        self.bundles.iter().rev().find(|b| b.name == name)
    }

    /// Look up an ebx or res entry by name, or a bundle chunk by GUID
    pub fn find_entry(&self, name: &str) -> Option<LocatedEntry<'_>> {
        self.bundles
            .iter()
            .rev()
            .flat_map(|b| b.entries())
            .find(|e| e.entry.name().eq_ignore_ascii_case(name))
    }
}

pub struct SuperbundleFs {
    options: LoadOptions,
    keys: Box<dyn KeyStore>,
    resolver: Box<dyn CasResolver>,
    deobfuscator: Box<dyn Deobfuscator>,
}

impl SuperbundleFs {
    pub fn new(
        options: LoadOptions,
        keys: Box<dyn KeyStore>,
        resolver: Box<dyn CasResolver>,
    ) -> Self {
        Self {
            options,
            keys,
            resolver,
            deobfuscator: Box::new(NoDeobfuscation),
        }
    }

    pub fn with_deobfuscator(mut self, deobfuscator: Box<dyn Deobfuscator>) -> Self {
        self.deobfuscator = deobfuscator;
        self
    }

    /// TOC files to apply, base layer first
    pub fn toc_paths(&self) -> Result<Vec<(TocLayer, PathBuf)>> {
        match &self.options.source {
            TocSource::Single(path) => Ok(vec![(TocLayer::Base, path.clone())]),
            TocSource::Overlay(name) => {
                let file_name = format!("{name}.toc");
                let paths: Vec<_> = [(TocLayer::Base, DATA_FOLDER), (TocLayer::Patch, PATCH_FOLDER)]
                    .into_iter()
                    .map(|(layer, folder)| {
                        (layer, self.options.game_dir.join(folder).join(&file_name))
                    })
                    .filter(|(_, path)| path.exists())
                    .collect();

                ensure!(
                    !paths.is_empty(),
                    "No TOC found for superbundle {name:?} in {:?}",
                    self.options.game_dir
                );
                Ok(paths)
            }
        }
    }

    pub fn read_toc(&self, path: &Path) -> Result<SbToc> {
        let bytes = read_file(path, self.deobfuscator.as_ref())?;

        SbTocParser {
            format: self.options.format,
        }
        .parse(&bytes)
        .with_context(|| format!("Failed to read TOC: {:?}", path))
    }

    /// Fetch and decode a single bundle
    pub fn load_bundle(
        &self,
        layer: TocLayer,
        index: usize,
        descriptor: &BundleDescriptor,
    ) -> Result<LoadedBundle> {
        let resolver = self.resolver.as_ref();

        let entry = descriptor
            .bundle_location()
            .context("Bundle has no sub-entries")?;
        let location = CasLocation::from_sub_entry(entry, resolver)?;

        let bytes = read_range(
            &location.path,
            location.offset.into(),
            location.size as usize,
            self.deobfuscator.as_ref(),
        )?;

        let parser = BinarySbParser {
            endian: self.options.endian,
            keys: self.keys.as_ref(),
            options: DecodeOptions {
                base_offset: self.options.decode.base_offset + u64::from(location.offset),
                ..self.options.decode
            },
        };
        let bundle = parser.parse(&bytes)?;

        let object_locations = descriptor
            .object_locations()
            .iter()
            .map(|e| CasLocation::from_sub_entry(e, resolver))
            .collect::<Result<Vec<_>>>()?;
        if object_locations.len() != bundle.entry_count() {
            warn!(
                index,
                locations = object_locations.len(),
                entries = bundle.entry_count(),
                "Sub-entry count doesn't match the bundle's entries"
            );
        }

        let name = bundle
            .ebx
            .last()
            .map(|e| e.name.clone())
            .unwrap_or_else(|| format!("bundle_{index}"));
        debug!(name = %name, index, entries = bundle.entry_count(), "Loaded bundle");

        Ok(LoadedBundle {
            name,
            layer,
            index,
            location,
            bundle,
            object_locations,
        })
    }

    /// Decode every bundle of a TOC in parallel. Failures are reported per bundle and don't
    /// affect the others.
    pub fn load_bundles(
        &self,
        layer: TocLayer,
        toc: &SbToc,
    ) -> Vec<Result<LoadedBundle, (usize, anyhow::Error)>> {
        toc.bundles
            .par_iter()
            .enumerate()
            .map(|(index, descriptor)| {
                self.load_bundle(layer, index, descriptor)
                    .with_context(|| format!("Failed to load bundle {index}"))
                    .map_err(|e| (index, e))
            })
            .collect()
    }

    /// Apply every TOC layer in order. Only a TOC failing to load aborts the whole thing.
    pub fn load(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for (layer, path) in self.toc_paths()? {
            let toc = self.read_toc(&path)?;
            info!(
                ?layer,
                bundles = toc.bundles.len(),
                chunks = toc.chunks.len(),
                "Read TOC {:?}",
                path
            );

            for chunk in &toc.chunks {
                match CasLocation::from_raw_chunk(chunk, self.resolver.as_ref()) {
                    Ok(location) => {
                        report.chunks.insert_toc_chunk(ChunkRecord {
                            id: chunk.guid,
                            layer,
                            location,
                            toc_chunk: true,
                            original_size: None,
                        });
                    }
                    Err(e) => warn!("Skipping TOC chunk {}: {:?}", chunk.guid, e),
                }
            }

            let first_new = report.bundles.len();
            for result in self.load_bundles(layer, &toc) {
                match result {
                    Ok(bundle) => report.bundles.push(bundle),
                    Err((index, error)) => {
                        warn!("Bundle {index} of {:?} failed: {:?}", path, error);
                        report.failures.push(BundleFailure {
                            toc: path.clone(),
                            index,
                            error,
                        });
                    }
                }
            }

            for bundle in &report.bundles[first_new..] {
                for entry in bundle.entries() {
                    if let (EntryRef::Chunk(chunk), Some(location)) = (entry.entry, entry.cas) {
                        report.chunks.insert_bundle_chunk(ChunkRecord {
                            id: chunk.id,
                            layer,
                            location: location.clone(),
                            toc_chunk: false,
                            original_size: Some(chunk.original_size),
                        });
                    }
                }
            }

            report.tocs.push((layer, path));
        }

        info!(
            bundles = report.bundles.len(),
            failures = report.failures.len(),
            chunks = report.chunks.len(),
            "Finished loading"
        );

        Ok(report)
    }

    /// Decompressed contents of a bundle entry
    pub fn read_entry(&self, entry: &LocatedEntry) -> Result<Bytes> {
        if let Some(data) = entry.entry.payload().and_then(|p| p.data.clone()) {
            return Ok(data);
        }

        let cas = entry
            .cas
            .with_context(|| format!("No storage location for {}", entry.entry.name()))?;
        let raw = read_range(
            &cas.path,
            cas.offset.into(),
            cas.size as usize,
            self.deobfuscator.as_ref(),
        )?;

        let contents = read_compressed_stream(
            &mut ByteCursor::new(raw),
            entry.entry.original_size() as i64,
        )
        .with_context(|| format!("Failed to decompress {}", entry.entry.name()))?;

        Ok(contents)
    }

    /// Decompressed contents of a catalog chunk
    pub fn read_chunk(&self, record: &ChunkRecord) -> Result<Bytes> {
        let location = &record.location;
        let raw = read_range(
            &location.path,
            location.offset.into(),
            location.size as usize,
            self.deobfuscator.as_ref(),
        )?;
        let mut cursor = ByteCursor::new(raw);

        let contents = match record.original_size {
            Some(size) => read_compressed_stream(&mut cursor, size as i64),
            None => read_compressed_span(&mut cursor, location.size.into()),
        }
        .with_context(|| format!("Failed to decompress chunk {}", record.id))?;

        Ok(contents)
    }
}
