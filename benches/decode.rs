use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sb_tools::{
    cursor::Endian,
    file_parsers::{
        binary_sb::{
            types::{DecodeOptions, MAGIC_PLAIN},
            BinarySbReader,
        },
        sbtoc::{
            types::{BundleSubEntry, TocFormat},
            SbTocReader,
        },
        shared::Sha1,
    },
    keys::StaticKeyStore,
    synthetic::{zlib_frame, SyntheticBundle, SyntheticToc, SyntheticTocBundle},
};

fn bundle_benchmark(c: &mut Criterion) {
    let mut bundle = SyntheticBundle::new(Endian::Little, MAGIC_PLAIN ^ 1);
    let mut data = vec![];
    for i in 0..2000 {
        let contents = format!("contents of asset number {i}").repeat(8);
        bundle.ebx(
            &format!("assets/folder_{}/asset_{i}", i % 50),
            contents.len() as u32,
            Sha1([i as u8; 20]),
        );
        data.extend(zlib_frame(contents.as_bytes()));
    }
    bundle.data = data;
    let bytes = Bytes::from(bundle.encode());

    let keys = StaticKeyStore::new();
    let reader = BinarySbReader::new(Endian::Little, &keys);
    let options = DecodeOptions::default();

    c.bench_function("decode_bundle", |b| {
        b.iter(|| {
            reader
                .read(black_box(bytes.clone()), &options)
                .expect("Failed to decode bundle")
        })
    });
}

fn toc_benchmark(c: &mut Criterion) {
    let mut toc = SyntheticToc::default();
    for i in 0..500u32 {
        let entries = (0..20u8)
            .map(|j| {
                let flag = u8::from(j % 5 == 0);
                let entry = BundleSubEntry {
                    unknown: 0,
                    is_patch: i % 2 == 0,
                    catalog: j / 5,
                    cas: j,
                    cas_offset: i * 0x1000 + u32::from(j),
                    size: 0x100,
                };
                (flag, entry)
            })
            .collect();

        toc.bundles.push(SyntheticTocBundle {
            unknown: 0,
            size: 0x4000_1000,
            entries,
        });
    }
    let bytes = Bytes::from(toc.encode());

    c.bench_function("decode_toc", |b| {
        b.iter(|| {
            SbTocReader::new(black_box(bytes.clone()))
                .read(TocFormat::WithChunks)
                .expect("Failed to decode TOC")
        })
    });
}

criterion_group!(benches, bundle_benchmark, toc_benchmark);
criterion_main!(benches);
