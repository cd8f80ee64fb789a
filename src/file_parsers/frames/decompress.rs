use std::io::Read;

use bytes::{Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use oozextract::Extractor;

use super::{
    parser::{frame_header, read_frames},
    types::*,
};
use crate::{cursor::ByteCursor, error::DecodeError};

/// Inflate a single frame body
pub fn decompress_frame(frame: &Frame) -> Result<Bytes, DecodeError> {
    let size = frame.header.decompressed_size as usize;

    let contents = match CompressionMethod::from_code(frame.header.method)? {
        CompressionMethod::Stored => return Ok(frame.body.clone()),
        CompressionMethod::Zlib => {
            let mut out = Vec::with_capacity(size);
            ZlibDecoder::new(frame.body.as_ref())
                .read_to_end(&mut out)
                .map_err(|e| DecodeError::Decompression(format!("zlib: {e}")))?;
            out
        }
        CompressionMethod::Zstd => zstd::bulk::decompress(&frame.body, size)
            .map_err(|e| DecodeError::Decompression(format!("zstd: {e}")))?,
        CompressionMethod::Oodle => {
            let mut out = vec![0; size];
            Extractor::new()
                .read_from_slice(&frame.body, &mut out)
                .map_err(|e| DecodeError::Decompression(format!("oodle: {e}")))?;
            out
        }
    };

    if contents.len() != size {
        return Err(DecodeError::Decompression(format!(
            "Frame inflated to {} bytes, header declared {}",
            contents.len(),
            size
        )));
    }

    Ok(Bytes::from(contents))
}

fn concat(frames: &[Frame]) -> Result<Bytes, DecodeError> {
    let total = frames
        .iter()
        .map(|f| f.header.decompressed_size as usize)
        .sum();
    let mut buf = BytesMut::with_capacity(total);

    for frame in frames {
        buf.extend_from_slice(&decompress_frame(frame)?);
    }

    Ok(buf.freeze())
}

/// Materialize an object whose decompressed size is known
pub fn read_compressed_stream(
    cursor: &mut ByteCursor,
    original_size: i64,
) -> Result<Bytes, DecodeError> {
    let frames = read_frames(cursor, original_size)?;
    concat(&frames)
}

/// Materialize an object when only its on-disk footprint is known, as with TOC chunks
pub fn read_compressed_span(cursor: &mut ByteCursor, span: u64) -> Result<Bytes, DecodeError> {
    let mut frames = vec![];
    let mut consumed = 0;

    while consumed < span {
        let header = frame_header(cursor)?;
        consumed += header.span();

        let body = cursor.read_bytes(header.frame_size as usize)?;
        frames.push(Frame { header, body });
    }

    concat(&frames)
}
