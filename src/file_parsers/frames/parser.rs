use super::types::*;
use crate::{
    cursor::{ByteCursor, Endian},
    error::DecodeError,
};

/// Top byte of the decompressed size holds flags
const DECOMPRESSED_FLAG_MASK: u32 = 0xFF00_0000;
const DECOMPRESSED_SIZE_MASK: u32 = 0x00FF_FFFF;
const METHOD_MASK: u16 = 0x7F;

pub fn frame_header(cursor: &mut ByteCursor) -> Result<FrameHeader, DecodeError> {
    let mut decompressed_size = cursor.read_u32(Endian::Big)?;
    let compression_type = cursor.read_u16(Endian::Little)?;
    let frame_size_field = cursor.read_u16(Endian::Big)?;

    if decompressed_size & DECOMPRESSED_FLAG_MASK != 0 {
        decompressed_size &= DECOMPRESSED_SIZE_MASK;
    }

    // Bits 8-11 extend the frame size past 16 bits
    let extension = u32::from((compression_type >> 8) & 0x0F);
    let method = compression_type & METHOD_MASK;

    let frame_size = if method == 0 {
        decompressed_size
    } else if extension != 0 {
        (extension << 16) | u32::from(frame_size_field)
    } else {
        u32::from(frame_size_field)
    };

    Ok(FrameHeader {
        decompressed_size,
        compression_type,
        method,
        frame_size,
    })
}

/// Walk the frames covering `original_size` decompressed bytes, leaving the cursor just past the
/// last one. Frame bodies are sliced out, not inflated.
pub fn read_frames(cursor: &mut ByteCursor, original_size: i64) -> Result<Vec<Frame>, DecodeError> {
    let mut frames = vec![];
    let mut remaining = original_size;

    // A frame may overshoot the remaining size, which just ends the object
    while remaining > 0 {
        let header = frame_header(cursor)?;
        remaining -= i64::from(header.decompressed_size);

        let body = cursor.read_bytes(header.frame_size as usize)?;
        frames.push(Frame { header, body });
    }

    Ok(frames)
}

/// Number of bytes, frame headers included, the compressed form of an object occupies
pub fn measure_compressed_stream(
    cursor: &mut ByteCursor,
    original_size: i64,
) -> Result<u64, DecodeError> {
    let frames = read_frames(cursor, original_size)?;

    Ok(frames.iter().map(|f| f.header.span()).sum())
}

#[cfg(test)]
mod tests {
    use super::{frame_header, measure_compressed_stream, read_frames};
    use crate::{cursor::ByteCursor, error::DecodeError};

    fn header_bytes(decompressed: u32, compression_type: u16, frame_size: u16) -> Vec<u8> {
        let mut bytes = decompressed.to_be_bytes().to_vec();
        bytes.extend(compression_type.to_le_bytes());
        bytes.extend(frame_size.to_be_bytes());
        bytes
    }

    #[test]
    fn test_decompressed_size_flags_masked() {
        let mut cursor = ByteCursor::new(header_bytes(0x0100_0010, 0x0002, 0x0004));
        let header = frame_header(&mut cursor).unwrap();

        assert_eq!(header.decompressed_size, 0x10);
        assert_eq!(header.method, 0x02);
        assert_eq!(header.frame_size, 0x04);
        assert_eq!(cursor.position(), 8);
    }

    #[test]
    fn test_frame_size_extension() {
        let mut cursor = ByteCursor::new(header_bytes(0x20_0000, 0x0A15, 0x0005));
        let header = frame_header(&mut cursor).unwrap();

        assert_eq!(header.method, 0x15);
        assert_eq!(header.frame_size, 0x000A_0005);
    }

    #[test]
    fn test_stored_frame_uses_decompressed_size() {
        // The on-disk size field is ignored for stored frames
        let mut cursor = ByteCursor::new(header_bytes(0x30, 0x0000, 0x0001));
        let header = frame_header(&mut cursor).unwrap();

        assert!(header.is_stored());
        assert_eq!(header.frame_size, 0x30);
    }

    #[test]
    fn test_measure_multiple_frames() {
        let mut bytes = header_bytes(4, 0, 0);
        bytes.extend([1, 2, 3, 4]);
        bytes.extend(header_bytes(0x10, 0x0002, 3));
        bytes.extend([9, 9, 9]);
        bytes.extend([0xEE; 5]);

        let mut cursor = ByteCursor::new(bytes);
        let span = measure_compressed_stream(&mut cursor, 6).unwrap();

        // Second frame overshoots the remaining 2 bytes, which still terminates the walk
        assert_eq!(span, (4 + 8) + (3 + 8));
        assert_eq!(cursor.position(), 23);
    }

    #[test]
    fn test_frame_bodies() {
        let mut bytes = header_bytes(2, 0, 0);
        bytes.extend([7, 8]);

        let mut cursor = ByteCursor::new(bytes);
        let frames = read_frames(&mut cursor, 2).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body.as_ref(), &[7, 8]);
    }

    #[test]
    fn test_zero_size_reads_nothing() {
        let mut cursor = ByteCursor::new(vec![]);
        assert_eq!(measure_compressed_stream(&mut cursor, 0).unwrap(), 0);
    }

    #[test]
    fn test_truncated_frame() {
        let mut bytes = header_bytes(0x10, 0x0002, 0x20);
        bytes.extend([0; 4]);

        let mut cursor = ByteCursor::new(bytes);
        assert!(matches!(
            measure_compressed_stream(&mut cursor, 0x10),
            Err(DecodeError::UnexpectedEndOfStream { .. })
        ));
    }
}
