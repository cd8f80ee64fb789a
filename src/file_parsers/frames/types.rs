use bytes::Bytes;

use crate::error::DecodeError;

/// Width of the size fields preceding every frame body
pub const FRAME_HEADER_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Size of the frame once inflated, flag bits already masked off
    pub decompressed_size: u32,
    /// Raw field, flags included
    pub compression_type: u16,
    /// Low 7 bits of the compression type
    pub method: u16,
    /// Size of the frame body on disk
    pub frame_size: u32,
}

impl FrameHeader {
    pub fn is_stored(&self) -> bool {
        self.method == 0
    }

    /// Header plus body
    pub fn span(&self) -> u64 {
        u64::from(self.frame_size) + FRAME_HEADER_SIZE
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Zlib,
    Zstd,
    Oodle,
}

impl CompressionMethod {
    pub fn from_code(code: u16) -> Result<Self, DecodeError> {
        use CompressionMethod::*;
        let method = match code {
            0x00 => Stored,
            0x02 => Zlib,
            0x0f => Zstd,
            0x11 | 0x15 | 0x19 => Oodle,
            x => return Err(DecodeError::UnsupportedCompression(x)),
        };

        Ok(method)
    }
}
