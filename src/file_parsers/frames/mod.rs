//! Compression frames that make up every object's payload inside a bundle
//!
//! Each frame is an 8 byte header followed by the (possibly compressed) frame body. An object is
//! a run of frames whose decompressed sizes add up to the object's declared size.

pub mod decompress;
pub mod parser;
pub mod types;

pub use decompress::{decompress_frame, read_compressed_span, read_compressed_stream};
pub use parser::{frame_header, measure_compressed_stream, read_frames};
pub use types::{CompressionMethod, Frame, FrameHeader, FRAME_HEADER_SIZE};
