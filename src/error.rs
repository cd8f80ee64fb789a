use thiserror::Error;

/// Failures raised while decoding a single container. None of them are retried, the caller
/// decides whether to skip the container and carry on with its siblings.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unexpected end of stream at {position:#x}: wanted {wanted} bytes, {available} available")]
    UnexpectedEndOfStream {
        position: usize,
        wanted: usize,
        available: usize,
    },

    #[error("Failed to decrypt payload: {0}")]
    DecryptionFailure(String),

    #[error("Index {index} out of range for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported compression method: {0:#x}")]
    UnsupportedCompression(u16),

    #[error("Failed to decompress frame: {0}")]
    Decompression(String),

    #[error("Invalid typed tree value type: {0:#x}")]
    InvalidTypedTree(u8),
}
