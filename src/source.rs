//! Raw file access for the loader

use std::{
    fs::{self, File},
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use anyhow::{ensure, Context, Result};
use bytes::Bytes;

/// Undoes any whole-file obfuscation layer before the bytes reach a decoder
pub trait Deobfuscator: Sync {
    fn deobfuscate(&self, data: Bytes) -> Result<Bytes>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeobfuscation;

impl Deobfuscator for NoDeobfuscation {
    fn deobfuscate(&self, data: Bytes) -> Result<Bytes> {
        Ok(data)
    }
}

/// Load a whole file
pub fn read_file(path: &Path, deobfuscator: &dyn Deobfuscator) -> Result<Bytes> {
    let contents = fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;

    deobfuscator
        .deobfuscate(Bytes::from(contents))
        .with_context(|| format!("Failed to deobfuscate file: {:?}", path))
}

/// Load `size` bytes starting at `offset`
pub fn read_range(
    path: &Path,
    offset: u64,
    size: usize,
    deobfuscator: &dyn Deobfuscator,
) -> Result<Bytes> {
    let mut file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    file.seek(SeekFrom::Start(offset))
        .with_context(|| format!("Failed to seek to {offset:#x} in {:?}", path))?;

    // Sizes come from the TOC, so only allocate what the file actually has
    let mut contents = vec![];
    file.take(size as u64)
        .read_to_end(&mut contents)
        .with_context(|| format!("Failed to read {size:#x} bytes at {offset:#x} from {:?}", path))?;
    ensure!(
        contents.len() == size,
        "Wanted {size:#x} bytes at {offset:#x} from {:?} but only {:#x} are there",
        path,
        contents.len()
    );

    deobfuscator
        .deobfuscate(Bytes::from(contents))
        .with_context(|| format!("Failed to deobfuscate range of {:?}", path))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::{read_file, read_range, Deobfuscator, NoDeobfuscation};

    struct Xor(u8);

    impl Deobfuscator for Xor {
        fn deobfuscate(&self, data: Bytes) -> Result<Bytes> {
            Ok(data.iter().map(|b| b ^ self.0).collect())
        }
    }

    #[test]
    fn test_read_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cas_01.cas");
        fs::write(&path, b"0123456789").unwrap();

        assert_eq!(
            read_range(&path, 3, 4, &NoDeobfuscation).unwrap().as_ref(),
            b"3456"
        );
        assert!(read_range(&path, 8, 4, &NoDeobfuscation).is_err());
        assert!(read_range(&path, 0, u32::MAX as usize, &NoDeobfuscation).is_err());
        assert!(read_range(&path, 10, 0, &NoDeobfuscation).unwrap().is_empty());
        assert_eq!(
            read_file(&path, &Xor(0x01)).unwrap().as_ref(),
            b"1032547698"
        );
    }
}
