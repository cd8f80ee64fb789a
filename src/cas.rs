//! Storage container (CAS) path resolution

use std::path::PathBuf;

use anyhow::{Context, Result};

pub const PATCH_FOLDER: &str = "native_patch";
pub const DATA_FOLDER: &str = "native_data";

/// Maps a sub-entry's storage identity to the container file holding it
pub trait CasResolver: Sync {
    fn resolve(&self, catalog: u8, cas: u8, is_patch: bool) -> Result<PathBuf>;
}

/// Resolves `<root>/<native_patch|native_data>/<catalog name>/cas_NN.cas`
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    pub root: PathBuf,
    /// Catalog names by index
    pub catalogs: Vec<String>,
}

impl CatalogResolver {
    pub fn new(root: impl Into<PathBuf>, catalogs: Vec<String>) -> Self {
        Self {
            root: root.into(),
            catalogs,
        }
    }
}

impl CasResolver for CatalogResolver {
    fn resolve(&self, catalog: u8, cas: u8, is_patch: bool) -> Result<PathBuf> {
        let name = self
            .catalogs
            .get(catalog as usize)
            .with_context(|| format!("Unknown catalog index {catalog}"))?;
        let folder = if is_patch { PATCH_FOLDER } else { DATA_FOLDER };

        Ok(self
            .root
            .join(folder)
            .join(name)
            .join(format!("cas_{cas:02}.cas")))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{CasResolver, CatalogResolver};

    #[test]
    fn test_resolve() {
        let resolver = CatalogResolver::new("/game", vec!["win32/base".into(), "win32/dlc".into()]);

        assert_eq!(
            resolver.resolve(1, 3, false).unwrap(),
            PathBuf::from("/game/native_data/win32/dlc/cas_03.cas")
        );
        assert_eq!(
            resolver.resolve(0, 12, true).unwrap(),
            PathBuf::from("/game/native_patch/win32/base/cas_12.cas")
        );
        assert!(resolver.resolve(2, 0, false).is_err());
    }
}
