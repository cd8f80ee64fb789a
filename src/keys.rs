//! Encryption key lookup

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};

/// Read-only key lookup shared between decoder instances
pub trait KeyStore: Sync {
    fn get_key(&self, label: &str) -> Option<&[u8]>;
}

#[derive(Debug, Default, Clone)]
pub struct StaticKeyStore {
    keys: HashMap<String, Vec<u8>>,
}

impl StaticKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, label: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.keys.insert(label.into(), key.into());
        self
    }

    /// Parse a JSON object of `{"label": "hex key"}` pairs
    pub fn from_json(contents: &str) -> Result<Self> {
        let raw: HashMap<String, String> =
            serde_json::from_str(contents).context("Failed to parse key file as JSON")?;

        let keys = raw
            .into_iter()
            .map(|(label, key)| {
                let key = hex::decode(key.trim())
                    .with_context(|| format!("Invalid hex for key {label:?}"))?;
                Ok((label, key))
            })
            .collect::<Result<_>>()?;

        Ok(Self { keys })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file: {:?}", path))?;
        Self::from_json(&contents)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for StaticKeyStore {
    fn get_key(&self, label: &str) -> Option<&[u8]> {
        self.keys.get(label).map(Vec::as_slice)
    }
}
