//! Products and their composition descriptors
//!
//! A product is named by the stem of its `<name>.composition.json` file.
//! The descriptor lists the sequencing entities the product was built from.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use seqpub_catalog::{parse_product_name, DiscoveryError};

/// One sequencing entity contributing to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id_run: u64,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
}

/// Ordered, immutable list of components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    components: Vec<Component>,
}

/// Errors reading a composition descriptor.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("failed to read composition {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid composition {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("JCS canonicalization error: {0}")]
    Canonical(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl Composition {
    pub fn new(components: Vec<Component>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// JCS-canonical JSON of the component list.
    pub fn canonical_json(&self) -> Result<String, CompositionError> {
        let bytes = serde_json_canonicalizer::to_vec(&self.components)
            .map_err(|e| CompositionError::Canonical(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CompositionError::Canonical(e.to_string()))
    }

    /// Stable product identifier: SHA-256 of the canonical JSON.
    pub fn digest(&self) -> Result<String, CompositionError> {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json()?.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    fn parse(path: &Path, json: &str) -> Result<Self, CompositionError> {
        let composition: Composition =
            serde_json::from_str(json).map_err(|e| CompositionError::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if composition.components.is_empty() {
            return Err(CompositionError::Invalid {
                path: path.to_path_buf(),
                reason: "no components".to_string(),
            });
        }
        Ok(composition)
    }
}

/// A named product backed by its composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub directory: PathBuf,
    pub composition: Composition,
}

impl Product {
    /// Load a product from its composition descriptor.
    pub fn load(descriptor: &Path) -> Result<Self, CompositionError> {
        let parsed = parse_product_name(descriptor)?;
        let json = fs::read_to_string(descriptor).map_err(|source| CompositionError::Io {
            path: descriptor.to_path_buf(),
            source,
        })?;
        let composition = Composition::parse(descriptor, &json)?;

        Ok(Self {
            name: parsed.name,
            directory: parsed.directory,
            composition,
        })
    }
}
