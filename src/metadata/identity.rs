//! Sample identity providers
//!
//! The laboratory information system owns sample, library and study facts.
//! The publisher asks a provider for the tags and read grants of a product
//! and applies whatever comes back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use seqpub_store::{Avu, MetadataSet, Permission};

use super::{attr, Annotation};
use crate::composition::Product;

/// Prefix of per-study access groups.
pub const STUDY_GROUP_PREFIX: &str = "ss_";

/// Errors from an identity provider.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read sample sheet {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid sample sheet: {0}")]
    Parse(String),

    #[error("no identity record for product {0}")]
    UnknownProduct(String),
}

/// Source of sample-derived tags and permissions.
pub trait IdentityProvider: Send + Sync {
    fn tags_and_permissions(
        &self,
        product: &Product,
        with_spiked_control: bool,
    ) -> Result<Annotation, IdentityError>;
}

/// Provider that knows nothing; every product gets no tags and no grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentityProvider for NoIdentity {
    fn tags_and_permissions(&self, _: &Product, _: bool) -> Result<Annotation, IdentityError> {
        Ok(Annotation::default())
    }
}

/// One sequenced entity in a sample sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_id: Option<String>,
    #[serde(default)]
    pub spiked_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetProduct {
    #[serde(default)]
    pub entities: Vec<SheetEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSheet {
    #[serde(default)]
    pub products: BTreeMap<String, SheetProduct>,
}

/// Provider backed by a JSON sample sheet.
#[derive(Debug, Clone, Default)]
pub struct SampleSheetProvider {
    sheet: SampleSheet,
}

impl SampleSheetProvider {
    pub fn new(sheet: SampleSheet) -> Self {
        Self { sheet }
    }

    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let json = fs::read_to_string(path).map_err(|source| IdentityError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, IdentityError> {
        let sheet = serde_json::from_str(json).map_err(|e| IdentityError::Parse(e.to_string()))?;
        Ok(Self::new(sheet))
    }
}

impl IdentityProvider for SampleSheetProvider {
    fn tags_and_permissions(
        &self,
        product: &Product,
        with_spiked_control: bool,
    ) -> Result<Annotation, IdentityError> {
        let entry = self
            .sheet
            .products
            .get(&product.name)
            .ok_or_else(|| IdentityError::UnknownProduct(product.name.clone()))?;

        let mut tags = MetadataSet::new();
        let mut permissions: Vec<Permission> = Vec::new();

        for entity in entry
            .entities
            .iter()
            .filter(|e| with_spiked_control || !e.spiked_control)
        {
            let fields = [
                (attr::SAMPLE, &entity.sample),
                (attr::SAMPLE_ID, &entity.sample_id),
                (attr::LIBRARY_ID, &entity.library_id),
                (attr::STUDY, &entity.study),
                (attr::STUDY_ID, &entity.study_id),
            ];
            for (attribute, value) in fields {
                if let Some(value) = value {
                    tags.add(Avu::new(attribute, value.as_str()));
                }
            }

            if let Some(study_id) = &entity.study_id {
                let grant = Permission::read(format!("{}{}", STUDY_GROUP_PREFIX, study_id));
                if !permissions.contains(&grant) {
                    permissions.push(grant);
                }
            }
        }

        debug!(
            product = %product.name,
            tags = tags.len(),
            grants = permissions.len(),
            "identity resolved"
        );
        Ok(Annotation { tags, permissions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{Component, Composition};

    const SHEET: &str = r#"{
        "products": {
            "12345_1#1": {"entities": [
                {"sample": "S1", "sample_id": "101", "library_id": "L1", "study": "Study A", "study_id": "2001"},
                {"sample": "phiX", "sample_id": "9", "study_id": "198", "spiked_control": true}
            ]},
            "12345_1#2": {"entities": [
                {"sample": "S2", "study_id": "2001"},
                {"sample": "S3", "study_id": "2001"}
            ]}
        }
    }"#;

    fn product(name: &str) -> Product {
        Product {
            name: name.to_string(),
            directory: PathBuf::from("/runs/12345"),
            composition: Composition::new(vec![Component {
                id_run: 12345,
                position: 1,
                tag_index: Some(1),
                subset: None,
            }]),
        }
    }

    #[test]
    fn test_no_identity_is_empty() {
        let annotation = NoIdentity.tags_and_permissions(&product("x"), true).unwrap();
        assert!(annotation.tags.is_empty());
        assert!(annotation.permissions.is_empty());
    }

    #[test]
    fn test_sample_sheet_tags_without_spiked_control() {
        let provider = SampleSheetProvider::from_json(SHEET).unwrap();
        let annotation = provider
            .tags_and_permissions(&product("12345_1#1"), false)
            .unwrap();

        assert_eq!(annotation.tags.values(attr::SAMPLE), vec!["S1"]);
        assert_eq!(annotation.tags.value(attr::STUDY), Some("Study A"));
        assert_eq!(annotation.permissions, vec![Permission::read("ss_2001")]);
    }

    #[test]
    fn test_sample_sheet_with_spiked_control() {
        let provider = SampleSheetProvider::from_json(SHEET).unwrap();
        let annotation = provider
            .tags_and_permissions(&product("12345_1#1"), true)
            .unwrap();

        assert_eq!(annotation.tags.values(attr::SAMPLE), vec!["S1", "phiX"]);
        assert_eq!(annotation.permissions.len(), 2);
    }

    #[test]
    fn test_shared_study_granted_once() {
        let provider = SampleSheetProvider::from_json(SHEET).unwrap();
        let annotation = provider
            .tags_and_permissions(&product("12345_1#2"), false)
            .unwrap();

        assert_eq!(annotation.tags.values(attr::SAMPLE), vec!["S2", "S3"]);
        assert_eq!(annotation.permissions, vec![Permission::read("ss_2001")]);
    }

    #[test]
    fn test_unknown_product() {
        let provider = SampleSheetProvider::from_json(SHEET).unwrap();
        assert!(matches!(
            provider.tags_and_permissions(&product("nope"), false),
            Err(IdentityError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_invalid_sheet() {
        assert!(matches!(
            SampleSheetProvider::from_json("[1, 2]"),
            Err(IdentityError::Parse(_))
        ));
    }
}
