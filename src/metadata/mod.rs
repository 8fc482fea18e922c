//! Metadata synthesis
//!
//! Primary tags describe the run and the file category and come from
//! local facts. Secondary tags and permissions come from the identity
//! provider. Primary tags win when both carry the same attribute.

mod identity;

pub use identity::{
    IdentityError, IdentityProvider, NoIdentity, SampleSheet, SampleSheetProvider, SheetEntity,
    SheetProduct, STUDY_GROUP_PREFIX,
};

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

use seqpub_catalog::Category;
use seqpub_store::{Avu, ManagedOwners, MetadataSet, Permission};

use crate::composition::{CompositionError, Product};
use crate::config::{PublishConfig, RunFacts};
use crate::integrity::IntegrityFacts;

/// Attribute names.
pub mod attr {
    pub const ID_RUN: &str = "id_run";
    pub const ALT_PROCESS: &str = "alt_process";
    pub const ALIGNMENT: &str = "alignment";
    pub const IS_PAIRED_READ: &str = "is_paired_read";
    pub const REFERENCE: &str = "reference";
    pub const NUM_READS: &str = "num_reads";
    pub const SEQCHKSUM: &str = "seqchksum";
    pub const COMPOSITION: &str = "composition";
    pub const ID_PRODUCT: &str = "id_product";

    pub const SAMPLE: &str = "sample";
    pub const SAMPLE_ID: &str = "sample_id";
    pub const LIBRARY_ID: &str = "library_id";
    pub const STUDY: &str = "study";
    pub const STUDY_ID: &str = "study_id";

    pub const CREATED: &str = "dcterms:created";
    pub const MODIFIED: &str = "dcterms:modified";
    pub const TYPE: &str = "type";
}

/// Tags plus permission grants for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub tags: MetadataSet,
    pub permissions: Vec<Permission>,
}

/// Errors building metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("{0} tags need integrity facts")]
    MissingFacts(Category),

    #[error("{0} tags need a product")]
    MissingProduct(Category),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Builds tag sets for published objects.
#[derive(Clone)]
pub struct MetadataSynthesizer {
    id_run: u64,
    alt_process: Option<String>,
    run: RunFacts,
    run_level_group: Option<String>,
    identity: Arc<dyn IdentityProvider>,
}

impl MetadataSynthesizer {
    pub fn new(
        id_run: u64,
        alt_process: Option<String>,
        run: RunFacts,
        run_level_group: Option<String>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            id_run,
            alt_process,
            run,
            run_level_group,
            identity,
        }
    }

    pub fn from_config(config: &PublishConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::new(
            config.id_run,
            config.alt_process.clone(),
            config.run.clone(),
            config.permissions.run_level_group().map(str::to_string),
            identity,
        )
    }

    /// Owners whose grants come from this synthesizer: study groups and the
    /// run-level group.
    pub fn managed_owners(&self) -> ManagedOwners {
        let managed = ManagedOwners::new().with_prefix(STUDY_GROUP_PREFIX);
        match &self.run_level_group {
            Some(group) => managed.with_owner(group.as_str()),
            None => managed,
        }
    }

    /// Run and category tags.
    ///
    /// Alignment tags need both the product and its integrity facts.
    pub fn primary_tags(
        &self,
        category: Category,
        product: Option<&Product>,
        facts: Option<&IntegrityFacts>,
    ) -> Result<MetadataSet, MetadataError> {
        let mut tags = MetadataSet::new();
        tags.add(Avu::new(attr::ID_RUN, self.id_run.to_string()));

        if category.is_run_level() {
            return Ok(tags);
        }

        if let Some(alt) = &self.alt_process {
            tags.add(Avu::new(attr::ALT_PROCESS, alt.as_str()));
        }

        if category != Category::Alignment {
            return Ok(tags);
        }

        let product = product.ok_or(MetadataError::MissingProduct(category))?;
        let facts = facts.ok_or(MetadataError::MissingFacts(category))?;

        tags.add(Avu::new(attr::ALIGNMENT, flag(self.run.is_aligned)));
        tags.add(Avu::new(attr::IS_PAIRED_READ, flag(self.run.is_paired_read)));
        if self.run.is_aligned {
            if let Some(reference) = &self.run.reference {
                tags.add(Avu::new(attr::REFERENCE, reference.as_str()));
            }
        }
        tags.add(Avu::new(attr::NUM_READS, facts.num_reads.to_string()));
        tags.add(Avu::new(attr::SEQCHKSUM, facts.digest.as_str()));
        tags.add(Avu::new(
            attr::COMPOSITION,
            product.composition.canonical_json()?,
        ));
        tags.add(Avu::new(attr::ID_PRODUCT, product.composition.digest()?));

        Ok(tags)
    }

    /// Identity tags and grants. Run-level objects (no product) get only the
    /// run-level group grant.
    pub fn secondary_tags(
        &self,
        product: Option<&Product>,
        with_spiked_control: bool,
    ) -> Result<Annotation, MetadataError> {
        match product {
            Some(product) => Ok(self
                .identity
                .tags_and_permissions(product, with_spiked_control)?),
            None => Ok(Annotation {
                tags: MetadataSet::new(),
                permissions: self
                    .run_level_group
                    .iter()
                    .map(Permission::read)
                    .collect(),
            }),
        }
    }
}

/// Combine primary and secondary tags; primary attributes win.
pub fn combine(primary: MetadataSet, secondary: &MetadataSet) -> MetadataSet {
    let mut tags = primary;
    tags.merge_absent(secondary);
    tags
}

/// Tags for an object created by this publish.
pub fn creation_tags(remote_path: &str, now: DateTime<Utc>) -> MetadataSet {
    let mut tags = MetadataSet::new();
    tags.add(Avu::new(attr::CREATED, timestamp(now)));
    if let Some(ext) = file_type(remote_path) {
        tags.add(Avu::new(attr::TYPE, ext));
    }
    tags
}

/// Tag for an object whose content was replaced.
pub fn modification_tags(now: DateTime<Utc>) -> MetadataSet {
    std::iter::once(Avu::new(attr::MODIFIED, timestamp(now))).collect()
}

fn file_type(remote_path: &str) -> Option<&str> {
    let name = remote_path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
