//! seqpub - publish sequencing run output to an archival store
//!
//! Classifies a run directory's files, derives integrity facts and metadata
//! for them, and mirrors them into a remote store exactly once per content
//! version. Metadata and permissions are re-synchronised on every run. A
//! restart checkpoint makes runs resumable and a cumulative error budget
//! bounds how much a failing run keeps trying.

pub mod checkpoint;
pub mod composition;
pub mod config;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod metadata;
pub mod publisher;
pub mod summary;
pub mod sync;

pub use checkpoint::{CheckpointError, CheckpointRecord, CheckpointStore, PublishStatus};
pub use composition::{Component, Composition, CompositionError, Product};
pub use config::{ConfigError, EffectiveConfig, PublishConfig};
pub use error::PublishError;
pub use integrity::{IntegrityError, IntegrityFacts, IntegrityResolver};
pub use metadata::{
    Annotation, IdentityError, IdentityProvider, MetadataError, MetadataSynthesizer, NoIdentity,
    SampleSheetProvider,
};
pub use publisher::RunPublisher;
pub use summary::{CategoryReport, PublishSummary, Status};
pub use sync::{BatchCounts, ErrorBudget, FileState, RemoteObject, SyncEngine};

pub use seqpub_catalog::{Catalog, Category, FileCatalog, RunFile};
pub use seqpub_store::{FsStore, MemoryStore, RemoteStore};
