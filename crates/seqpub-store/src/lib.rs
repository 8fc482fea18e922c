//! Remote archival store capability.
//!
//! The publisher talks to the archive only through [`RemoteStore`]. Two
//! implementations ship with the crate: [`FsStore`], a durable store rooted
//! at a local directory, and [`MemoryStore`], an in-process store with a call
//! log and failure injection for tests.

mod avu;
mod digest;
mod fs;
mod memory;

pub use avu::{reconcile_acl, AccessLevel, Avu, ManagedOwners, MetadataSet, Permission};
pub use digest::ContentDigest;
pub use fs::FsStore;
pub use memory::{FailureRule, MemoryStore, StoreCall, StoreOp};

use std::io;
use std::path::Path;

/// Errors raised by a remote store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid remote path: {0}")]
    InvalidPath(String),

    #[error("{op} rejected for {path}: {reason}")]
    Rejected {
        op: StoreOp,
        path: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Operations the publisher needs from the archive.
///
/// Implementations handle their own transport, authentication and retry;
/// callers treat every error as final for that call.
pub trait RemoteStore: Send + Sync {
    /// Whether a data object exists at `path`.
    fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Content digest of the object at `path`.
    fn digest(&self, path: &str) -> Result<ContentDigest, StoreError>;

    /// Create the collection and its parents if absent.
    fn ensure_collection(&self, path: &str) -> Result<(), StoreError>;

    /// Create or overwrite the object at `path` with the content of `local`.
    fn put(&self, path: &str, local: &Path) -> Result<(), StoreError>;

    /// Current metadata of the object at `path`.
    fn metadata(&self, path: &str) -> Result<MetadataSet, StoreError>;

    /// Replace the value set of every attribute in `tags`; other attributes
    /// are left alone.
    fn set_metadata(&self, path: &str, tags: &MetadataSet) -> Result<(), StoreError>;

    /// Grant each permission, replacing any existing level for its owner,
    /// and revoke grants of `managed` owners that are not in `acl`.
    fn set_permissions(
        &self,
        path: &str,
        acl: &[Permission],
        managed: &ManagedOwners,
    ) -> Result<(), StoreError>;
}

/// Join a collection and a child name with a single `/`.
pub fn join_path(collection: &str, name: &str) -> String {
    let collection = collection.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if collection.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", collection, name)
    }
}

/// Parent collection of a remote path.
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

/// Validate an absolute, normalised remote path.
pub fn validate_path(path: &str) -> Result<(), StoreError> {
    if !path.starts_with('/') {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let bad_segment = path
        .split('/')
        .skip(1)
        .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad_segment && path != "/" {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/seq/12345", "a.cram"), "/seq/12345/a.cram");
        assert_eq!(join_path("/seq/12345/", "/a.cram"), "/seq/12345/a.cram");
        assert_eq!(join_path("", "a.cram"), "/a.cram");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/seq/12345/a.cram"), Some("/seq/12345"));
        assert_eq!(parent_path("/seq"), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/seq/12345/qc").is_ok());
        assert!(validate_path("/").is_ok());
        assert!(validate_path("seq/12345").is_err());
        assert!(validate_path("/seq/../etc").is_err());
        assert!(validate_path("/seq//x").is_err());
    }
}
