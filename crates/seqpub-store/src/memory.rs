//! In-process store for tests.
//!
//! Records every call and supports per-operation failure injection, so the
//! publisher can be exercised without an archive.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::{
    parent_path, reconcile_acl, validate_path, AccessLevel, ContentDigest, ManagedOwners,
    MetadataSet, Permission, RemoteStore, StoreError,
};

/// Store operation, used for call logging and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Exists,
    Digest,
    EnsureCollection,
    Put,
    Metadata,
    SetMetadata,
    SetPermissions,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreOp::Exists => "exists",
            StoreOp::Digest => "digest",
            StoreOp::EnsureCollection => "ensure_collection",
            StoreOp::Put => "put",
            StoreOp::Metadata => "metadata",
            StoreOp::SetMetadata => "set_metadata",
            StoreOp::SetPermissions => "set_permissions",
        };
        f.write_str(s)
    }
}

/// One logged call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub path: String,
}

/// Failure injection rule.
#[derive(Debug, Clone)]
pub struct FailureRule {
    /// Operation to fail.
    pub op: StoreOp,
    /// Only paths containing this fragment fail (None = every path).
    pub path_fragment: Option<String>,
    /// Failures left before the rule stops firing (None = always fail).
    pub remaining: Option<u32>,
}

impl FailureRule {
    pub fn always(op: StoreOp) -> Self {
        Self {
            op,
            path_fragment: None,
            remaining: None,
        }
    }

    pub fn for_path(mut self, fragment: impl Into<String>) -> Self {
        self.path_fragment = Some(fragment.into());
        self
    }

    pub fn times(mut self, count: u32) -> Self {
        self.remaining = Some(count);
        self
    }

    fn matches(&self, op: StoreOp, path: &str) -> bool {
        self.op == op
            && self.remaining.map_or(true, |n| n > 0)
            && self
                .path_fragment
                .as_deref()
                .map_or(true, |fragment| path.contains(fragment))
    }
}

#[derive(Debug, Default, Clone)]
struct StoredObject {
    content: Vec<u8>,
    metadata: MetadataSet,
    acl: BTreeMap<String, AccessLevel>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    collections: BTreeSet<String>,
    calls: Vec<StoreCall>,
    rules: Vec<FailureRule>,
}

/// In-memory [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.lock().collections.insert("/".to_string());
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a failure rule.
    pub fn inject(&self, rule: FailureRule) {
        self.lock().rules.push(rule);
    }

    /// Fail every call of `op` whose path contains `fragment`.
    pub fn fail(&self, op: StoreOp, fragment: &str) {
        self.inject(FailureRule::always(op).for_path(fragment));
    }

    /// Remove all failure rules.
    pub fn clear_failures(&self) {
        self.lock().rules.clear();
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Number of calls of one operation.
    pub fn count(&self, op: StoreOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Number of calls of one operation on one path.
    pub fn count_for(&self, op: StoreOp, path: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == op && c.path == path)
            .count()
    }

    /// Forget the call log, keeping objects and rules.
    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    /// Content of a stored object.
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).map(|o| o.content.clone())
    }

    /// Metadata of a stored object without logging a call.
    pub fn object_metadata(&self, path: &str) -> Option<MetadataSet> {
        self.lock().objects.get(path).map(|o| o.metadata.clone())
    }

    /// Access-control list of a stored object.
    pub fn object_acl(&self, path: &str) -> Vec<Permission> {
        self.lock()
            .objects
            .get(path)
            .map(|o| {
                o.acl
                    .iter()
                    .map(|(owner, level)| Permission {
                        owner: owner.clone(),
                        level: *level,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Paths of all stored objects, sorted.
    pub fn object_paths(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn has_collection(&self, path: &str) -> bool {
        self.lock().collections.contains(path)
    }

    /// Log a call and apply any matching failure rule.
    fn enter(&self, op: StoreOp, path: &str) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall {
            op,
            path: path.to_string(),
        });

        if let Some(rule) = inner.rules.iter_mut().find(|r| r.matches(op, path)) {
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return Err(StoreError::Rejected {
                op,
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        Ok(inner)
    }
}

impl RemoteStore for MemoryStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let inner = self.enter(StoreOp::Exists, path)?;
        Ok(inner.objects.contains_key(path))
    }

    fn digest(&self, path: &str) -> Result<ContentDigest, StoreError> {
        let inner = self.enter(StoreOp::Digest, path)?;
        inner
            .objects
            .get(path)
            .map(|o| ContentDigest::of_bytes(&o.content))
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn ensure_collection(&self, path: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        let mut inner = self.enter(StoreOp::EnsureCollection, path)?;
        let mut current = Some(path);
        while let Some(p) = current {
            inner.collections.insert(p.to_string());
            current = parent_path(p);
        }
        Ok(())
    }

    fn put(&self, path: &str, local: &Path) -> Result<(), StoreError> {
        validate_path(path)?;
        let content = fs::read(local)?;
        let mut inner = self.enter(StoreOp::Put, path)?;

        let parent = parent_path(path).ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        if !inner.collections.contains(parent) {
            return Err(StoreError::NotFound(parent.to_string()));
        }

        inner.objects.entry(path.to_string()).or_default().content = content;
        Ok(())
    }

    fn metadata(&self, path: &str) -> Result<MetadataSet, StoreError> {
        let inner = self.enter(StoreOp::Metadata, path)?;
        inner
            .objects
            .get(path)
            .map(|o| o.metadata.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn set_metadata(&self, path: &str, tags: &MetadataSet) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOp::SetMetadata, path)?;
        let object = inner
            .objects
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        object.metadata.replace_from(tags);
        Ok(())
    }

    fn set_permissions(
        &self,
        path: &str,
        acl: &[Permission],
        managed: &ManagedOwners,
    ) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOp::SetPermissions, path)?;
        let object = inner
            .objects
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        reconcile_acl(&mut object.acl, acl, managed);
        Ok(())
    }
}
