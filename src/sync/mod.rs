//! Batch publisher
//!
//! Moves local files into one remote collection. Content moves only when it
//! differs from what the checkpoint says the store already holds; metadata
//! and permissions are reconciled on every attempt. Each file succeeds or
//! fails on its own, and the checkpoint is flushed after every file.

mod budget;
mod state;

pub use budget::{BatchCounts, ErrorBudget};
pub use state::{FileState, StateError};

use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use seqpub_store::{join_path, ContentDigest, ManagedOwners, MetadataSet, RemoteStore, StoreError};

use crate::checkpoint::{CheckpointStore, PublishStatus};
use crate::error::PublishError;
use crate::metadata::{combine, creation_tags, modification_tags, Annotation, MetadataError};

/// The object a tag callback is asked about.
#[derive(Debug, Clone, Copy)]
pub struct RemoteObject<'a> {
    pub local: &'a Path,
    pub remote_path: &'a str,
    pub collection: &'a str,
}

/// Builds run and category tags for one object.
pub type PrimaryTagsFn<'a> = dyn Fn(&RemoteObject<'_>) -> Result<MetadataSet, MetadataError> + 'a;

/// Builds identity tags and permission grants for one object.
pub type SecondaryTagsFn<'a> = dyn Fn(&RemoteObject<'_>) -> Result<Annotation, MetadataError> + 'a;

/// Progress of one file through a publish attempt.
#[derive(Debug)]
struct Attempt {
    state: FileState,
    /// Digest of content the store now holds because of this attempt.
    transferred: Option<ContentDigest>,
}

/// Transfers batches of files and keeps the checkpoint and error budget.
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    checkpoint: CheckpointStore,
    budget: ErrorBudget,
    force: bool,
    managed: ManagedOwners,
    collections: BTreeSet<String>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        checkpoint: CheckpointStore,
        max_errors: Option<usize>,
        force: bool,
    ) -> Self {
        Self {
            store,
            checkpoint,
            budget: ErrorBudget::new(max_errors),
            force,
            managed: ManagedOwners::new(),
            collections: BTreeSet::new(),
        }
    }

    /// Owners whose grants are revoked when a file no longer calls for them.
    pub fn with_managed_owners(mut self, managed: ManagedOwners) -> Self {
        self.managed = managed;
        self
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    /// Charge a failure raised outside a batch to the shared budget.
    pub fn charge_error(&mut self) -> usize {
        self.budget.record()
    }

    pub fn checkpoint(&mut self) -> &mut CheckpointStore {
        &mut self.checkpoint
    }

    /// Publish `files` into `collection`.
    ///
    /// Every file is counted as considered, including any left unattempted
    /// because the error budget ran out.
    #[instrument(skip_all, fields(collection = %collection, files = files.len()))]
    pub fn publish_batch(
        &mut self,
        files: &[PathBuf],
        collection: &str,
        primary: &PrimaryTagsFn<'_>,
        secondary: &SecondaryTagsFn<'_>,
    ) -> BatchCounts {
        let mut counts = BatchCounts::new(files.len(), 0, 0);

        if self.budget.is_exceeded() {
            warn!(errors = self.budget.errors(), "error budget exhausted, batch skipped");
            return counts;
        }

        for (idx, file) in files.iter().enumerate() {
            match self.publish_file(file, collection, primary, secondary) {
                FileState::Published => counts.published += 1,
                FileState::Failed => counts.errors += 1,
                _ => {}
            }

            if self.budget.is_exceeded() {
                let remaining = files.len() - idx - 1;
                error!(
                    errors = self.budget.errors(),
                    max = ?self.budget.max(),
                    remaining,
                    "error budget exceeded, stopping batch"
                );
                break;
            }
        }

        info!(
            considered = counts.considered,
            published = counts.published,
            errors = counts.errors,
            "batch finished"
        );
        counts
    }

    /// Run one file to a terminal state and flush the checkpoint.
    fn publish_file(
        &mut self,
        file: &Path,
        collection: &str,
        primary: &PrimaryTagsFn<'_>,
        secondary: &SecondaryTagsFn<'_>,
    ) -> FileState {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let remote_path = join_path(collection, &name);

        let mut attempt = Attempt {
            state: FileState::Unpublished,
            transferred: None,
        };

        let outcome = self
            .sync_file(file, &remote_path, collection, &mut attempt, primary, secondary)
            .and_then(|()| self.checkpoint.persist().map_err(PublishError::from));

        match outcome {
            Ok(()) => {
                debug!(file = %file.display(), remote = %remote_path, state = ?attempt.state, "file done");
                attempt.state
            }
            Err(e) => {
                let errors = self.budget.record();
                error!(
                    file = %file.display(),
                    remote = %remote_path,
                    error = %e,
                    errors,
                    "publish failed"
                );
                self.record_failure(file, &remote_path, attempt.transferred.take());
                FileState::Failed
            }
        }
    }

    fn sync_file(
        &mut self,
        file: &Path,
        remote_path: &str,
        collection: &str,
        attempt: &mut Attempt,
        primary: &PrimaryTagsFn<'_>,
        secondary: &SecondaryTagsFn<'_>,
    ) -> Result<(), PublishError> {
        let local = ContentDigest::of_file(file)?;
        let exists = self.store.exists(remote_path)?;
        // A record for a different destination says nothing about this one.
        let recorded = self
            .checkpoint
            .get(file)?
            .filter(|record| record.remote_path == remote_path)
            .and_then(|record| record.digest.clone());

        let unchanged = exists && recorded.as_ref() == Some(&local) && !self.force;
        let mut audit = MetadataSet::new();

        if unchanged {
            debug!(remote = %remote_path, "content unchanged, transfer skipped");
        } else {
            attempt.state.advance(FileState::Transferring)?;
            let overwrite_changed = exists && self.store.digest(remote_path)? != local;

            self.ensure_collection(collection)?;
            self.store.put(remote_path, file)?;
            attempt.transferred = Some(local.clone());

            let now = Utc::now();
            if !exists {
                audit = creation_tags(remote_path, now);
            } else if overwrite_changed {
                audit = modification_tags(now);
            }
            info!(remote = %remote_path, overwrite = exists, "content transferred");
        }

        let object = RemoteObject {
            local: file,
            remote_path,
            collection,
        };
        let primary_tags = primary(&object)?;
        let annotation = secondary(&object)?;

        let mut tags = combine(primary_tags, &annotation.tags);
        tags.replace_from(&audit);
        self.store.set_metadata(remote_path, &tags)?;
        self.store
            .set_permissions(remote_path, &annotation.permissions, &self.managed)?;

        let (status, target) = if unchanged {
            (PublishStatus::Skipped, FileState::Skipped)
        } else {
            (PublishStatus::Published, FileState::Published)
        };
        self.checkpoint
            .update(file, remote_path, status, Some(local))?;
        attempt.state.advance(target)?;
        Ok(())
    }

    fn ensure_collection(&mut self, collection: &str) -> Result<(), StoreError> {
        if !self.collections.contains(collection) {
            self.store.ensure_collection(collection)?;
            self.collections.insert(collection.to_string());
        }
        Ok(())
    }

    /// Mark a file failed and flush, keeping its last-known digest unless
    /// this attempt already replaced the remote content.
    fn record_failure(&mut self, file: &Path, remote_path: &str, transferred: Option<ContentDigest>) {
        let result = self
            .checkpoint
            .update(file, remote_path, PublishStatus::Failed, transferred)
            .and_then(|_| self.checkpoint.persist());
        if let Err(e) = result {
            error!(file = %file.display(), error = %e, "failed to checkpoint failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::attr;
    use seqpub_store::{Avu, MemoryStore, Permission, StoreOp};
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                store: Arc::new(MemoryStore::new()),
            }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn engine(&self, max_errors: Option<usize>, force: bool) -> SyncEngine {
            SyncEngine::new(
                self.store.clone(),
                CheckpointStore::new(self.dir.path().join("published.json")),
                max_errors,
                force,
            )
        }
    }

    fn primary(_: &RemoteObject<'_>) -> Result<MetadataSet, MetadataError> {
        Ok(std::iter::once(Avu::new(attr::ID_RUN, "1")).collect())
    }

    fn secondary(_: &RemoteObject<'_>) -> Result<Annotation, MetadataError> {
        Ok(Annotation {
            tags: std::iter::once(Avu::new(attr::STUDY_ID, "7")).collect(),
            permissions: vec![Permission::read("ss_7")],
        })
    }

    #[test]
    fn test_publish_new_files() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a"), h.file("a.cram.crai", "i")];

        let mut engine = h.engine(None, false);
        let counts = engine.publish_batch(&files, "/seq/1", &primary, &secondary);

        assert_eq!(counts, BatchCounts::new(2, 2, 0));
        assert_eq!(h.store.content("/seq/1/a.cram"), Some(b"a".to_vec()));

        let tags = h.store.object_metadata("/seq/1/a.cram").unwrap();
        assert_eq!(tags.value(attr::ID_RUN), Some("1"));
        assert_eq!(tags.value(attr::STUDY_ID), Some("7"));
        assert_eq!(tags.value(attr::TYPE), Some("cram"));
        assert!(tags.contains_attribute(attr::CREATED));
        assert_eq!(h.store.object_acl("/seq/1/a.cram"), vec![Permission::read("ss_7")]);
    }

    #[test]
    fn test_second_run_skips_transfer_but_reconciles() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a")];

        h.engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        h.store.reset_calls();

        let mut engine = h.engine(None, false);
        let counts = engine.publish_batch(&files, "/seq/1", &primary, &secondary);

        assert_eq!(counts, BatchCounts::new(1, 0, 0));
        assert_eq!(h.store.count(StoreOp::Put), 0);
        assert_eq!(h.store.count(StoreOp::SetMetadata), 1);
        assert_eq!(h.store.count(StoreOp::SetPermissions), 1);

        let record = engine.checkpoint().get(&files[0]).unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Skipped);
    }

    #[test]
    fn test_force_transfers_unchanged_content() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a")];
        h.engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        h.store.reset_calls();

        let counts = h
            .engine(None, true)
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        assert_eq!(counts.published, 1);
        assert_eq!(h.store.count(StoreOp::Put), 1);
        let tags = h.store.object_metadata("/seq/1/a.cram").unwrap();
        assert!(!tags.contains_attribute(attr::MODIFIED));
    }

    #[test]
    fn test_changed_content_is_retransferred_and_marked_modified() {
        let h = Harness::new();
        let a = h.file("a.cram", "a");
        let b = h.file("b.cram", "b");
        let files = vec![a.clone(), b.clone()];
        h.engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);

        let before = CheckpointStore::read(&h.dir.path().join("published.json")).unwrap();
        fs::write(&a, "a2").unwrap();
        h.store.reset_calls();

        let counts = h
            .engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        assert_eq!(counts, BatchCounts::new(2, 1, 0));
        assert_eq!(h.store.count_for(StoreOp::Put, "/seq/1/a.cram"), 1);
        assert_eq!(h.store.count_for(StoreOp::Put, "/seq/1/b.cram"), 0);

        let tags = h.store.object_metadata("/seq/1/a.cram").unwrap();
        assert!(tags.contains_attribute(attr::MODIFIED));

        let after = CheckpointStore::read(&h.dir.path().join("published.json")).unwrap();
        let key_a = a.to_string_lossy().to_string();
        let key_b = b.to_string_lossy().to_string();
        assert_eq!(after[&key_a].digest, Some(ContentDigest::of_bytes(b"a2")));
        assert_eq!(after[&key_b].digest, before[&key_b].digest);
    }

    #[test]
    fn test_missing_checkpoint_record_retransfers() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a")];
        h.engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        fs::remove_file(h.dir.path().join("published.json")).unwrap();
        h.store.reset_calls();

        let counts = h
            .engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        assert_eq!(counts.published, 1);
        let tags = h.store.object_metadata("/seq/1/a.cram").unwrap();
        assert!(!tags.contains_attribute(attr::MODIFIED));
    }

    #[test]
    fn test_new_destination_replaces_unrelated_object() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a")];
        h.engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);

        let stale = h.file("other.cram", "stale content");
        h.store.ensure_collection("/seq/1/alt").unwrap();
        h.store.put("/seq/1/alt/a.cram", &stale).unwrap();

        let mut engine = h.engine(None, false);
        let counts = engine.publish_batch(&files, "/seq/1/alt", &primary, &secondary);

        assert_eq!(counts, BatchCounts::new(1, 1, 0));
        assert_eq!(h.store.content("/seq/1/alt/a.cram"), Some(b"a".to_vec()));
        let tags = h.store.object_metadata("/seq/1/alt/a.cram").unwrap();
        assert!(tags.contains_attribute(attr::MODIFIED));
        let record = engine.checkpoint().get(&files[0]).unwrap().unwrap();
        assert_eq!(record.remote_path, "/seq/1/alt/a.cram");
    }

    #[test]
    fn test_withdrawn_managed_grant_is_revoked() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a")];
        let managed = ManagedOwners::new().with_prefix("ss_");
        h.engine(None, false)
            .with_managed_owners(managed.clone())
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        h.store
            .set_permissions(
                "/seq/1/a.cram",
                &[Permission::read("lab_admins")],
                &ManagedOwners::new(),
            )
            .unwrap();

        let moved = |_: &RemoteObject<'_>| -> Result<Annotation, MetadataError> {
            Ok(Annotation {
                tags: std::iter::once(Avu::new(attr::STUDY_ID, "8")).collect(),
                permissions: vec![Permission::read("ss_8")],
            })
        };
        h.engine(None, false)
            .with_managed_owners(managed)
            .publish_batch(&files, "/seq/1", &primary, &moved);

        assert_eq!(
            h.store.object_acl("/seq/1/a.cram"),
            vec![Permission::read("lab_admins"), Permission::read("ss_8")]
        );
    }

    #[test]
    fn test_single_failure_does_not_stop_batch() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a"), h.file("b.cram", "b"), h.file("c.cram", "c")];
        h.store.fail(StoreOp::Put, "b.cram");

        let mut engine = h.engine(None, false);
        let counts = engine.publish_batch(&files, "/seq/1", &primary, &secondary);

        assert_eq!(counts, BatchCounts::new(3, 2, 1));
        assert_eq!(engine.budget().errors(), 1);
        let record = engine.checkpoint().get(&files[1]).unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Failed);
        assert_eq!(record.digest, None);
    }

    #[test]
    fn test_metadata_failure_after_transfer_keeps_new_digest() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a")];
        h.store.fail(StoreOp::SetMetadata, "a.cram");

        let mut engine = h.engine(None, false);
        let counts = engine.publish_batch(&files, "/seq/1", &primary, &secondary);
        assert_eq!(counts, BatchCounts::new(1, 0, 1));

        let record = engine.checkpoint().get(&files[0]).unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Failed);
        assert_eq!(record.digest, Some(ContentDigest::of_bytes(b"a")));

        h.store.clear_failures();
        h.store.reset_calls();
        let counts = h
            .engine(None, false)
            .publish_batch(&files, "/seq/1", &primary, &secondary);
        assert_eq!(counts, BatchCounts::new(1, 0, 0));
        assert_eq!(h.store.count(StoreOp::Put), 0);
    }

    #[test]
    fn test_tag_callback_failure_counts() {
        let h = Harness::new();
        let files = vec![h.file("a.cram", "a")];
        let failing = |_: &RemoteObject<'_>| -> Result<MetadataSet, MetadataError> {
            Err(MetadataError::MissingFacts(seqpub_catalog::Category::Alignment))
        };

        let counts = h
            .engine(None, false)
            .publish_batch(&files, "/seq/1", &failing, &secondary);
        assert_eq!(counts.errors, 1);
    }

    #[test]
    fn test_budget_stops_batch() {
        let h = Harness::new();
        let files: Vec<PathBuf> = (0..5)
            .map(|i| h.file(&format!("f{}.cram", i), &i.to_string()))
            .collect();
        h.store.fail(StoreOp::Put, ".cram");

        let mut engine = h.engine(Some(1), false);
        let counts = engine.publish_batch(&files, "/seq/1", &primary, &secondary);

        assert_eq!(counts, BatchCounts::new(5, 0, 2));
        assert_eq!(h.store.count(StoreOp::Put), 2);
        assert!(engine.budget().is_exceeded());

        h.store.clear_failures();
        let counts = engine.publish_batch(&files, "/seq/1", &primary, &secondary);
        assert_eq!(counts, BatchCounts::new(5, 0, 0));
        assert_eq!(h.store.count(StoreOp::Put), 2);
    }
}
