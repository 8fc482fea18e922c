//! Filesystem-backed store.
//!
//! Layout under the root directory:
//! - `<root>/<remote path>`: object content; collections are directories
//! - `<root>/.seqpub/<remote path>.json`: object metadata and ACL
//!
//! Content and sidecars are written to a temporary file and renamed into
//! place, so a crash never leaves a torn object behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{
    reconcile_acl, validate_path, AccessLevel, ContentDigest, ManagedOwners, MetadataSet,
    Permission, RemoteStore, StoreError,
};

/// Directory under the root holding metadata sidecars.
pub const SIDECAR_DIR: &str = ".seqpub";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    #[serde(default)]
    metadata: MetadataSet,
    #[serde(default)]
    acl: BTreeMap<String, AccessLevel>,
}

/// [`RemoteStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(SIDECAR_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_path(path)?;
        let relative = path.trim_start_matches('/');
        if relative.split('/').next() == Some(SIDECAR_DIR) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn sidecar_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_path(path)?;
        let relative = path.trim_start_matches('/');
        Ok(self.root.join(SIDECAR_DIR).join(format!("{}.json", relative)))
    }

    fn object_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let local = self.local_path(path)?;
        if !local.is_file() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(local)
    }

    fn read_sidecar(&self, path: &str) -> Result<Sidecar, StoreError> {
        let sidecar = self.sidecar_path(path)?;
        match fs::read_to_string(&sidecar) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_sidecar(&self, path: &str, sidecar: &Sidecar) -> Result<(), StoreError> {
        let target = self.sidecar_path(path)?;
        let json = serde_json::to_vec_pretty(sidecar)?;
        atomic_write(&target, |file| file.write_all(&json))?;
        Ok(())
    }
}

/// Write `target` through a sibling temporary file and rename it into place.
fn atomic_write<F>(target: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = dir.join(format!(".{}.tmp", file_name));

    let mut file = File::create(&temp)?;
    write(&mut file)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp, target)
}

impl RemoteStore for FsStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.local_path(path)?.is_file())
    }

    fn digest(&self, path: &str) -> Result<ContentDigest, StoreError> {
        let local = self.object_path(path)?;
        Ok(ContentDigest::of_file(&local)?)
    }

    fn ensure_collection(&self, path: &str) -> Result<(), StoreError> {
        let local = self.local_path(path)?;
        fs::create_dir_all(&local)?;
        Ok(())
    }

    fn put(&self, path: &str, local: &Path) -> Result<(), StoreError> {
        let target = self.local_path(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        if !parent.is_dir() {
            return Err(StoreError::NotFound(path.to_string()));
        }

        let mut source = File::open(local)?;
        atomic_write(&target, |file| io::copy(&mut source, file).map(|_| ()))?;
        debug!(remote = %path, local = %local.display(), "stored object");
        Ok(())
    }

    fn metadata(&self, path: &str) -> Result<MetadataSet, StoreError> {
        self.object_path(path)?;
        Ok(self.read_sidecar(path)?.metadata)
    }

    fn set_metadata(&self, path: &str, tags: &MetadataSet) -> Result<(), StoreError> {
        self.object_path(path)?;
        let mut sidecar = self.read_sidecar(path)?;
        sidecar.metadata.replace_from(tags);
        self.write_sidecar(path, &sidecar)
    }

    fn set_permissions(
        &self,
        path: &str,
        acl: &[Permission],
        managed: &ManagedOwners,
    ) -> Result<(), StoreError> {
        self.object_path(path)?;
        let mut sidecar = self.read_sidecar(path)?;
        reconcile_acl(&mut sidecar.acl, acl, managed);
        self.write_sidecar(path, &sidecar)
    }
}
