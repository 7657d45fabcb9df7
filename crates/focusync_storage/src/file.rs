//! File-based tombstone store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{TombstoneKey, TombstoneStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const FORMAT_VERSION: u32 = 1;

/// On-disk representation of one tombstone set.
#[derive(Debug, Serialize, Deserialize)]
struct TombstoneDocument {
    version: u32,
    collection: String,
    owner: String,
    ids: BTreeSet<String>,
}

/// A file-based tombstone store.
///
/// Each key is stored as `<root>/<collection>/<sha256(owner)>.json`. Owner
/// IDs are hashed so arbitrary account identifiers map to safe file names;
/// the document repeats the plain key so a misplaced file is detected.
///
/// # Durability
///
/// `save` writes a sibling temp file, calls `File::sync_all()` and renames
/// it over the target, so a crash leaves either the old or the new set.
///
/// # Example
///
/// ```no_run
/// use focusync_storage::{FileTombstoneStore, TombstoneKey, TombstoneStore};
/// use std::collections::BTreeSet;
/// use std::path::Path;
///
/// let store = FileTombstoneStore::open(Path::new("sync-state")).unwrap();
/// let key = TombstoneKey::new("presets", "alice");
/// store.save(&key, &BTreeSet::from(["p1".to_string()])).unwrap();
/// ```
#[derive(Debug)]
pub struct FileTombstoneStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTombstoneStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file that holds `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection name is not a plain identifier.
    pub fn path_for(&self, key: &TombstoneKey) -> StorageResult<PathBuf> {
        let valid = !key.collection.is_empty()
            && key
                .collection
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid collection name {:?}", key.collection),
            )));
        }

        let digest = Sha256::digest(key.owner.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Ok(self.root.join(&key.collection).join(format!("{name}.json")))
    }
}

impl TombstoneStore for FileTombstoneStore {
    fn load(&self, key: &TombstoneKey) -> StorageResult<BTreeSet<String>> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let doc: TombstoneDocument = serde_json::from_slice(&bytes)?;
        if doc.version != FORMAT_VERSION {
            return Err(StorageError::Corrupted(format!(
                "unsupported tombstone format version {} in {}",
                doc.version,
                path.display()
            )));
        }
        if doc.collection != key.collection || doc.owner != key.owner {
            return Err(StorageError::Corrupted(format!(
                "{} holds {}/{}, expected {}",
                path.display(),
                doc.collection,
                doc.owner,
                key
            )));
        }

        Ok(doc.ids)
    }

    fn save(&self, key: &TombstoneKey, ids: &BTreeSet<String>) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock();

        if ids.is_empty() {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let doc = TombstoneDocument {
            version: FORMAT_VERSION,
            collection: key.collection.clone(),
            owner: key.owner.clone(),
            ids: ids.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        let tmp = path.with_extension("json.tmp");
        {
            let mut file: File = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(key = %key, count = ids.len(), "tombstones persisted");
        Ok(())
    }
}
