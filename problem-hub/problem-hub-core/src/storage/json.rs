use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::Collection;
use crate::error::{HubError, Result};

pub struct JsonStore {
    data_dir: PathBuf,
    locks: Mutex<HashMap<&'static str, Arc<Mutex<()>>>>,
}

impl JsonStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|e| HubError::io(&data_dir, e))?;
        Ok(Self {
            data_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path<C: Collection>(&self) -> PathBuf {
        self.data_dir.join(C::file_name())
    }

    /// Read the whole document, creating the file with the empty default if
    /// it does not exist yet.
    pub fn load<C: Collection>(&self) -> Result<C::Document> {
        let path = self.path::<C>();
        match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| HubError::Parse { path, source })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => self.initialize::<C>(&path),
            Err(e) => Err(HubError::io(path, e)),
        }
    }

    /// Serialize the document and replace the file in full.
    pub fn save<C: Collection>(&self, doc: &C::Document) -> Result<()> {
        let path = self.path::<C>();
        let bytes = to_pretty_json(doc)?;
        let tmp = self.scratch_path::<C>();
        fs::write(&tmp, bytes).map_err(|e| HubError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| HubError::io(&path, e))?;
        debug!(collection = C::NAME, "saved collection");
        Ok(())
    }

    /// Read-modify-write under the collection's lock. The document is only
    /// written back when `f` succeeds.
    pub fn update<C, R, F>(&self, f: F) -> Result<R>
    where
        C: Collection,
        F: FnOnce(&mut C::Document) -> Result<R>,
    {
        let lock = self.lock_for::<C>();
        let _guard = lock.lock();
        let mut doc = self.load::<C>()?;
        let out = f(&mut doc)?;
        self.save::<C>(&doc)?;
        Ok(out)
    }

    fn lock_for<C: Collection>(&self) -> Arc<Mutex<()>> {
        self.locks.lock().entry(C::NAME).or_default().clone()
    }

    fn scratch_path<C: Collection>(&self) -> PathBuf {
        self.data_dir
            .join(format!(".{}.{}.tmp", C::NAME, Uuid::new_v4().simple()))
    }

    fn initialize<C: Collection>(&self, path: &Path) -> Result<C::Document> {
        let doc = C::Document::default();
        let tmp = self.scratch_path::<C>();
        fs::write(&tmp, to_pretty_json(&doc)?).map_err(|e| HubError::io(&tmp, e))?;
        // hard_link refuses to replace an existing file, so a concurrent
        // initializer cannot clobber a document that already has content.
        let linked = fs::hard_link(&tmp, path);
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => {
                debug!(collection = C::NAME, "initialized empty collection");
                Ok(doc)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self.load::<C>(),
            Err(e) => Err(HubError::io(path, e)),
        }
    }
}

/// Pretty JSON with four-space indentation.
pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser)?;
    Ok(out)
}
