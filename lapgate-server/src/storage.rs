//! Local JSON document storage.
//!
//! Each document (the profile list, the race session) lives in its own
//! file and is loaded once at startup. After that the in-memory copy is
//! authoritative and every change is a critical section under the
//! document's mutex:
//!
//! ```text
//! lock ──▶ clone ──▶ mutate clone ──▶ write file ──▶ swap in ──▶ unlock
//!                                         │
//!                                         └── on failure: nothing swapped in
//! ```
//!
//! Files are written to a temporary sibling and renamed over the previous file,
//! so a crash mid-write leaves the previous version intact.
//!
//! Storage path: `{data_dir}/rfid_data.json` and `{data_dir}/race_data.json`

use log::{debug, error, info};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// File name of the profile collection
pub const PROFILES_FILE: &str = "rfid_data.json";
/// File name of the race session
pub const RACE_FILE: &str = "race_data.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Document {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// A JSON document on disk with an in-memory copy behind a mutex
pub struct DocumentStore<T> {
    path: PathBuf,
    doc: Mutex<T>,
}

impl<T> DocumentStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// Load the document at `path`.
    ///
    /// A missing file is the normal first-run case and yields the default
    /// document. A file that exists but does not parse is an error; it is
    /// never silently replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
            }
        }

        let doc = match fs::File::open(&path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                let doc = serde_json::from_reader(reader).map_err(|e| StorageError::Corrupt {
                    path: path.clone(),
                    source: e,
                })?;
                debug!("Loaded document {}", path.display());
                doc
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No document at {}, starting empty", path.display());
                T::default()
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        Ok(DocumentStore {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> T {
        self.doc.lock().unwrap().clone()
    }

    /// Run `f` against the current document without changing it
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let doc = self.doc.lock().unwrap();
        f(&doc)
    }

    /// Change the document and persist it.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StorageError> {
        let mut doc = self.doc.lock().unwrap();
        let mut working = doc.clone();
        let result = f(&mut working);
        self.commit(&mut doc, working)?;
        Ok(result)
    }

    /// Change the document only when `f` returns `Some`.
    ///
    /// `None` means "nothing to do": the working copy is discarded and the
    /// file is not touched. On a write error the stored document stays as
    /// it was.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> Option<R>) -> Result<Option<R>, StorageError> {
        let mut doc = self.doc.lock().unwrap();
        let mut working = doc.clone();
        let Some(result) = f(&mut working) else {
            return Ok(None);
        };
        self.commit(&mut doc, working)?;
        Ok(Some(result))
    }

    fn commit(&self, doc: &mut T, working: T) -> Result<(), StorageError> {
        if let Err(e) = write_document(&self.path, &working) {
            error!("{}", e);
            return Err(e);
        }
        *doc = working;
        Ok(())
    }
}

fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = fs::File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
    let result = write_to(file, value)
        .map_err(|e| StorageError::io(&tmp, e))
        .and_then(|_| fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e)));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
        return result;
    }

    debug!("Stored document {}", path.display());
    Ok(())
}

fn write_to<T: Serialize>(file: fs::File, value: &T) -> io::Result<()> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
