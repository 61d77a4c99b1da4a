//! Atomic file operations.
//!
//! Every write goes to a temporary sibling, is fsynced, then renamed over
//! the target, so readers see either the old or the new content. Read-modify-
//! write sequences additionally hold an exclusive lock on a `.lock` sibling.

use scena_core::SceneError;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during atomic file operations.
#[derive(Debug, Error)]
pub enum AtomicFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Lock error on {path}: {message}")]
    Lock { path: PathBuf, message: String },
}

impl AtomicFileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<AtomicFileError> for SceneError {
    fn from(err: AtomicFileError) -> Self {
        match err {
            AtomicFileError::Io { .. } | AtomicFileError::Lock { .. } => {
                SceneError::io(err.to_string())
            }
            AtomicFileError::Json(e) => e.into(),
            AtomicFileError::TomlDe(e) => e.into(),
            AtomicFileError::TomlSer(e) => e.into(),
        }
    }
}

/// On-disk encoding of an [`AtomicFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    fn encode<T: Serialize>(self, data: &T) -> Result<Vec<u8>, AtomicFileError> {
        match self {
            FileFormat::Json => Ok(serde_json::to_vec_pretty(data)?),
            FileFormat::Toml => Ok(toml::to_string_pretty(data)?.into_bytes()),
        }
    }

    fn decode<T: DeserializeOwned>(self, content: &str) -> Result<T, AtomicFileError> {
        match self {
            FileFormat::Json => Ok(serde_json::from_str(content)?),
            FileFormat::Toml => Ok(toml::from_str(content)?),
        }
    }
}

/// A typed handle to a file written atomically.
pub struct AtomicFile<T> {
    path: PathBuf,
    format: FileFormat,
    _phantom: PhantomData<T>,
}

impl<T> AtomicFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf, format: FileFormat) -> Self {
        Self {
            path,
            format,
            _phantom: PhantomData,
        }
    }

    pub fn json(path: PathBuf) -> Self {
        Self::new(path, FileFormat::Json)
    }

    pub fn toml(path: PathBuf) -> Self {
        Self::new(path, FileFormat::Toml)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and decodes the file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and decoded
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err`: Failed to read or parse the file
    pub fn load(&self) -> Result<Option<T>, AtomicFileError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| AtomicFileError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(self.format.decode(&content)?))
    }

    /// Encodes `data` and replaces the file atomically.
    pub fn save(&self, data: &T) -> Result<(), AtomicFileError> {
        let bytes = self.format.encode(data)?;
        write_atomic(&self.path, &bytes)
    }

    /// Read-modify-write under an exclusive lock.
    ///
    /// `default_value` is used when the file does not exist yet.
    pub fn update<F>(&self, default_value: T, f: F) -> Result<T, AtomicFileError>
    where
        F: FnOnce(&mut T),
        T: Clone,
    {
        with_lock(&self.path, || {
            let mut data = self.load()?.unwrap_or(default_value);
            f(&mut data);
            self.save(&data)?;
            Ok(data)
        })
    }
}

/// Writes `bytes` to `path` via temp file, fsync and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AtomicFileError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| AtomicFileError::io(parent, e))?;
        }
    }

    let tmp_path = temp_path(path)?;
    let mut tmp_file = File::create(&tmp_path).map_err(|e| AtomicFileError::io(&tmp_path, e))?;
    tmp_file
        .write_all(bytes)
        .and_then(|_| tmp_file.sync_all())
        .map_err(|e| AtomicFileError::io(&tmp_path, e))?;
    drop(tmp_file);

    fs::rename(&tmp_path, path).map_err(|e| AtomicFileError::io(path, e))?;
    Ok(())
}

/// Removes a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<bool, AtomicFileError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AtomicFileError::io(path, e)),
    }
}

/// Runs `f` while holding an exclusive lock associated with `path`.
pub fn with_lock<R, F>(path: &Path, f: F) -> Result<R, AtomicFileError>
where
    F: FnOnce() -> Result<R, AtomicFileError>,
{
    let _lock = FileLock::acquire(path)?;
    f()
}

fn temp_path(path: &Path) -> Result<PathBuf, AtomicFileError> {
    let parent = path.parent().ok_or_else(|| {
        AtomicFileError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no parent directory"),
        )
    })?;
    let file_name = path.file_name().ok_or_else(|| {
        AtomicFileError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no file name"),
        )
    })?;
    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}

/// Exclusive lock released on drop.
struct FileLock {
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, AtomicFileError> {
        let lock_path = path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| AtomicFileError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| AtomicFileError::io(&lock_path, e))?;

        fs2::FileExt::lock_exclusive(&file).map_err(|e| AtomicFileError::Lock {
            path: lock_path.clone(),
            message: e.to_string(),
        })?;

        Ok(FileLock { file, lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        // Best effort; another writer may already hold a fresh lock file.
        let _ = fs::remove_file(&self.lock_path);
    }
}
