//! Unified path management for scena data files.
//!
//! Every repository resolves its files through [`ScenaPaths`], so tests and
//! the CLI can redirect all storage by supplying a different base directory.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// The platform configuration directory could not be determined.
    #[error("Cannot find configuration directory")]
    ConfigDirNotFound,
    /// An identifier cannot be mapped to a file name.
    #[error("Invalid identifier for file storage: {0:?}")]
    InvalidId(String),
}

impl From<PathError> for scena_core::SceneError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::ConfigDirNotFound => scena_core::SceneError::config(err.to_string()),
            PathError::InvalidId(_) => scena_core::SceneError::invalid(err.to_string()),
        }
    }
}

/// Resolved storage locations.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/scena/             # Base directory (dirs::config_dir default)
/// ├── config.toml              # Editor configuration
/// ├── state.json               # Active scene, party registry
/// ├── scenes/                  # One record per saved scene
/// │   └── <scene-id>.json
/// └── blobs/                   # Full payloads of large scenes
///     └── <scene-id>.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenaPaths {
    base_dir: PathBuf,
}

impl ScenaPaths {
    /// Creates paths rooted at `base_dir`, or at the platform default when
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns `PathError::ConfigDirNotFound` if no base directory was given
    /// and the platform configuration directory is unknown.
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self, PathError> {
        let base_dir = match base_dir {
            Some(dir) => dir,
            None => Self::default_base_dir()?,
        };
        Ok(Self { base_dir })
    }

    /// `<config dir>/scena`, e.g. `~/.config/scena` on Linux.
    pub fn default_base_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("scena"))
            .ok_or(PathError::ConfigDirNotFound)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    pub fn state_file(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    pub fn scenes_dir(&self) -> PathBuf {
        self.base_dir.join("scenes")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.base_dir.join("blobs")
    }

    /// Path of the record file for `scene_id`.
    pub fn scene_record(&self, scene_id: &str) -> Result<PathBuf, PathError> {
        Ok(self.scenes_dir().join(file_name_for(scene_id)?))
    }

    /// Path of the out-of-band payload for `scene_id`.
    pub fn scene_blob(&self, scene_id: &str) -> Result<PathBuf, PathError> {
        Ok(self.blobs_dir().join(file_name_for(scene_id)?))
    }
}

/// `file://` URL of a local path, as stored in `fileUrl`.
pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Inverse of [`file_url`]; `None` for other schemes.
pub fn path_from_file_url(url: &str) -> Option<PathBuf> {
    url.strip_prefix("file://").map(PathBuf::from)
}

fn file_name_for(id: &str) -> Result<String, PathError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(PathError::InvalidId(id.to_string()));
    }
    Ok(format!("{}.json", id))
}
