//! Configuration service implementation.
//!
//! Loads [`EditorConfig`] from `config.toml` and caches it. A missing file
//! yields defaults and is not created; the editor only writes the file
//! through [`ConfigService::save`].

use crate::paths::ScenaPaths;
use crate::storage::AtomicFile;
use scena_core::config::EditorConfig;
use scena_core::error::Result;
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the editor configuration.
#[derive(Clone)]
pub struct ConfigService {
    file: Arc<AtomicFile<EditorConfig>>,
    /// Cached configuration, loaded lazily on first access.
    config: Arc<RwLock<Option<EditorConfig>>>,
}

impl ConfigService {
    pub fn new(paths: &ScenaPaths) -> Self {
        Self {
            file: Arc::new(AtomicFile::toml(paths.config_file())),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the loaded values fail validation.
    pub fn get_config(&self) -> Result<EditorConfig> {
        if let Ok(read_lock) = self.config.read() {
            if let Some(cached) = read_lock.as_ref() {
                return Ok(cached.clone());
            }
        }

        let loaded = match self.file.load()? {
            Some(config) => {
                tracing::debug!("[ConfigService] Loaded {}", self.file.path().display());
                config
            }
            None => {
                tracing::debug!(
                    "[ConfigService] No config at {}, using defaults",
                    self.file.path().display()
                );
                EditorConfig::default()
            }
        };
        loaded.validate()?;

        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = Some(loaded.clone());
        }
        Ok(loaded)
    }

    /// Validates and writes `config`, replacing the cached value.
    pub fn save(&self, config: &EditorConfig) -> Result<()> {
        config.validate()?;
        self.file.save(config)?;
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = Some(config.clone());
        }
        Ok(())
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = None;
        }
    }
}
