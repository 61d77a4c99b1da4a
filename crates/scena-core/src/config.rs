//! Editor configuration.

use crate::error::{Result, SceneError};
use crate::scene::LARGE_OBJECT_THRESHOLD;
use serde::{Deserialize, Serialize};

fn default_large_object_threshold() -> usize {
    LARGE_OBJECT_THRESHOLD
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_signal_capacity() -> usize {
    64
}

fn default_autosave_large_scenes() -> bool {
    true
}

/// Tunables of the editor core, loaded from `config.toml`.
///
/// Every field has a default, so a partial or missing file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Serialized size (bytes) above which scenes are stored out-of-band
    #[serde(default = "default_large_object_threshold")]
    pub large_object_threshold: usize,
    /// Quiet period before a `scenes-updated` broadcast
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Capacity of the signal bus
    #[serde(default = "default_signal_capacity")]
    pub signal_capacity: usize,
    /// Save a scene immediately once it grows past the threshold
    #[serde(default = "default_autosave_large_scenes")]
    pub autosave_large_scenes: bool,
    /// Names of avatars played by humans at startup
    #[serde(default)]
    pub human_roster: Vec<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            large_object_threshold: default_large_object_threshold(),
            debounce_ms: default_debounce_ms(),
            signal_capacity: default_signal_capacity(),
            autosave_large_scenes: default_autosave_large_scenes(),
            human_roster: Vec::new(),
        }
    }
}

impl EditorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.large_object_threshold == 0 {
            return Err(SceneError::config("large_object_threshold must be positive"));
        }
        if self.signal_capacity == 0 {
            return Err(SceneError::config("signal_capacity must be positive"));
        }
        Ok(())
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}
