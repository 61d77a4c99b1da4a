//! Editor state domain model.
//!
//! Contains state that persists across editor restarts but does not belong
//! to any single scene.

use crate::party::PartyRegistry;
use serde::{Deserialize, Serialize};

/// Editor-wide state that persists across restarts.
///
/// # Fields
///
/// * `active_scene_id` - The scene open in the editor when it was closed.
/// * `last_opened_at` - When the active scene was last opened (RFC 3339).
/// * `parties` - The party registry boxes reference by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    /// ID of the currently active scene.
    #[serde(default)]
    pub active_scene_id: Option<String>,

    /// Timestamp of the last scene switch.
    #[serde(default)]
    pub last_opened_at: Option<String>,

    /// Registry of known parties.
    #[serde(default)]
    pub parties: PartyRegistry,
}

impl EditorState {
    /// Creates a new EditorState with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let state = EditorState::new();
        assert!(state.active_scene_id.is_none());
        assert!(state.last_opened_at.is_none());
        assert!(state.parties.is_empty());
    }

    #[test]
    fn test_missing_fields_deserialize() {
        let state: EditorState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, EditorState::default());
    }
}
