use super::model::EditorState;
use crate::error::Result;
use crate::party::PartyRegistry;
use async_trait::async_trait;

/// Repository for editor-wide state.
#[async_trait]
pub trait EditorStateRepository: Send + Sync {
    /// Returns the current state.
    async fn get_state(&self) -> Result<EditorState>;

    /// Replaces the stored state.
    async fn save_state(&self, state: EditorState) -> Result<()>;

    /// Gets the active scene ID.
    async fn get_active_scene(&self) -> Option<String>;

    /// Sets the active scene ID and stamps `last_opened_at`.
    async fn set_active_scene(&self, scene_id: String) -> Result<()>;

    /// Clears the active scene ID.
    async fn clear_active_scene(&self) -> Result<()>;

    /// Replaces the stored party registry.
    async fn save_parties(&self, parties: PartyRegistry) -> Result<()>;
}
