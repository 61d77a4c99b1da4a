//! Scene repository trait.
//!
//! Defines the interface for durable scene persistence.

use super::model::Scene;
use super::record::{SavedSceneSummary, SceneLoad};
use crate::error::Result;
use async_trait::async_trait;

/// An abstract store of serialized scenes.
///
/// # Implementation Notes
///
/// Implementations should handle:
/// - The large-object fallback: scenes above the size threshold are stored
///   as a preview record plus a separately addressable blob
/// - Normalization of legacy record shapes at load time
/// - Skipping (and logging) malformed records in `list`
#[async_trait]
pub trait SceneRepository: Send + Sync {
    /// Persists a scene.
    ///
    /// # Returns
    ///
    /// The summary of the written record. `is_file_reference` tells whether
    /// the payload went out-of-band.
    async fn save(&self, scene: &Scene) -> Result<SavedSceneSummary>;

    /// Loads a scene by id.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(SceneLoad::Ready(_)))`: the scene is usable
    /// - `Ok(Some(SceneLoad::AwaitingBlob(_)))`: call [`fetch_blob`](Self::fetch_blob)
    /// - `Ok(None)`: no record with this id
    async fn load(&self, scene_id: &str) -> Result<Option<SceneLoad>>;

    /// Fetches the out-of-band payload of a file-reference record.
    async fn fetch_blob(&self, summary: &SavedSceneSummary) -> Result<Scene>;

    /// Lists saved scenes without fetching any blob, most recent first.
    async fn list(&self) -> Result<Vec<SavedSceneSummary>>;

    /// Deletes a scene and its blob. Deleting a missing id succeeds.
    async fn delete(&self, scene_id: &str) -> Result<()>;
}
