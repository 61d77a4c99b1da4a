//! Contracts of the external collaborators driven by the editor.
//!
//! The avatar runtime (3D rendering, animation, speech) and the thumbnail
//! renderer live outside this workspace. Nothing beyond these traits is
//! assumed about them.

use crate::error::Result;
use crate::scene::{AvatarData, Scene};
use async_trait::async_trait;
use serde_json::Value;

/// Handle to the surface a runtime resource renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    pub id: String,
}

impl RenderTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Resolves the container expected for an element's avatar.
pub trait RenderTargetProvider: Send + Sync {
    /// `None` when the container is not mounted.
    fn container_for(&self, element_id: &str) -> Option<RenderTarget>;
}

/// A live avatar instance holding rendering/audio resources.
#[async_trait]
pub trait AvatarInstance: Send + Sync {
    /// Stops the instance and frees its resources.
    async fn stop(&mut self) -> Result<()>;

    /// Moves the instance to a different container.
    async fn reattach(&mut self, container: &RenderTarget) -> Result<()>;

    /// Applies an `avatar-config-changed` patch.
    async fn apply_config(&mut self, config: &Value) -> Result<()>;
}

/// Factory for avatar instances.
#[async_trait]
pub trait AvatarRuntime: Send + Sync {
    async fn initialize(
        &self,
        element_id: &str,
        avatar: &AvatarData,
        container: &RenderTarget,
    ) -> Result<Box<dyn AvatarInstance>>;
}

/// Renders preview thumbnails of scenes.
#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    /// Returns an image reference (data URL or asset URL).
    async fn render(&self, scene: &Scene) -> Result<String>;
}
