//! Headless host doubles: avatar instances and pointer interactions only
//! log their lifecycle.

use async_trait::async_trait;
use scena_core::error::Result;
use scena_core::layout::{CursorStyle, InteractionHost, ListenerHandle};
use scena_core::runtime::{AvatarInstance, AvatarRuntime, RenderTarget, RenderTargetProvider};
use scena_core::scene::AvatarData;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct HeadlessRuntime;

struct HeadlessInstance {
    element_id: String,
    name: String,
}

#[async_trait]
impl AvatarRuntime for HeadlessRuntime {
    async fn initialize(
        &self,
        element_id: &str,
        avatar: &AvatarData,
        container: &RenderTarget,
    ) -> Result<Box<dyn AvatarInstance>> {
        tracing::debug!(
            "[HeadlessRuntime] Started {} in {}",
            avatar.name,
            container.id
        );
        Ok(Box::new(HeadlessInstance {
            element_id: element_id.to_string(),
            name: avatar.name.clone(),
        }))
    }
}

#[async_trait]
impl AvatarInstance for HeadlessInstance {
    async fn stop(&mut self) -> Result<()> {
        tracing::debug!(
            "[HeadlessRuntime] Stopped {} ({})",
            self.name,
            self.element_id
        );
        Ok(())
    }

    async fn reattach(&mut self, container: &RenderTarget) -> Result<()> {
        tracing::debug!("[HeadlessRuntime] {} moved to {}", self.name, container.id);
        Ok(())
    }

    async fn apply_config(&mut self, config: &Value) -> Result<()> {
        tracing::debug!("[HeadlessRuntime] {} patched with {}", self.name, config);
        Ok(())
    }
}

/// Every element has a container.
pub struct HeadlessTargets;

impl RenderTargetProvider for HeadlessTargets {
    fn container_for(&self, element_id: &str) -> Option<RenderTarget> {
        Some(RenderTarget::new(format!("headless-{}", element_id)))
    }
}

/// Interaction host without a screen.
#[derive(Default)]
pub struct HeadlessHost {
    next_listener: AtomicU64,
}

impl InteractionHost for HeadlessHost {
    fn set_text_selection(&self, enabled: bool) {
        tracing::trace!("[HeadlessHost] Text selection enabled={}", enabled);
    }

    fn set_cursor(&self, cursor: Option<CursorStyle>) {
        tracing::trace!("[HeadlessHost] Cursor {:?}", cursor);
    }

    fn attach_pointer_listeners(&self) -> ListenerHandle {
        self.next_listener.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn detach_pointer_listeners(&self, handle: ListenerHandle) {
        tracing::trace!("[HeadlessHost] Detached listeners {}", handle);
    }
}
