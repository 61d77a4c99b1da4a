//! Shared scene store.
//!
//! The one authoritative in-process copy of the scene collection. All
//! writes go through [`reduce`], which applies the merge rules, keeps the
//! active scene id valid and bumps the version when anything changed.
//! Writers that computed their action from an older snapshot can use
//! [`SceneStore::dispatch_at`] to have the write rejected instead of
//! clobbering a newer state.

use scena_core::scene::Scene;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Snapshot of the shared store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedState {
    pub scenes: Vec<Scene>,
    pub active_scene_id: Option<String>,
    /// Incremented on every effective write
    pub version: u64,
}

impl SharedState {
    pub fn scene(&self, scene_id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }

    pub fn scene_ids(&self) -> HashSet<&str> {
        self.scenes.iter().map(|s| s.id.as_str()).collect()
    }
}

/// A write to the shared store.
#[derive(Debug, Clone)]
pub enum StoreAction {
    /// Authoritative collection from an initiating surface.
    ReplaceScenes {
        scenes: Vec<Scene>,
        active_scene_id: Option<String>,
    },
    /// Per-key merge of a surface's collection; nothing is removed.
    MergeScenes(Vec<Scene>),
    UpsertScene(Scene),
    RemoveScene(String),
    SetActive(Option<String>),
}

impl StoreAction {
    fn label(&self) -> &'static str {
        match self {
            StoreAction::ReplaceScenes { .. } => "ReplaceScenes",
            StoreAction::MergeScenes(_) => "MergeScenes",
            StoreAction::UpsertScene(_) => "UpsertScene",
            StoreAction::RemoveScene(_) => "RemoveScene",
            StoreAction::SetActive(_) => "SetActive",
        }
    }
}

/// Result of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied { version: u64 },
    /// The action did not change anything.
    Unchanged { version: u64 },
    /// The write was based on an older version and was discarded.
    Stale { current: u64 },
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied { .. })
    }
}

/// Chooses between two copies of the same scene.
///
/// A copy with unsaved edits is never replaced by a clean copy; otherwise
/// the incoming copy wins.
pub fn merge_scene(existing: &Scene, incoming: Scene) -> Scene {
    if existing.has_unsaved_changes
        && !incoming.has_unsaved_changes
        && !existing.same_content(&incoming)
    {
        tracing::debug!(
            "[SceneStore] Keeping unsaved copy of scene {} over clean incoming copy",
            existing.id
        );
        return existing.clone();
    }
    incoming
}

/// Per-key merge of `incoming` into `base`: matching ids are merged with
/// [`merge_scene`], new ids are appended in incoming order, nothing in
/// `base` is dropped.
pub fn merge_collections(base: &[Scene], incoming: Vec<Scene>) -> Vec<Scene> {
    let mut merged: Vec<Scene> = base.to_vec();
    for scene in incoming {
        match merged.iter_mut().find(|s| s.id == scene.id) {
            Some(slot) => *slot = merge_scene(slot, scene),
            None => merged.push(scene),
        }
    }
    merged
}

/// Applies `action` to `state`. Returns whether anything changed.
///
/// The version is left to the caller.
pub fn reduce(state: &mut SharedState, action: StoreAction) -> bool {
    let before_scenes = state.scenes.clone();
    let before_active = state.active_scene_id.clone();

    match action {
        StoreAction::ReplaceScenes {
            scenes,
            active_scene_id,
        } => {
            if scenes.is_empty() && !state.scenes.is_empty() {
                tracing::debug!(
                    "[SceneStore] Ignoring empty replacement of {} scenes",
                    state.scenes.len()
                );
                return false;
            }
            let incoming_ids: HashSet<String> = scenes.iter().map(|s| s.id.clone()).collect();
            let mut replaced: Vec<Scene> = scenes
                .into_iter()
                .map(|incoming| match before_scenes.iter().find(|s| s.id == incoming.id) {
                    Some(existing) => merge_scene(existing, incoming),
                    None => incoming,
                })
                .collect();
            // Removal never takes a scene with unsaved edits
            for existing in &before_scenes {
                if existing.has_unsaved_changes && !incoming_ids.contains(&existing.id) {
                    tracing::debug!(
                        "[SceneStore] Keeping unsaved scene {} missing from replacement",
                        existing.id
                    );
                    replaced.push(existing.clone());
                }
            }
            state.scenes = replaced;
            state.active_scene_id = active_scene_id;
        }
        StoreAction::MergeScenes(scenes) => {
            state.scenes = merge_collections(&state.scenes, scenes);
        }
        StoreAction::UpsertScene(scene) => {
            match state.scenes.iter_mut().find(|s| s.id == scene.id) {
                Some(slot) => *slot = scene,
                None => state.scenes.push(scene),
            }
        }
        StoreAction::RemoveScene(scene_id) => {
            state.scenes.retain(|s| s.id != scene_id);
        }
        StoreAction::SetActive(scene_id) => {
            state.active_scene_id = scene_id;
        }
    }

    if let Some(active) = state.active_scene_id.as_deref() {
        if state.scene(active).is_none() {
            tracing::debug!("[SceneStore] Active scene {} no longer exists", active);
            state.active_scene_id = None;
        }
    }

    state.scenes != before_scenes || state.active_scene_id != before_active
}

/// The shared application store.
#[derive(Debug, Default)]
pub struct SceneStore {
    state: RwLock<SharedState>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> SharedState {
        self.state.read().await.clone()
    }

    pub async fn version(&self) -> u64 {
        self.state.read().await.version
    }

    pub async fn active_scene_id(&self) -> Option<String> {
        self.state.read().await.active_scene_id.clone()
    }

    /// Applies `action` unconditionally.
    pub async fn dispatch(&self, action: StoreAction) -> WriteOutcome {
        let mut state = self.state.write().await;
        Self::apply(&mut state, action)
    }

    /// Applies `action` only if the store is still at `base_version`.
    pub async fn dispatch_at(&self, base_version: u64, action: StoreAction) -> WriteOutcome {
        let mut state = self.state.write().await;
        if state.version != base_version {
            tracing::debug!(
                "[SceneStore] Discarding {} based on version {} (current {})",
                action.label(),
                base_version,
                state.version
            );
            return WriteOutcome::Stale {
                current: state.version,
            };
        }
        Self::apply(&mut state, action)
    }

    fn apply(state: &mut SharedState, action: StoreAction) -> WriteOutcome {
        let label = action.label();
        if reduce(state, action) {
            state.version += 1;
            tracing::trace!("[SceneStore] {} -> version {}", label, state.version);
            WriteOutcome::Applied {
                version: state.version,
            }
        } else {
            WriteOutcome::Unchanged {
                version: state.version,
            }
        }
    }
}
