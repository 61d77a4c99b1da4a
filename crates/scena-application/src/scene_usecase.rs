//! Scene use case implementation.
//!
//! `SceneUseCase` is the editor surface: it owns the local scene
//! collection, applies every user mutation through the domain rules, and
//! coordinates the shared store (via [`SyncBridge`]), the persisted record
//! store, and the live avatar instances (via [`RuntimeArena`]).

use crate::arena::RuntimeArena;
use crate::store::{SceneStore, merge_collections};
use crate::sync::{SyncBridge, rebase_local};
use scena_core::config::EditorConfig;
use scena_core::element::{self, DeleteOutcome, DropPayload, Released};
use scena_core::error::{Result, SceneError};
use scena_core::layout::{
    DividerDrag, FrameCoalescer, MoveGrab, Point, Rect, ResizeHandle, SurfaceBounds, resize_rect,
};
use scena_core::party::{self, Party, PartyGrouping, PartyRegistry};
use scena_core::roster::HumanRoster;
use scena_core::runtime::{AvatarRuntime, RenderTargetProvider, ThumbnailRenderer};
use scena_core::scene::{
    AvatarData, ElementType, SavedSceneSummary, Scene, SceneBox, SceneLoad, SceneRepository,
};
use scena_core::signal::{SceneSignal, SignalBus};
use scena_core::state::EditorStateRepository;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Geometry of the box a new scene starts with.
pub const DEFAULT_BOX_RECT: Rect = Rect {
    x: 10.0,
    y: 10.0,
    width: 40.0,
    height: 40.0,
};

/// Result of [`SceneUseCase::load_scene`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The scene is in the local collection.
    Loaded(Scene),
    /// Only the preview is available; call
    /// [`SceneUseCase::complete_blob_fetch`] to finish loading.
    AwaitingBlob(SavedSceneSummary),
    /// No record with this id.
    Missing,
}

/// Editor-local state.
#[derive(Default)]
struct EditorLocal {
    scenes: Vec<Scene>,
    active_scene_id: Option<String>,
    roster: HumanRoster,
    parties: PartyRegistry,
    /// Scenes deleted while async work for them may still be in flight
    tombstones: HashSet<String>,
    /// Scenes last seen above the large object threshold
    large: HashSet<String>,
}

impl EditorLocal {
    fn scene(&self, scene_id: &str) -> Result<&Scene> {
        self.scenes
            .iter()
            .find(|s| s.id == scene_id)
            .ok_or_else(|| SceneError::not_found("Scene", scene_id))
    }

    fn scene_mut(&mut self, scene_id: &str) -> Result<&mut Scene> {
        self.scenes
            .iter_mut()
            .find(|s| s.id == scene_id)
            .ok_or_else(|| SceneError::not_found("Scene", scene_id))
    }

    /// Inserts or replaces a scene, keeping its position when replacing.
    fn put(&mut self, scene: Scene) {
        self.tombstones.remove(&scene.id);
        match self.scenes.iter_mut().find(|s| s.id == scene.id) {
            Some(slot) => *slot = scene,
            None => self.scenes.push(scene),
        }
    }
}

/// Use case for composing, persisting and switching scenes.
///
/// # Responsibilities
///
/// - Applying scene, box, party and element mutations
/// - Propagating local changes to the shared store with debounced broadcasts
/// - Saving and loading through the scene record store, including the
///   deferred blob fetch of large scenes
/// - Creating and releasing runtime avatar instances as the active scene
///   and its elements change
///
/// # Thread Safety
///
/// Internal state sits behind `tokio::sync::RwLock`; no lock is held across
/// calls into repositories or runtimes.
pub struct SceneUseCase {
    scene_repository: Arc<dyn SceneRepository>,
    state_repository: Arc<dyn EditorStateRepository>,
    avatar_runtime: Arc<dyn AvatarRuntime>,
    render_targets: Arc<dyn RenderTargetProvider>,
    thumbnail_renderer: RwLock<Option<Arc<dyn ThumbnailRenderer>>>,
    bridge: SyncBridge,
    arena: Arc<RuntimeArena>,
    bus: SignalBus,
    config: EditorConfig,
    local: RwLock<EditorLocal>,
}

impl SceneUseCase {
    /// Creates a new `SceneUseCase`.
    ///
    /// # Arguments
    ///
    /// * `scene_repository` - Persisted scene record store
    /// * `state_repository` - Editor-wide state (active scene, parties)
    /// * `avatar_runtime` - Factory for live avatar instances
    /// * `render_targets` - Resolves the container of each avatar element
    /// * `store` - Shared store, possibly shared with other surfaces
    /// * `bus` - Signal bus for `scenes-updated` and friends
    /// * `config` - Editor configuration
    pub fn new(
        scene_repository: Arc<dyn SceneRepository>,
        state_repository: Arc<dyn EditorStateRepository>,
        avatar_runtime: Arc<dyn AvatarRuntime>,
        render_targets: Arc<dyn RenderTargetProvider>,
        store: Arc<SceneStore>,
        bus: SignalBus,
        config: EditorConfig,
    ) -> Self {
        let local = EditorLocal {
            roster: HumanRoster::new(config.human_roster.iter().cloned()),
            ..EditorLocal::default()
        };
        Self {
            scene_repository,
            state_repository,
            avatar_runtime,
            render_targets,
            thumbnail_renderer: RwLock::new(None),
            bridge: SyncBridge::new(store, bus.clone(), config.debounce()),
            arena: Arc::new(RuntimeArena::new()),
            bus,
            config,
            local: RwLock::new(local),
        }
    }

    /// Sets the renderer used by [`generate_thumbnail`](Self::generate_thumbnail).
    pub async fn set_thumbnail_renderer(&self, renderer: Arc<dyn ThumbnailRenderer>) {
        *self.thumbnail_renderer.write().await = Some(renderer);
    }

    pub fn arena(&self) -> &Arc<RuntimeArena> {
        &self.arena
    }

    pub fn surface_id(&self) -> &str {
        self.bridge.surface_id()
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Hydrates the editor.
    ///
    /// The local collection is pulled from the shared store when that is
    /// non-empty, otherwise hydrated from the persisted records (large
    /// scenes stay deferred until loaded explicitly). The party registry
    /// and the active scene are restored from editor state.
    pub async fn initialize(&self) -> Result<()> {
        let state = self.state_repository.get_state().await?;

        let mut scenes = self.local.read().await.scenes.clone();
        let reconciliation = self.bridge.reconcile(&mut scenes).await;

        let hydrated = scenes.is_empty();
        if hydrated {
            for summary in self.scene_repository.list().await? {
                match self.scene_repository.load(&summary.id).await {
                    Ok(Some(SceneLoad::Ready(scene))) => scenes.push(scene),
                    Ok(Some(SceneLoad::AwaitingBlob(_))) => {
                        tracing::debug!(
                            "[SceneUseCase] Deferring large scene {} until opened",
                            summary.id
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            "[SceneUseCase] Skipping scene {} during hydration: {}",
                            summary.id,
                            e
                        );
                    }
                }
            }
        }

        let (flagged, roster_len) = {
            let mut local = self.local.write().await;
            local.parties = state.parties;
            let flagged: Vec<String> = scenes
                .iter_mut()
                .filter_map(|scene| {
                    (local.roster.apply_to_scene(scene) > 0).then(|| scene.id.clone())
                })
                .collect();
            // Scenes touched while hydrating keep their unsaved copies
            local.scenes = merge_collections(&local.scenes, scenes.clone());
            (flagged, local.roster.len())
        };
        tracing::info!(
            "[SceneUseCase] Initialized with {} scenes ({:?}, hydrated={}), roster of {}",
            scenes.len(),
            reconciliation,
            hydrated,
            roster_len
        );

        if hydrated && !scenes.is_empty() {
            let mut pushed = scenes.clone();
            self.bridge.reconcile(&mut pushed).await;
        } else {
            for scene in scenes.iter().filter(|s| flagged.contains(&s.id)) {
                self.bridge.publish_scene(scene.clone()).await;
            }
        }

        match state.active_scene_id {
            Some(active) if scenes.iter().any(|s| s.id == active) => {
                self.switch_active_scene(Some(active)).await?;
            }
            Some(deferred) => {
                // Large scenes are not hydrated eagerly
                if self.open_scene(&deferred).await?.is_none() {
                    tracing::debug!(
                        "[SceneUseCase] Stored active scene {} is not available",
                        deferred
                    );
                    self.state_repository.clear_active_scene().await?;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Spawns a task applying signals from the bus until it closes.
    pub fn spawn_signal_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let usecase = Arc::clone(self);
        let mut receiver = self.bus.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(signal) => {
                        if let Err(e) = usecase.handle_signal(signal).await {
                            tracing::warn!("[SceneUseCase] Failed to handle signal: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("[SceneUseCase] Signal listener lagged by {}", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("[SceneUseCase] Signal listener stopped");
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn scenes(&self) -> Vec<Scene> {
        self.local.read().await.scenes.clone()
    }

    pub async fn scene(&self, scene_id: &str) -> Result<Scene> {
        self.local.read().await.scene(scene_id).cloned()
    }

    pub async fn active_scene_id(&self) -> Option<String> {
        self.local.read().await.active_scene_id.clone()
    }

    pub async fn active_scene(&self) -> Option<Scene> {
        let local = self.local.read().await;
        let active = local.active_scene_id.as_deref()?;
        local.scene(active).ok().cloned()
    }

    pub async fn human_roster(&self) -> HumanRoster {
        self.local.read().await.roster.clone()
    }

    pub async fn parties(&self) -> PartyRegistry {
        self.local.read().await.parties.clone()
    }

    /// Saved scene summaries, newest first. Never fetches blobs.
    pub async fn list_saved(&self) -> Result<Vec<SavedSceneSummary>> {
        self.scene_repository.list().await
    }

    // ========================================================================
    // Scene operations
    // ========================================================================

    /// Creates a scene holding one default box.
    pub async fn create_scene(&self, name: &str) -> Result<Scene> {
        let name = validate_name(name)?;
        let mut scene = Scene::new(name);
        scene.boxes.push(SceneBox::new(DEFAULT_BOX_RECT));
        scene.has_unsaved_changes = true;

        self.local.write().await.put(scene.clone());
        tracing::info!("[SceneUseCase] Created scene {} ({})", scene.id, scene.name);
        self.bridge.publish_scene(scene.clone()).await;
        Ok(scene)
    }

    pub async fn rename_scene(&self, scene_id: &str, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        self.update_scene(scene_id, move |scene, _| {
            scene.name = name;
            Ok(())
        })
        .await
    }

    /// Copies a scene under a new name with fresh scene, box and element ids.
    pub async fn duplicate_scene(&self, scene_id: &str, name: &str) -> Result<Scene> {
        let name = validate_name(name)?;
        let copy = {
            let mut local = self.local.write().await;
            let copy = local.scene(scene_id)?.duplicate(name);
            local.put(copy.clone());
            copy
        };
        tracing::info!("[SceneUseCase] Duplicated scene {} as {}", scene_id, copy.id);
        self.bridge.publish_scene(copy.clone()).await;
        Ok(copy)
    }

    pub async fn set_background(&self, scene_id: &str, image: Option<String>) -> Result<()> {
        self.update_scene(scene_id, move |scene, _| {
            scene.background_image = image.filter(|i| !i.is_empty());
            Ok(())
        })
        .await
    }

    /// Deletes a scene everywhere. Requires `confirmed`.
    ///
    /// Releases the scene's runtime instances first. Async work for the
    /// scene that completes afterwards is discarded.
    pub async fn delete_scene(&self, scene_id: &str, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(SceneError::confirmation_required(format!(
                "delete scene {}",
                scene_id
            )));
        }

        self.arena.release_scene(scene_id).await;
        let was_active = {
            let mut local = self.local.write().await;
            local.scenes.retain(|s| s.id != scene_id);
            local.tombstones.insert(scene_id.to_string());
            local.large.remove(scene_id);
            let was_active = local.active_scene_id.as_deref() == Some(scene_id);
            if was_active {
                local.active_scene_id = None;
            }
            was_active
        };

        self.bridge.remove_scene(scene_id).await;
        self.scene_repository.delete(scene_id).await?;
        if was_active || self.state_repository.get_active_scene().await.as_deref() == Some(scene_id)
        {
            self.state_repository.clear_active_scene().await?;
        }
        tracing::info!("[SceneUseCase] Deleted scene {}", scene_id);
        Ok(())
    }

    // ========================================================================
    // Box operations
    // ========================================================================

    /// Adds a box at `rect` (clamped into bounds). Returns its id.
    pub async fn add_box(&self, scene_id: &str, rect: Rect) -> Result<String> {
        self.update_scene(scene_id, move |scene, _| {
            let scene_box = SceneBox::new(rect);
            let id = scene_box.id.clone();
            scene.boxes.push(scene_box);
            Ok(id)
        })
        .await
    }

    /// Writes box geometry, clamped into bounds.
    pub async fn set_box_rect(&self, scene_id: &str, box_id: &str, rect: Rect) -> Result<Rect> {
        self.update_scene(scene_id, |scene, _| {
            let scene_box = scene.find_box_mut(box_id)?;
            scene_box.set_rect(rect);
            Ok(scene_box.rect())
        })
        .await
    }

    /// Applies one pointer update of a move gesture.
    pub async fn move_box(
        &self,
        scene_id: &str,
        box_id: &str,
        grab: &MoveGrab,
        bounds: SurfaceBounds,
        pointer: Point,
    ) -> Result<Rect> {
        self.update_scene(scene_id, |scene, _| {
            let scene_box = scene.find_box_mut(box_id)?;
            scene_box.set_rect(grab.update(scene_box.rect(), bounds, pointer));
            Ok(scene_box.rect())
        })
        .await
    }

    /// Applies the latest pointer update of a move gesture collected since
    /// the previous frame. Returns `None` when the frame had no update.
    pub async fn move_box_frame(
        &self,
        scene_id: &str,
        box_id: &str,
        grab: &MoveGrab,
        bounds: SurfaceBounds,
        frames: &mut FrameCoalescer<Point>,
    ) -> Result<Option<Rect>> {
        match frames.take_frame() {
            Some(pointer) => self
                .move_box(scene_id, box_id, grab, bounds, pointer)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Applies one pointer update of a resize gesture.
    pub async fn resize_box(
        &self,
        scene_id: &str,
        box_id: &str,
        handle: ResizeHandle,
        bounds: SurfaceBounds,
        pointer: Point,
    ) -> Result<Rect> {
        self.update_scene(scene_id, |scene, _| {
            let scene_box = scene.find_box_mut(box_id)?;
            scene_box.set_rect(resize_rect(scene_box.rect(), handle, bounds, pointer));
            Ok(scene_box.rect())
        })
        .await
    }

    /// Deletes a box and releases its avatars. Requires `confirmed`.
    pub async fn delete_box(&self, scene_id: &str, box_id: &str, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(SceneError::confirmation_required(format!(
                "delete box {}",
                box_id
            )));
        }
        let element_ids = self
            .update_scene(scene_id, |scene, _| {
                let index = scene
                    .boxes
                    .iter()
                    .position(|b| b.id == box_id)
                    .ok_or_else(|| SceneError::not_found("Box", box_id))?;
                let removed = scene.boxes.remove(index);
                Ok(removed
                    .elements
                    .into_iter()
                    .map(|e| e.id)
                    .collect::<Vec<_>>())
            })
            .await?;
        self.arena.release_many(element_ids).await;
        Ok(())
    }

    // ========================================================================
    // Pane operations
    // ========================================================================

    /// Moves `delta_percent` across divider `divider` of a box.
    pub async fn shift_divider(
        &self,
        scene_id: &str,
        box_id: &str,
        divider: usize,
        delta_percent: f64,
    ) -> Result<()> {
        self.update_scene(scene_id, |scene, _| {
            scene
                .find_box_mut(box_id)?
                .panes
                .shift_divider(divider, delta_percent)
        })
        .await
    }

    /// Applies one pointer update of a divider drag.
    pub async fn drag_divider(
        &self,
        scene_id: &str,
        box_id: &str,
        drag: &DividerDrag,
        pointer_x: f64,
        inner_width_px: f64,
    ) -> Result<()> {
        self.update_scene(scene_id, |scene, _| {
            let scene_box = scene.find_box_mut(box_id)?;
            drag.apply(&mut scene_box.panes, pointer_x, inner_width_px)
        })
        .await
    }

    /// Frame-driven [`drag_divider`](Self::drag_divider): `frames` carries
    /// raw pointer x positions. Returns whether an update was applied.
    pub async fn drag_divider_frame(
        &self,
        scene_id: &str,
        box_id: &str,
        drag: &DividerDrag,
        frames: &mut FrameCoalescer<f64>,
        inner_width_px: f64,
    ) -> Result<bool> {
        let Some(pointer_x) = frames.take_frame() else {
            return Ok(false);
        };
        self.drag_divider(scene_id, box_id, drag, pointer_x, inner_width_px)
            .await?;
        Ok(true)
    }

    /// Toggles enlargement of one pane. Returns whether it is enlarged.
    pub async fn toggle_enlarge(&self, scene_id: &str, box_id: &str, pane: usize) -> Result<bool> {
        self.update_scene(scene_id, |scene, _| {
            scene.find_box_mut(box_id)?.panes.toggle_enlarge(pane)
        })
        .await
    }

    // ========================================================================
    // Party operations
    // ========================================================================

    /// Assigns a party to a box, or clears it with `None`/empty.
    pub async fn assign_party(
        &self,
        scene_id: &str,
        box_id: &str,
        party_name: Option<&str>,
    ) -> Result<()> {
        self.update_scene(scene_id, |scene, parties| {
            party::assign_party(scene.find_box_mut(box_id)?, party_name, parties);
            Ok(())
        })
        .await
    }

    /// Inserts or replaces a registry entry.
    pub async fn upsert_party(&self, party: Party) -> Result<()> {
        let parties = {
            let mut local = self.local.write().await;
            local.parties.upsert(party);
            local.parties.clone()
        };
        self.state_repository.save_parties(parties).await
    }

    /// Removes a registry entry. Boxes referencing it become dangling.
    pub async fn remove_party(&self, name: &str) -> Result<Option<Party>> {
        let (removed, parties) = {
            let mut local = self.local.write().await;
            let removed = local.parties.remove(name);
            (removed, local.parties.clone())
        };
        if removed.is_some() {
            self.state_repository.save_parties(parties).await?;
        }
        Ok(removed)
    }

    /// Party names referenced in a scene that the registry lacks.
    pub async fn dangling_parties(&self, scene_id: &str) -> Result<Vec<String>> {
        let local = self.local.read().await;
        Ok(party::dangling_references(
            local.scene(scene_id)?,
            &local.parties,
        ))
    }

    pub async fn party_grouping(&self, scene_id: &str) -> Result<PartyGrouping> {
        let local = self.local.read().await;
        Ok(party::group_by_party(&local.scene(scene_id)?.boxes))
    }

    // ========================================================================
    // Element operations
    // ========================================================================

    pub async fn set_element_count(&self, scene_id: &str, box_id: &str, count: usize) -> Result<()> {
        let released = self
            .update_scene(scene_id, |scene, _| {
                element::set_element_count(scene.find_box_mut(box_id)?, count)
            })
            .await?;
        self.release(released).await;
        Ok(())
    }

    pub async fn set_element_type(
        &self,
        scene_id: &str,
        box_id: &str,
        element_id: &str,
        element_type: ElementType,
    ) -> Result<()> {
        let released = self
            .update_scene(scene_id, |scene, _| {
                element::set_element_type(scene.find_box_mut(box_id)?, element_id, element_type)
            })
            .await?;
        self.release(released).await;
        Ok(())
    }

    /// Deletes an element. Deleting the last element of a box is rejected
    /// with a warning and changes nothing.
    pub async fn delete_element(
        &self,
        scene_id: &str,
        box_id: &str,
        element_id: &str,
    ) -> Result<DeleteOutcome> {
        let outcome = self
            .update_scene(scene_id, |scene, _| {
                element::delete_element(scene.find_box_mut(box_id)?, element_id)
            })
            .await?;
        match &outcome {
            DeleteOutcome::Deleted(released) => self.release(released.clone()).await,
            DeleteOutcome::RejectedLastElement => {
                tracing::warn!(
                    "[SceneUseCase] Kept element {} of box {}: {}",
                    element_id,
                    box_id,
                    outcome.warning().unwrap_or_default()
                );
            }
        }
        Ok(outcome)
    }

    /// Places a dropped payload into an element.
    ///
    /// An avatar landing in the active scene is instantiated right away.
    pub async fn drop_payload(
        &self,
        scene_id: &str,
        box_id: &str,
        element_id: &str,
        payload: DropPayload,
    ) -> Result<ElementType> {
        let (element_type, released, avatar) = self
            .update_scene(scene_id, |scene, _| {
                let scene_box = scene.find_box_mut(box_id)?;
                let (element_type, released) =
                    element::drop_payload(scene_box, element_id, payload)?;
                let avatar = scene_box
                    .element(element_id)
                    .and_then(|e| e.avatar_data())
                    .cloned();
                Ok((element_type, released, avatar))
            })
            .await?;
        self.release(released).await;

        if let Some(avatar) = avatar {
            if self.active_scene_id().await.as_deref() == Some(scene_id) {
                self.spawn_avatar(scene_id, element_id, avatar).await;
            }
        }
        Ok(element_type)
    }

    // ========================================================================
    // Roster and signals
    // ========================================================================

    /// Replaces the human roster, re-derives `is_human` everywhere and
    /// announces the change on `human-roster-changed`.
    pub async fn set_human_roster(&self, roster: HumanRoster) {
        self.apply_human_roster(roster.clone()).await;
        self.bus.publish(SceneSignal::HumanRosterChanged { roster });
    }

    async fn apply_human_roster(&self, roster: HumanRoster) {
        let changed: Vec<Scene> = {
            let mut local = self.local.write().await;
            local.roster = roster;
            let EditorLocal { scenes, roster, .. } = &mut *local;
            scenes
                .iter_mut()
                .filter_map(|scene| (roster.apply_to_scene(scene) > 0).then(|| scene.clone()))
                .collect()
        };
        tracing::debug!(
            "[SceneUseCase] Roster applied, {} scenes changed",
            changed.len()
        );
        for scene in changed {
            self.bridge.publish_scene(scene).await;
        }
    }

    /// Applies a signal from another surface (or this one).
    pub async fn handle_signal(&self, signal: SceneSignal) -> Result<()> {
        if !signal.is_actionable() {
            return Ok(());
        }
        match signal {
            SceneSignal::ScenesUpdated { .. } => {
                let snapshot = self.local.read().await.scenes.clone();
                let mut merged = snapshot.clone();
                if !self.bridge.apply_incoming(&signal, &mut merged).await {
                    return Ok(());
                }
                let (active_gone, edited) = {
                    let mut local = self.local.write().await;
                    let current = std::mem::take(&mut local.scenes);
                    let (mut scenes, edited) = rebase_local(&snapshot, merged, current);
                    local.roster.apply_to_scenes(&mut scenes);
                    let edited: Vec<Scene> = scenes
                        .iter()
                        .filter(|s| edited.contains(&s.id))
                        .cloned()
                        .collect();
                    local.scenes = scenes;
                    let gone = local
                        .active_scene_id
                        .as_deref()
                        .is_some_and(|id| local.scene(id).is_err());
                    let active_gone = if gone {
                        local.active_scene_id.take()
                    } else {
                        None
                    };
                    (active_gone, edited)
                };
                // Edits made while the broadcast was merged go back to the
                // shared store.
                for scene in edited {
                    self.bridge.publish_scene(scene).await;
                }
                if let Some(previous) = active_gone {
                    tracing::info!(
                        "[SceneUseCase] Active scene {} was removed elsewhere",
                        previous
                    );
                    self.arena.release_scene(&previous).await;
                    self.state_repository.clear_active_scene().await?;
                }
                self.prune_arena().await;
            }
            SceneSignal::HumanRosterChanged { roster } => {
                self.apply_human_roster(roster).await;
            }
            SceneSignal::AvatarConfigChanged { id, config } => {
                self.apply_avatar_config(&id, &config).await?;
            }
            SceneSignal::SceneDrop { scene } => {
                self.import_scene(scene).await?;
            }
        }
        Ok(())
    }

    /// Patches live avatars by element id, falling back to avatar name.
    pub async fn apply_avatar_config(&self, target: &str, config: &Value) -> Result<usize> {
        self.arena.apply_config(target, config).await
    }

    /// Adopts a dropped scene and makes it active, like an explicit load.
    pub async fn import_scene(&self, scene: Scene) -> Result<Scene> {
        let scene = self.adopt_loaded(scene).await;
        self.switch_active_scene(Some(scene.id.clone())).await?;
        Ok(scene)
    }

    // ========================================================================
    // Active scene and runtime instances
    // ========================================================================

    /// Switches the active scene.
    ///
    /// The previous scene's instances are released before any instance of
    /// the new scene is created. Release failures are logged only.
    pub async fn switch_active_scene(&self, scene_id: Option<String>) -> Result<()> {
        let previous = {
            let local = self.local.read().await;
            if let Some(id) = scene_id.as_deref() {
                local.scene(id)?;
            }
            local.active_scene_id.clone()
        };
        if previous == scene_id {
            return Ok(());
        }

        if let Some(previous) = previous.as_deref() {
            let released = self.arena.release_scene(previous).await;
            tracing::debug!(
                "[SceneUseCase] Released {} instances of previous scene {}",
                released,
                previous
            );
        }

        self.local.write().await.active_scene_id = scene_id.clone();
        self.bridge.set_active(scene_id.clone()).await;

        match scene_id {
            Some(id) => {
                self.state_repository.set_active_scene(id.clone()).await?;
                let started = self.initialize_avatars(&id).await;
                tracing::info!(
                    "[SceneUseCase] Active scene is now {} ({} avatars started)",
                    id,
                    started
                );
            }
            None => {
                self.state_repository.clear_active_scene().await?;
                tracing::info!("[SceneUseCase] No active scene");
            }
        }
        Ok(())
    }

    async fn initialize_avatars(&self, scene_id: &str) -> usize {
        let avatars: Vec<(String, AvatarData)> = {
            let local = self.local.read().await;
            match local.scene(scene_id) {
                Ok(scene) => scene
                    .avatar_elements()
                    .filter_map(|(_, e)| e.avatar_data().map(|a| (e.id.clone(), a.clone())))
                    .collect(),
                Err(_) => return 0,
            }
        };

        let mut started = 0;
        for (element_id, avatar) in avatars {
            if self.spawn_avatar(scene_id, &element_id, avatar).await {
                started += 1;
            }
        }
        started
    }

    /// Instantiates one avatar. The instance is kept only if, once ready,
    /// the scene is still active and the element still carries the avatar.
    async fn spawn_avatar(&self, scene_id: &str, element_id: &str, avatar: AvatarData) -> bool {
        let Some(container) = self.render_targets.container_for(element_id) else {
            tracing::warn!(
                "[SceneUseCase] No render target for element {}, skipping avatar {}",
                element_id,
                avatar.name
            );
            return false;
        };

        let ticket = self.arena.begin(element_id, scene_id).await;
        let instance = match self
            .avatar_runtime
            .initialize(element_id, &avatar, &container)
            .await
        {
            Ok(instance) => instance,
            Err(e) => {
                tracing::warn!(
                    "[SceneUseCase] Avatar {} failed to start for element {}: {}",
                    avatar.name,
                    element_id,
                    e
                );
                self.arena.abandon(&ticket).await;
                return false;
            }
        };

        // A scene release racing this check cancels the ticket, so
        // `complete` stops the instance either way.
        if !self.is_avatar_current(scene_id, element_id, &avatar).await {
            self.arena.abandon(&ticket).await;
        }
        self.arena.complete(ticket, &avatar.name, instance).await
    }

    async fn is_avatar_current(&self, scene_id: &str, element_id: &str, avatar: &AvatarData) -> bool {
        let local = self.local.read().await;
        if local.active_scene_id.as_deref() != Some(scene_id) {
            return false;
        }
        local
            .scene(scene_id)
            .ok()
            .and_then(|scene| scene.boxes.iter().find_map(|b| b.element(element_id)))
            .and_then(|e| e.avatar_data())
            .is_some_and(|current| current.id == avatar.id)
    }

    /// Releases instances whose element left the active scene.
    async fn prune_arena(&self) {
        let stale: Vec<String> = {
            let local = self.local.read().await;
            let active = local
                .active_scene_id
                .as_deref()
                .and_then(|id| local.scene(id).ok());
            let mut stale = Vec::new();
            for element_id in self.arena.element_ids().await {
                let live = active.is_some_and(|scene| {
                    scene
                        .boxes
                        .iter()
                        .any(|b| b.element(&element_id).is_some_and(|e| e.has_live_avatar()))
                });
                if !live {
                    stale.push(element_id);
                }
            }
            stale
        };
        self.arena.release_many(stale).await;
    }

    async fn release(&self, released: Released) {
        if !released.is_empty() {
            self.arena.release_many(released.element_ids).await;
        }
    }

    /// Moves live avatars into their current containers after the host
    /// remounted the stage. Returns how many were moved.
    pub async fn reattach_avatars(&self) -> usize {
        let targets = self.render_targets.clone();
        let moved = self
            .arena
            .reattach(|element_id| targets.container_for(element_id))
            .await;
        tracing::debug!("[SceneUseCase] Reattached {} avatar instances", moved);
        moved
    }

    /// Releases every live instance and drops any pending broadcast.
    pub async fn shutdown(&self) {
        self.bridge.cancel_pending();
        let released = self.arena.release_all().await;
        tracing::debug!("[SceneUseCase] Shutdown released {} instances", released);
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Saves a scene and clears its unsaved flag.
    ///
    /// The roster is re-applied first. The flag is only cleared if the scene
    /// was not edited while the save was in flight.
    pub async fn save_scene(&self, scene_id: &str) -> Result<SavedSceneSummary> {
        let scene = {
            let mut local = self.local.write().await;
            let roster = local.roster.clone();
            let scene = local.scene_mut(scene_id)?;
            roster.apply_to_scene(scene);
            scene.clone()
        };

        let summary = self.scene_repository.save(&scene).await?;

        let saved = {
            let mut local = self.local.write().await;
            match local.scene_mut(scene_id) {
                Ok(current) if current.same_content(&scene) => {
                    current.has_unsaved_changes = false;
                    Some(current.clone())
                }
                _ => None,
            }
        };
        if let Some(saved) = saved {
            self.bridge.publish_scene(saved).await;
        }
        tracing::info!(
            "[SceneUseCase] Saved scene {} ({} bytes, file_reference={})",
            summary.id,
            summary.size,
            summary.is_file_reference
        );
        Ok(summary)
    }

    /// Loads a scene from the record store into the local collection.
    ///
    /// A large scene yields [`LoadOutcome::AwaitingBlob`]; that is a normal
    /// intermediate state, not an error.
    pub async fn load_scene(&self, scene_id: &str) -> Result<LoadOutcome> {
        self.local.write().await.tombstones.remove(scene_id);
        match self.scene_repository.load(scene_id).await? {
            None => Ok(LoadOutcome::Missing),
            Some(SceneLoad::Ready(scene)) => Ok(LoadOutcome::Loaded(self.adopt_loaded(scene).await)),
            Some(SceneLoad::AwaitingBlob(summary)) => {
                tracing::debug!(
                    "[SceneUseCase] Scene {} awaits blob fetch ({} bytes)",
                    summary.id,
                    summary.size
                );
                Ok(LoadOutcome::AwaitingBlob(summary))
            }
        }
    }

    /// Fetches the blob of a large scene and adopts it.
    ///
    /// Returns `None` when the scene was deleted while the fetch was in
    /// flight; the fetched payload is then discarded.
    pub async fn complete_blob_fetch(&self, summary: &SavedSceneSummary) -> Result<Option<Scene>> {
        let scene = self.scene_repository.fetch_blob(summary).await?;
        if self.local.read().await.tombstones.contains(&summary.id) {
            tracing::debug!(
                "[SceneUseCase] Discarding blob of deleted scene {}",
                summary.id
            );
            return Ok(None);
        }
        Ok(Some(self.adopt_loaded(scene).await))
    }

    /// Loads a scene, fetching its blob if needed, and makes it active.
    pub async fn open_scene(&self, scene_id: &str) -> Result<Option<Scene>> {
        let scene = match self.load_scene(scene_id).await? {
            LoadOutcome::Loaded(scene) => scene,
            LoadOutcome::AwaitingBlob(summary) => match self.complete_blob_fetch(&summary).await? {
                Some(scene) => scene,
                None => return Ok(None),
            },
            LoadOutcome::Missing => return Ok(None),
        };
        self.switch_active_scene(Some(scene.id.clone())).await?;
        Ok(Some(scene))
    }

    async fn adopt_loaded(&self, mut scene: Scene) -> Scene {
        {
            let mut local = self.local.write().await;
            local.roster.apply_to_scene(&mut scene);
            scene.has_unsaved_changes = false;
            local.put(scene.clone());
        }
        self.bridge.publish_scene(scene.clone()).await;
        scene
    }

    /// Renders and applies a thumbnail.
    ///
    /// Returns `false` without applying anything when no renderer is set or
    /// the scene was deleted while rendering.
    pub async fn generate_thumbnail(&self, scene_id: &str) -> Result<bool> {
        let Some(renderer) = self.thumbnail_renderer.read().await.clone() else {
            tracing::debug!("[SceneUseCase] No thumbnail renderer configured");
            return Ok(false);
        };
        let snapshot = self.scene(scene_id).await?;
        let thumbnail = renderer.render(&snapshot).await?;

        let updated = {
            let mut local = self.local.write().await;
            match local.scene_mut(scene_id) {
                Ok(scene) => {
                    scene.thumbnail = Some(thumbnail);
                    Some(scene.clone())
                }
                Err(_) => None,
            }
        };
        match updated {
            Some(scene) => {
                self.bridge.publish_scene(scene).await;
                Ok(true)
            }
            None => {
                tracing::debug!(
                    "[SceneUseCase] Scene {} deleted before its thumbnail finished",
                    scene_id
                );
                Ok(false)
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Find → update → publish for one scene.
    ///
    /// The closure receives the scene and the party registry; the human
    /// roster is re-applied afterwards. A scene whose content changed is
    /// marked unsaved, pushed to the shared store, and
    /// saved right away if it outgrew the large-object threshold.
    async fn update_scene<F, R>(&self, scene_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Scene, &mut PartyRegistry) -> Result<R>,
    {
        let (result, changed, parties) = {
            let mut local = self.local.write().await;
            let EditorLocal {
                scenes,
                parties,
                roster,
                ..
            } = &mut *local;
            let scene = scenes
                .iter_mut()
                .find(|s| s.id == scene_id)
                .ok_or_else(|| SceneError::not_found("Scene", scene_id))?;

            let before = scene.clone();
            let parties_before = parties.clone();
            let result = f(scene, parties)?;
            roster.apply_to_scene(scene);

            let changed = (!before.same_content(scene)).then(|| {
                scene.has_unsaved_changes = true;
                scene.clone()
            });
            let parties = (*parties != parties_before).then(|| parties.clone());
            (result, changed, parties)
        };

        if let Some(parties) = parties {
            self.state_repository.save_parties(parties).await?;
        }
        if let Some(scene) = changed {
            self.bridge.publish_scene(scene.clone()).await;
            self.autosave_if_large(&scene).await?;
        }
        Ok(result)
    }

    async fn autosave_if_large(&self, scene: &Scene) -> Result<()> {
        if !self.config.autosave_large_scenes {
            return Ok(());
        }
        let size = serde_json::to_vec(scene)?.len();
        let crossed = {
            let mut local = self.local.write().await;
            if size > self.config.large_object_threshold {
                local.large.insert(scene.id.clone())
            } else {
                local.large.remove(&scene.id);
                false
            }
        };
        // Only the edit that takes the scene over the threshold saves
        if crossed {
            tracing::info!(
                "[SceneUseCase] Scene {} reached {} bytes, saving immediately",
                scene.id,
                size
            );
            self.save_scene(&scene.id).await?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SceneError::invalid("scene name must not be empty"));
    }
    Ok(trimmed.to_string())
}
