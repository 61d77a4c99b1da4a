use async_trait::async_trait;
use scena_application::{LoadOutcome, SceneStore, SceneUseCase};
use scena_core::config::EditorConfig;
use scena_core::element::{DeleteOutcome, DropPayload};
use scena_core::error::Result;
use scena_core::layout::{FrameCoalescer, MoveGrab, Point, Rect, SurfaceBounds};
use scena_core::roster::HumanRoster;
use scena_core::runtime::{
    AvatarInstance, AvatarRuntime, RenderTarget, RenderTargetProvider, ThumbnailRenderer,
};
use scena_core::scene::{
    AvatarData, ContentData, ContentKind, SavedSceneSummary, Scene, SceneLoad, SceneRepository,
};
use scena_core::signal::{SceneSignal, SignalBus};
use scena_infrastructure::{DirSceneRepository, FileEditorStateRepository, ScenaPaths};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

#[derive(Default)]
struct FakeRuntime {
    started: AtomicUsize,
    stopped: Arc<AtomicUsize>,
    reattached: Arc<AtomicUsize>,
    /// Avatar name whose start blocks until `release` is notified
    gated: Option<String>,
    entered: Notify,
    release: Notify,
}

struct FakeInstance {
    stopped: Arc<AtomicUsize>,
    reattached: Arc<AtomicUsize>,
}

#[async_trait]
impl AvatarInstance for FakeInstance {
    async fn stop(&mut self) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reattach(&mut self, _container: &RenderTarget) -> Result<()> {
        self.reattached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_config(&mut self, _config: &Value) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AvatarRuntime for FakeRuntime {
    async fn initialize(
        &self,
        _element_id: &str,
        avatar: &AvatarData,
        _container: &RenderTarget,
    ) -> Result<Box<dyn AvatarInstance>> {
        if self.gated.as_deref() == Some(avatar.name.as_str()) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInstance {
            stopped: self.stopped.clone(),
            reattached: self.reattached.clone(),
        }))
    }
}

struct MountedTargets;

impl RenderTargetProvider for MountedTargets {
    fn container_for(&self, element_id: &str) -> Option<RenderTarget> {
        Some(RenderTarget::new(format!("avatar-{}", element_id)))
    }
}

#[derive(Default)]
struct GatedThumbnails {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ThumbnailRenderer for GatedThumbnails {
    async fn render(&self, scene: &Scene) -> Result<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(format!("data:image/png;base64,{}", scene.id))
    }
}

/// Counts saves on top of the file-backed repository.
struct CountingScenes {
    inner: DirSceneRepository,
    saves: AtomicUsize,
}

#[async_trait]
impl SceneRepository for CountingScenes {
    async fn save(&self, scene: &Scene) -> Result<SavedSceneSummary> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(scene).await
    }

    async fn load(&self, scene_id: &str) -> Result<Option<SceneLoad>> {
        self.inner.load(scene_id).await
    }

    async fn fetch_blob(&self, summary: &SavedSceneSummary) -> Result<Scene> {
        self.inner.fetch_blob(summary).await
    }

    async fn list(&self) -> Result<Vec<SavedSceneSummary>> {
        self.inner.list().await
    }

    async fn delete(&self, scene_id: &str) -> Result<()> {
        self.inner.delete(scene_id).await
    }
}

fn test_config() -> EditorConfig {
    EditorConfig {
        debounce_ms: 10,
        autosave_large_scenes: false,
        ..EditorConfig::default()
    }
}

async fn usecase(
    temp_dir: &TempDir,
    config: EditorConfig,
    store: Arc<SceneStore>,
    bus: SignalBus,
    runtime: Arc<FakeRuntime>,
) -> Arc<SceneUseCase> {
    let paths = ScenaPaths::new(Some(temp_dir.path().to_path_buf())).unwrap();
    let scenes = DirSceneRepository::with_threshold(paths.clone(), config.large_object_threshold)
        .await
        .unwrap();
    let state = FileEditorStateRepository::new(&paths).await.unwrap();
    let usecase = SceneUseCase::new(
        Arc::new(scenes),
        Arc::new(state),
        runtime,
        Arc::new(MountedTargets),
        store,
        bus,
        config,
    );
    usecase.initialize().await.unwrap();
    Arc::new(usecase)
}

async fn simple(temp_dir: &TempDir) -> (Arc<SceneUseCase>, Arc<FakeRuntime>) {
    let runtime = Arc::new(FakeRuntime::default());
    let usecase = usecase(
        temp_dir,
        test_config(),
        Arc::new(SceneStore::new()),
        SignalBus::default(),
        runtime.clone(),
    )
    .await;
    (usecase, runtime)
}

fn avatar(id: &str, name: &str) -> DropPayload {
    DropPayload::Avatar(AvatarData::new(id, name))
}

/// Creates a scene whose single box holds `names.len()` avatars.
async fn scene_with_avatars(usecase: &SceneUseCase, scene_name: &str, names: &[&str]) -> Scene {
    let scene = usecase.create_scene(scene_name).await.unwrap();
    let box_id = scene.boxes[0].id.clone();
    usecase
        .set_element_count(&scene.id, &box_id, names.len())
        .await
        .unwrap();
    let element_ids: Vec<String> = usecase.scene(&scene.id).await.unwrap().boxes[0]
        .elements
        .iter()
        .map(|e| e.id.clone())
        .collect();
    for (element_id, name) in element_ids.iter().zip(names) {
        usecase
            .drop_payload(&scene.id, &box_id, element_id, avatar(&format!("p-{}", name), name))
            .await
            .unwrap();
    }
    usecase.scene(&scene.id).await.unwrap()
}

#[tokio::test]
async fn test_new_scene_has_default_box_and_is_unsaved() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;

    let scene = usecase.create_scene("  Debate  ").await.unwrap();
    assert_eq!(scene.name, "Debate");
    assert_eq!(scene.boxes.len(), 1);
    assert_eq!(scene.boxes[0].elements.len(), 1);
    assert!(scene.has_unsaved_changes);

    assert!(usecase.create_scene("   ").await.is_err());
}

#[tokio::test]
async fn test_last_element_cannot_be_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;
    let scene = usecase.create_scene("Solo").await.unwrap();
    let scene_box = &scene.boxes[0];

    let outcome = usecase
        .delete_element(&scene.id, &scene_box.id, &scene_box.elements[0].id)
        .await
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::RejectedLastElement);
    assert_eq!(usecase.scene(&scene.id).await.unwrap().boxes[0].elements.len(), 1);
}

#[tokio::test]
async fn test_truncating_elements_releases_their_avatars() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, runtime) = simple(&temp_dir).await;
    let scene = scene_with_avatars(&usecase, "Panel", &["Mai", "Ken", "Aya"]).await;

    usecase
        .switch_active_scene(Some(scene.id.clone()))
        .await
        .unwrap();
    assert_eq!(usecase.arena().len().await, 3);

    usecase
        .set_element_count(&scene.id, &scene.boxes[0].id, 1)
        .await
        .unwrap();
    assert_eq!(usecase.arena().len().await, 1);
    assert_eq!(runtime.stopped.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retyping_avatar_releases_it() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;
    let scene = scene_with_avatars(&usecase, "Panel", &["Mai"]).await;
    usecase
        .switch_active_scene(Some(scene.id.clone()))
        .await
        .unwrap();
    let scene_box = &scene.boxes[0];
    let element_id = scene_box.elements[0].id.clone();
    assert!(usecase.arena().contains(&element_id).await);

    usecase
        .drop_payload(
            &scene.id,
            &scene_box.id,
            &element_id,
            DropPayload::Content(ContentData::new(ContentKind::Image)),
        )
        .await
        .unwrap();
    assert!(!usecase.arena().contains(&element_id).await);
}

#[tokio::test]
async fn test_delete_scene_requires_confirmation() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;
    let scene = usecase.create_scene("Keep me").await.unwrap();
    usecase.save_scene(&scene.id).await.unwrap();

    let err = usecase.delete_scene(&scene.id, false).await.unwrap_err();
    assert!(err.is_confirmation_required());
    assert_eq!(usecase.scenes().await.len(), 1);

    usecase.delete_scene(&scene.id, true).await.unwrap();
    assert!(usecase.scenes().await.is_empty());
    assert!(usecase.list_saved().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_switching_scene_releases_previous_instances() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, runtime) = simple(&temp_dir).await;
    let first = scene_with_avatars(&usecase, "First", &["Mai", "Ken"]).await;
    let second = scene_with_avatars(&usecase, "Second", &["Aya"]).await;

    usecase
        .switch_active_scene(Some(first.id.clone()))
        .await
        .unwrap();
    assert_eq!(usecase.arena().len().await, 2);

    usecase
        .switch_active_scene(Some(second.id.clone()))
        .await
        .unwrap();
    assert_eq!(runtime.stopped.load(Ordering::SeqCst), 2);
    assert_eq!(
        usecase.arena().element_ids().await,
        vec![second.boxes[0].elements[0].id.clone()]
    );
}

#[tokio::test]
async fn test_remounted_stage_reattaches_live_avatars() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, runtime) = simple(&temp_dir).await;
    let scene = scene_with_avatars(&usecase, "Stage", &["Mai", "Ken"]).await;
    assert_eq!(usecase.reattach_avatars().await, 0);

    usecase
        .switch_active_scene(Some(scene.id.clone()))
        .await
        .unwrap();
    assert_eq!(usecase.reattach_avatars().await, 2);
    assert_eq!(runtime.reattached.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.started.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_avatar_finishing_after_switch_is_discarded() {
    let temp_dir = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime {
        gated: Some("Slow".to_string()),
        ..FakeRuntime::default()
    });
    let usecase = usecase(
        &temp_dir,
        test_config(),
        Arc::new(SceneStore::new()),
        SignalBus::default(),
        runtime.clone(),
    )
    .await;
    let slow = scene_with_avatars(&usecase, "Slow scene", &["Slow"]).await;
    let other = usecase.create_scene("Other").await.unwrap();

    let switching = {
        let usecase = usecase.clone();
        let scene_id = slow.id.clone();
        tokio::spawn(async move { usecase.switch_active_scene(Some(scene_id)).await })
    };
    runtime.entered.notified().await;

    usecase
        .switch_active_scene(Some(other.id.clone()))
        .await
        .unwrap();
    runtime.release.notify_one();
    switching.await.unwrap().unwrap();

    assert!(usecase.arena().is_empty().await);
    assert_eq!(runtime.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(usecase.active_scene_id().await, Some(other.id));
}

#[tokio::test]
async fn test_human_roster_propagates_without_dirtying() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;
    let scene = scene_with_avatars(&usecase, "Cast", &["Mai", "Ken"]).await;
    usecase.save_scene(&scene.id).await.unwrap();

    usecase
        .set_human_roster(HumanRoster::new(["Mai"]))
        .await;

    let scene = usecase.scene(&scene.id).await.unwrap();
    let flags: Vec<(String, bool)> = scene
        .avatar_elements()
        .filter_map(|(_, e)| e.avatar_data())
        .map(|a| (a.name.clone(), a.is_human))
        .collect();
    assert_eq!(
        flags,
        vec![("Mai".to_string(), true), ("Ken".to_string(), false)]
    );
    assert!(!scene.has_unsaved_changes);
    assert!(usecase.human_roster().await.is_propagated(&usecase.scenes().await));
}

#[tokio::test]
async fn test_large_scene_loads_through_blob_fetch() {
    let temp_dir = TempDir::new().unwrap();
    let config = EditorConfig {
        large_object_threshold: 1024,
        ..test_config()
    };
    let runtime = Arc::new(FakeRuntime::default());
    let writer = usecase(
        &temp_dir,
        config.clone(),
        Arc::new(SceneStore::new()),
        SignalBus::default(),
        runtime.clone(),
    )
    .await;
    let scene = scene_with_avatars(&writer, "Crowd", &["Mai", "Ken", "Aya", "Rin"]).await;
    for i in 0..6 {
        writer
            .add_box(&scene.id, Rect::new(10.0 * i as f64, 50.0, 10.0, 20.0))
            .await
            .unwrap();
    }
    let summary = writer.save_scene(&scene.id).await.unwrap();
    assert!(summary.is_file_reference);

    let reader = usecase(
        &temp_dir,
        config,
        Arc::new(SceneStore::new()),
        SignalBus::default(),
        runtime,
    )
    .await;
    assert!(reader.scenes().await.is_empty());

    let pending = match reader.load_scene(&scene.id).await.unwrap() {
        LoadOutcome::AwaitingBlob(pending) => pending,
        other => panic!("expected a deferred load, got {:?}", other),
    };
    assert_eq!(pending.preview.box_positions.len(), 7);
    assert_eq!(pending.preview.avatar_names.len(), 4);

    let loaded = reader.complete_blob_fetch(&pending).await.unwrap().unwrap();
    assert_eq!(loaded.boxes.len(), 7);
    assert!(!loaded.has_unsaved_changes);
}

#[tokio::test]
async fn test_growing_past_threshold_saves_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let config = EditorConfig {
        large_object_threshold: 2048,
        autosave_large_scenes: true,
        ..test_config()
    };
    let runtime = Arc::new(FakeRuntime::default());
    let usecase = usecase(
        &temp_dir,
        config,
        Arc::new(SceneStore::new()),
        SignalBus::default(),
        runtime,
    )
    .await;
    let scene = usecase.create_scene("Growing").await.unwrap();
    assert!(usecase.list_saved().await.unwrap().is_empty());

    for i in 0..20 {
        usecase
            .add_box(&scene.id, Rect::new(4.0 * i as f64, 10.0, 10.0, 10.0))
            .await
            .unwrap();
    }

    let saved = usecase.list_saved().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].is_file_reference);
    assert!(!usecase.scene(&scene.id).await.unwrap().has_unsaved_changes);
}

#[tokio::test]
async fn test_large_scene_autosaves_once_per_crossing() {
    let temp_dir = TempDir::new().unwrap();
    let config = EditorConfig {
        large_object_threshold: 300,
        autosave_large_scenes: true,
        ..test_config()
    };
    let paths = ScenaPaths::new(Some(temp_dir.path().to_path_buf())).unwrap();
    let scenes = Arc::new(CountingScenes {
        inner: DirSceneRepository::with_threshold(paths.clone(), config.large_object_threshold)
            .await
            .unwrap(),
        saves: AtomicUsize::new(0),
    });
    let state = FileEditorStateRepository::new(&paths).await.unwrap();
    let usecase = SceneUseCase::new(
        scenes.clone(),
        Arc::new(state),
        Arc::new(FakeRuntime::default()),
        Arc::new(MountedTargets),
        Arc::new(SceneStore::new()),
        SignalBus::default(),
        config,
    );
    usecase.initialize().await.unwrap();

    let scene = usecase.create_scene("Crossing").await.unwrap();
    let box_id = scene.boxes[0].id.clone();
    for i in 0..4 {
        usecase
            .add_box(&scene.id, Rect::new(10.0 * i as f64, 60.0, 10.0, 10.0))
            .await
            .unwrap();
    }
    for i in 0..20 {
        usecase
            .set_box_rect(&scene.id, &box_id, Rect::new(i as f64, 10.0, 40.0, 40.0))
            .await
            .unwrap();
    }

    assert_eq!(scenes.saves.load(Ordering::SeqCst), 1);
    assert!(usecase.scene(&scene.id).await.unwrap().has_unsaved_changes);
}

#[tokio::test]
async fn test_gesture_frames_apply_latest_pointer_only() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;
    let scene = usecase.create_scene("Gestures").await.unwrap();
    let scene_box = scene.boxes[0].clone();
    let bounds = SurfaceBounds::new(0.0, 0.0, 1000.0, 500.0);

    // Grab the box at its top-left corner (10%, 10%)
    let grab = MoveGrab::begin(scene_box.rect(), bounds, Point::new(100.0, 50.0));
    let mut moves = FrameCoalescer::new();
    for step in 1..=5 {
        moves.push(Point::new(100.0 + 20.0 * step as f64, 50.0));
    }
    let rect = usecase
        .move_box_frame(&scene.id, &scene_box.id, &grab, bounds, &mut moves)
        .await
        .unwrap()
        .unwrap();
    assert!((rect.x - 20.0).abs() < 1e-9);
    assert!(usecase
        .move_box_frame(&scene.id, &scene_box.id, &grab, bounds, &mut moves)
        .await
        .unwrap()
        .is_none());
    assert_eq!(moves.stats(), (5, 1));

    usecase
        .set_element_count(&scene.id, &scene_box.id, 2)
        .await
        .unwrap();
    let drag = usecase.scene(&scene.id).await.unwrap().boxes[0]
        .panes
        .begin_divider_drag(0, 200.0)
        .unwrap();
    let mut pointer = FrameCoalescer::new();
    for x in [210.0, 230.0, 240.0] {
        pointer.push(x);
    }
    assert!(usecase
        .drag_divider_frame(&scene.id, &scene_box.id, &drag, &mut pointer, 400.0)
        .await
        .unwrap());
    assert!(!usecase
        .drag_divider_frame(&scene.id, &scene_box.id, &drag, &mut pointer, 400.0)
        .await
        .unwrap());
    let widths = usecase.scene(&scene.id).await.unwrap().boxes[0]
        .panes
        .widths()
        .to_vec();
    assert!((widths[0] - 60.0).abs() < 1e-9 && (widths[1] - 40.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_thumbnail_for_deleted_scene_is_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;
    let renderer = Arc::new(GatedThumbnails::default());
    usecase.set_thumbnail_renderer(renderer.clone()).await;
    let scene = usecase.create_scene("Short-lived").await.unwrap();

    let rendering = {
        let usecase = usecase.clone();
        let scene_id = scene.id.clone();
        tokio::spawn(async move { usecase.generate_thumbnail(&scene_id).await })
    };
    renderer.entered.notified().await;
    usecase.delete_scene(&scene.id, true).await.unwrap();
    renderer.release.notify_one();

    assert!(!rendering.await.unwrap().unwrap());
    assert!(usecase.scenes().await.is_empty());
}

#[tokio::test]
async fn test_restart_restores_scenes_and_active_scene() {
    let temp_dir = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::default());
    let scene_id = {
        let (usecase, _) = simple(&temp_dir).await;
        let scene = scene_with_avatars(&usecase, "Persisted", &["Mai"]).await;
        usecase.save_scene(&scene.id).await.unwrap();
        usecase
            .switch_active_scene(Some(scene.id.clone()))
            .await
            .unwrap();
        usecase.shutdown().await;
        scene.id
    };

    let usecase = usecase(
        &temp_dir,
        test_config(),
        Arc::new(SceneStore::new()),
        SignalBus::default(),
        runtime.clone(),
    )
    .await;
    assert_eq!(usecase.active_scene_id().await, Some(scene_id));
    assert_eq!(usecase.scenes().await.len(), 1);
    assert_eq!(runtime.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_two_surfaces_converge_over_the_bus() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SceneStore::new());
    let bus = SignalBus::default();
    let runtime = Arc::new(FakeRuntime::default());

    let editor = usecase(&temp_dir, test_config(), store.clone(), bus.clone(), runtime.clone()).await;
    let viewer = usecase(&temp_dir, test_config(), store, bus, runtime).await;
    let listener = viewer.spawn_signal_listener();

    let scene = editor.create_scene("Shared").await.unwrap();
    editor
        .rename_scene(&scene.id, "Shared and renamed")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = viewer.scene(&scene.id).await.unwrap();
    assert_eq!(seen.name, "Shared and renamed");

    listener.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rename_racing_incoming_broadcast_survives() {
    let temp_dir = TempDir::new().unwrap();
    let (usecase, _) = simple(&temp_dir).await;
    let scene = usecase.create_scene("Contested").await.unwrap();

    for i in 0..200 {
        let mut remote = usecase.scene(&scene.id).await.unwrap();
        remote.name = format!("Remote {}", i);
        remote.has_unsaved_changes = false;
        let signal = SceneSignal::ScenesUpdated {
            scenes: vec![remote],
            active_scene_id: None,
            initiator: true,
            origin: Some("another-surface".to_string()),
        };

        let incoming = {
            let usecase = usecase.clone();
            tokio::spawn(async move { usecase.handle_signal(signal).await })
        };
        let renaming = {
            let usecase = usecase.clone();
            let scene_id = scene.id.clone();
            tokio::spawn(async move {
                usecase
                    .rename_scene(&scene_id, &format!("Local {}", i))
                    .await
            })
        };
        incoming.await.unwrap().unwrap();
        renaming.await.unwrap().unwrap();

        let local = usecase.scene(&scene.id).await.unwrap();
        assert_eq!(local.name, format!("Local {}", i));
        assert!(local.has_unsaved_changes);
    }
}
