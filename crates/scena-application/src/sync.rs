//! Synchronization bridge between an editor surface and the shared store.
//!
//! Three surfaces hold scenes: the editor's local collection, the shared
//! [`SceneStore`], and the persisted record store. The bridge owns the
//! local↔shared rules:
//!
//! - an empty local collection never overwrites a non-empty shared one; it
//!   pulls instead
//! - local pushes to shared only when the scene-id sets differ, as a
//!   per-key merge
//! - every logical mutation schedules one debounced `scenes-updated`
//!   broadcast carrying the shared snapshot at fire time
//! - incoming broadcasts from other surfaces are applied to the store and
//!   merged into the local collection without being re-broadcast

use crate::debounce::Debouncer;
use crate::store::{SceneStore, StoreAction, WriteOutcome, merge_collections};
use scena_core::scene::Scene;
use scena_core::signal::{SceneSignal, SignalBus};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// What [`SyncBridge::reconcile`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Local was empty and adopted the shared collection.
    Pulled { count: usize },
    /// The id sets differed; local was merged into shared and adopted the
    /// merged result.
    Pushed { count: usize },
    /// Same id sets; nothing moved.
    InSync,
}

/// Bridge for one editor surface.
pub struct SyncBridge {
    surface_id: String,
    store: Arc<SceneStore>,
    bus: SignalBus,
    debouncer: Debouncer,
}

impl SyncBridge {
    pub fn new(store: Arc<SceneStore>, bus: SignalBus, debounce: Duration) -> Self {
        Self {
            surface_id: uuid::Uuid::new_v4().to_string(),
            store,
            bus,
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Identifier stamped on this surface's broadcasts.
    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    pub fn store(&self) -> &Arc<SceneStore> {
        &self.store
    }

    /// Reconciles the local collection with the shared store.
    pub async fn reconcile(&self, local: &mut Vec<Scene>) -> Reconciliation {
        loop {
            let shared = self.store.snapshot().await;

            if local.is_empty() {
                if shared.scenes.is_empty() {
                    return Reconciliation::InSync;
                }
                tracing::debug!(
                    "[SyncBridge] Local empty, pulling {} shared scenes",
                    shared.scenes.len()
                );
                *local = shared.scenes;
                return Reconciliation::Pulled { count: local.len() };
            }

            let local_ids: HashSet<&str> = local.iter().map(|s| s.id.as_str()).collect();
            if local_ids == shared.scene_ids() {
                return Reconciliation::InSync;
            }

            // The push decision is only valid for the version it was made on
            let outcome = self
                .store
                .dispatch_at(shared.version, StoreAction::MergeScenes(local.clone()))
                .await;
            if let WriteOutcome::Stale { current } = outcome {
                tracing::debug!(
                    "[SyncBridge] Store moved to version {} during reconcile, retrying",
                    current
                );
                continue;
            }

            *local = merge_collections(local, self.store.snapshot().await.scenes);
            tracing::debug!(
                "[SyncBridge] Id sets differed, merged to {} scenes",
                local.len()
            );
            self.notify_changed();
            return Reconciliation::Pushed { count: local.len() };
        }
    }

    /// Writes one scene through to the shared store and schedules a
    /// broadcast.
    pub async fn publish_scene(&self, scene: Scene) {
        if self
            .store
            .dispatch(StoreAction::UpsertScene(scene))
            .await
            .is_applied()
        {
            self.notify_changed();
        }
    }

    /// Removes a scene from the shared store and schedules a broadcast.
    pub async fn remove_scene(&self, scene_id: &str) {
        self.store
            .dispatch(StoreAction::RemoveScene(scene_id.to_string()))
            .await;
        self.notify_changed();
    }

    /// Tracks the active scene id in the shared store.
    pub async fn set_active(&self, scene_id: Option<String>) {
        if self
            .store
            .dispatch(StoreAction::SetActive(scene_id))
            .await
            .is_applied()
        {
            self.notify_changed();
        }
    }

    /// Schedules a debounced `scenes-updated` broadcast.
    pub fn notify_changed(&self) {
        let store = self.store.clone();
        let bus = self.bus.clone();
        let origin = self.surface_id.clone();
        self.debouncer.schedule(async move {
            let snapshot = store.snapshot().await;
            tracing::debug!(
                "[SyncBridge] Broadcasting scenes-updated ({} scenes, version {})",
                snapshot.scenes.len(),
                snapshot.version
            );
            bus.publish(SceneSignal::ScenesUpdated {
                scenes: snapshot.scenes,
                active_scene_id: snapshot.active_scene_id,
                initiator: true,
                origin: Some(origin),
            });
        });
    }

    /// Applies a `scenes-updated` broadcast from another surface.
    ///
    /// Returns `true` if the local collection changed. Non-initiator echoes
    /// and this surface's own broadcasts are ignored.
    pub async fn apply_incoming(&self, signal: &SceneSignal, local: &mut Vec<Scene>) -> bool {
        let SceneSignal::ScenesUpdated {
            scenes,
            active_scene_id,
            ..
        } = signal
        else {
            return false;
        };
        if !signal.is_actionable() || signal.is_from(&self.surface_id) {
            return false;
        }

        self.store
            .dispatch(StoreAction::ReplaceScenes {
                scenes: scenes.clone(),
                active_scene_id: active_scene_id.clone(),
            })
            .await;
        let shared = self.store.snapshot().await;

        if shared.scenes.is_empty() && !local.is_empty() {
            return false;
        }

        // Removals from the initiating surface apply, except for scenes with
        // unsaved local edits.
        let shared_ids = shared.scene_ids();
        let kept: Vec<Scene> = local
            .iter()
            .filter(|s| shared_ids.contains(s.id.as_str()) || s.has_unsaved_changes)
            .cloned()
            .collect();
        let merged = merge_collections(&kept, shared.scenes.clone());
        let changed = merged != *local;
        *local = merged;
        changed
    }

    /// Cancels a pending broadcast.
    pub fn cancel_pending(&self) {
        self.debouncer.cancel();
    }
}

/// Replays the result of an incoming merge onto the current local
/// collection.
///
/// `snapshot` is the local collection the merge was computed from and
/// `merged` its result. Scenes edited, created or deleted locally since the
/// snapshot keep their local state; everything else takes the merged copy.
/// Returns the new collection and the ids of the locally edited scenes.
pub fn rebase_local(
    snapshot: &[Scene],
    merged: Vec<Scene>,
    current: Vec<Scene>,
) -> (Vec<Scene>, Vec<String>) {
    let before = |id: &str| snapshot.iter().find(|s| s.id == id);
    let mut current: Vec<Option<Scene>> = current.into_iter().map(Some).collect();
    let mut take_current = |id: &str| {
        current
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|s| s.id == id))
            .and_then(Option::take)
    };

    let mut rebased = Vec::with_capacity(merged.len());
    let mut edited = Vec::new();
    for scene in merged {
        match (take_current(&scene.id), before(&scene.id)) {
            (Some(local), Some(old)) if local != *old => {
                edited.push(local.id.clone());
                rebased.push(local);
            }
            // Deleted locally meanwhile
            (None, Some(_)) => {}
            _ => rebased.push(scene),
        }
    }

    for local in current.into_iter().flatten() {
        let keep = match before(&local.id) {
            None => true,
            Some(old) => local != *old,
        };
        if keep {
            edited.push(local.id.clone());
            rebased.push(local);
        }
    }
    (rebased, edited)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(store: Arc<SceneStore>, bus: &SignalBus) -> SyncBridge {
        SyncBridge::new(store, bus.clone(), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_empty_local_pulls_from_shared() {
        let store = Arc::new(SceneStore::new());
        let bus = SignalBus::default();
        store
            .dispatch(StoreAction::UpsertScene(Scene::new("Shared")))
            .await;

        let bridge = bridge(store.clone(), &bus);
        let mut local = Vec::new();
        assert_eq!(
            bridge.reconcile(&mut local).await,
            Reconciliation::Pulled { count: 1 }
        );
        assert_eq!(local[0].name, "Shared");
        assert_eq!(store.snapshot().await.scenes.len(), 1);
    }

    #[tokio::test]
    async fn test_same_id_set_does_not_push() {
        let store = Arc::new(SceneStore::new());
        let bus = SignalBus::default();
        let scene = Scene::new("One");
        store
            .dispatch(StoreAction::UpsertScene(scene.clone()))
            .await;
        let version = store.version().await;

        let bridge = bridge(store.clone(), &bus);
        let mut local = vec![Scene {
            name: "Renamed locally".to_string(),
            ..scene
        }];
        assert_eq!(bridge.reconcile(&mut local).await, Reconciliation::InSync);
        assert_eq!(store.version().await, version);
    }

    #[tokio::test(start_paused = true)]
    async fn test_differing_ids_push_and_broadcast_once() {
        let store = Arc::new(SceneStore::new());
        let bus = SignalBus::default();
        let mut receiver = bus.subscribe();
        store
            .dispatch(StoreAction::UpsertScene(Scene::new("Remote")))
            .await;

        let bridge = bridge(store.clone(), &bus);
        let mut local = vec![Scene::new("Local")];
        assert_eq!(
            bridge.reconcile(&mut local).await,
            Reconciliation::Pushed { count: 2 }
        );
        bridge.notify_changed();
        bridge.notify_changed();

        tokio::time::sleep(Duration::from_millis(150)).await;
        match receiver.try_recv().unwrap() {
            SceneSignal::ScenesUpdated {
                scenes, initiator, ..
            } => {
                assert!(initiator);
                assert_eq!(scenes.len(), 2);
            }
            other => panic!("unexpected signal {:?}", other),
        }
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reconciles_all_land() {
        let store = Arc::new(SceneStore::new());
        let bus = SignalBus::default();
        store
            .dispatch(StoreAction::UpsertScene(Scene::new("Seed")))
            .await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let bridge = bridge(store.clone(), &bus);
            tasks.push(tokio::spawn(async move {
                let mut local = vec![Scene::new(format!("Surface {}", i))];
                bridge.reconcile(&mut local).await;
                local
            }));
        }
        for task in tasks {
            let local = task.await.unwrap();
            assert!(local.iter().any(|s| s.name == "Seed"));
        }

        let shared = store.snapshot().await;
        assert_eq!(shared.scenes.len(), 9);
        assert_eq!(shared.version, 9);
    }

    #[tokio::test]
    async fn test_own_and_echo_broadcasts_are_ignored() {
        let store = Arc::new(SceneStore::new());
        let bus = SignalBus::default();
        let bridge = bridge(store, &bus);
        let mut local = vec![Scene::new("Mine")];

        let own = SceneSignal::ScenesUpdated {
            scenes: Vec::new(),
            active_scene_id: None,
            initiator: true,
            origin: Some(bridge.surface_id().to_string()),
        };
        let echo = SceneSignal::ScenesUpdated {
            scenes: vec![Scene::new("Other")],
            active_scene_id: None,
            initiator: false,
            origin: Some("elsewhere".to_string()),
        };
        assert!(!bridge.apply_incoming(&own, &mut local).await);
        assert!(!bridge.apply_incoming(&echo, &mut local).await);
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_rebase_keeps_edits_made_during_merge() {
        let shared = Scene::new("Shared");
        let doomed = Scene::new("Removed remotely");
        let snapshot = vec![shared.clone(), doomed.clone()];

        let mut incoming = shared.clone();
        incoming.name = "Renamed remotely".to_string();
        let merged = vec![incoming];

        let mut edited = shared.clone();
        edited.name = "Renamed locally".to_string();
        edited.has_unsaved_changes = true;
        let created = Scene::new("Created meanwhile");
        let current = vec![edited, doomed, created.clone()];

        let (rebased, edits) = rebase_local(&snapshot, merged, current);
        let names: Vec<&str> = rebased.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Renamed locally", "Created meanwhile"]);
        assert_eq!(edits, vec![shared.id, created.id]);
    }

    #[test]
    fn test_rebase_without_local_edits_takes_merge() {
        let a = Scene::new("A");
        let mut incoming = a.clone();
        incoming.name = "A (remote)".to_string();

        let (rebased, edits) =
            rebase_local(std::slice::from_ref(&a), vec![incoming.clone()], vec![a.clone()]);
        assert_eq!(rebased, vec![incoming]);
        assert!(edits.is_empty());
    }

    #[tokio::test]
    async fn test_incoming_removal_spares_unsaved_scene() {
        let store = Arc::new(SceneStore::new());
        let bus = SignalBus::default();
        let bridge = bridge(store, &bus);

        let clean = Scene::new("Clean");
        let mut dirty = Scene::new("Dirty");
        dirty.has_unsaved_changes = true;
        let other = Scene::new("Other");
        let mut local = vec![clean, dirty.clone()];

        let incoming = SceneSignal::ScenesUpdated {
            scenes: vec![other.clone()],
            active_scene_id: Some(other.id.clone()),
            initiator: true,
            origin: Some("elsewhere".to_string()),
        };
        assert!(bridge.apply_incoming(&incoming, &mut local).await);
        let ids: Vec<&str> = local.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![dirty.id.as_str(), other.id.as_str()]);
    }
}
