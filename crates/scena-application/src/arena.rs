//! Arena of live avatar instances keyed by element id.
//!
//! The arena is the single owner of runtime avatar resources. Elements,
//! boxes and scenes never hold instances directly; they are released here
//! explicitly by element id when their element is truncated, retyped,
//! deleted, or when the scene is switched away from.
//!
//! Instantiation is asynchronous. Each start takes a [`Ticket`]; a result
//! arriving with a ticket that is no longer current (the element was
//! released or restarted meanwhile) is stopped immediately instead of being
//! stored.

use scena_core::error::Result;
use scena_core::runtime::{AvatarInstance, RenderTarget};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Proof of an in-flight instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    element_id: String,
    scene_id: String,
    serial: u64,
}

impl Ticket {
    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }
}

/// In-flight instantiation of one element.
struct Pending {
    serial: u64,
    scene_id: String,
}

struct Slot {
    scene_id: String,
    avatar_name: String,
    instance: Box<dyn AvatarInstance>,
}

/// Live avatar instances, keyed by element id.
#[derive(Default)]
pub struct RuntimeArena {
    slots: Mutex<HashMap<String, Slot>>,
    pending: Mutex<HashMap<String, Pending>>,
    next_serial: AtomicU64,
}

impl RuntimeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instantiation for `element_id` in `scene_id`,
    /// superseding any earlier one still in flight.
    pub async fn begin(&self, element_id: &str, scene_id: &str) -> Ticket {
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.lock().await.insert(
            element_id.to_string(),
            Pending {
                serial,
                scene_id: scene_id.to_string(),
            },
        );
        Ticket {
            element_id: element_id.to_string(),
            scene_id: scene_id.to_string(),
            serial,
        }
    }

    fn is_current(pending: &HashMap<String, Pending>, ticket: &Ticket) -> bool {
        pending
            .get(&ticket.element_id)
            .is_some_and(|p| p.serial == ticket.serial)
    }

    /// Stores a finished instance if its ticket is still current.
    ///
    /// Returns `false` (after stopping the instance) when the ticket was
    /// superseded or cancelled.
    pub async fn complete(
        &self,
        ticket: Ticket,
        avatar_name: &str,
        mut instance: Box<dyn AvatarInstance>,
    ) -> bool {
        // The pending lock is held until the slot is stored, so a concurrent
        // release either cancels the ticket or finds the slot.
        let mut pending = self.pending.lock().await;
        if !Self::is_current(&pending, &ticket) {
            drop(pending);
            tracing::debug!(
                "[RuntimeArena] Discarding stale instance for element {}",
                ticket.element_id
            );
            stop_logged(&ticket.element_id, instance.as_mut()).await;
            return false;
        }
        pending.remove(&ticket.element_id);

        let previous = self.slots.lock().await.insert(
            ticket.element_id.clone(),
            Slot {
                scene_id: ticket.scene_id.clone(),
                avatar_name: avatar_name.to_string(),
                instance,
            },
        );
        drop(pending);

        if let Some(mut previous) = previous {
            stop_logged(&ticket.element_id, previous.instance.as_mut()).await;
        }
        true
    }

    /// Withdraws `ticket` if it is still the current one for its element,
    /// leaving newer instantiations untouched.
    pub async fn abandon(&self, ticket: &Ticket) {
        let mut pending = self.pending.lock().await;
        if Self::is_current(&pending, ticket) {
            pending.remove(&ticket.element_id);
        }
    }

    /// Releases the instance of one element. Stop failures are logged.
    ///
    /// Returns whether an instance was held.
    pub async fn release(&self, element_id: &str) -> bool {
        let slot = {
            let mut pending = self.pending.lock().await;
            pending.remove(element_id);
            self.slots.lock().await.remove(element_id)
        };
        match slot {
            Some(mut slot) => {
                stop_logged(element_id, slot.instance.as_mut()).await;
                tracing::debug!("[RuntimeArena] Released element {}", element_id);
                true
            }
            None => false,
        }
    }

    /// Releases several elements; returns how many instances were held.
    pub async fn release_many<I, S>(&self, element_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut released = 0;
        for element_id in element_ids {
            if self.release(element_id.as_ref()).await {
                released += 1;
            }
        }
        released
    }

    /// Releases every instance belonging to `scene_id`, and cancels its
    /// in-flight instantiations.
    pub async fn release_scene(&self, scene_id: &str) -> usize {
        let slots: Vec<(String, Slot)> = {
            let mut pending = self.pending.lock().await;
            pending.retain(|_, p| p.scene_id != scene_id);
            let mut slots = self.slots.lock().await;
            let ids: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| slot.scene_id == scene_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| slots.remove(&id).map(|slot| (id, slot)))
                .collect()
        };

        let count = slots.len();
        for (element_id, mut slot) in slots {
            stop_logged(&element_id, slot.instance.as_mut()).await;
        }
        if count > 0 {
            tracing::info!(
                "[RuntimeArena] Released {} instances of scene {}",
                count,
                scene_id
            );
        }
        count
    }

    /// Releases everything, including in-flight instantiations.
    pub async fn release_all(&self) -> usize {
        let slots: Vec<(String, Slot)> = {
            let mut pending = self.pending.lock().await;
            pending.clear();
            self.slots.lock().await.drain().collect()
        };
        let count = slots.len();
        for (element_id, mut slot) in slots {
            stop_logged(&element_id, slot.instance.as_mut()).await;
        }
        count
    }

    /// Applies a configuration patch addressed by element id or, failing
    /// that, by avatar name (every instance with that name).
    ///
    /// Returns how many instances were patched.
    pub async fn apply_config(&self, target: &str, config: &Value) -> Result<usize> {
        let mut slots = self.slots.lock().await;

        if let Some(slot) = slots.get_mut(target) {
            slot.instance.apply_config(config).await?;
            return Ok(1);
        }

        let mut patched = 0;
        for (element_id, slot) in slots.iter_mut() {
            if slot.avatar_name != target {
                continue;
            }
            match slot.instance.apply_config(config).await {
                Ok(()) => patched += 1,
                Err(e) => tracing::warn!(
                    "[RuntimeArena] Config patch failed for element {}: {}",
                    element_id,
                    e
                ),
            }
        }
        if patched == 0 {
            tracing::debug!("[RuntimeArena] No live avatar matches '{}'", target);
        }
        Ok(patched)
    }

    /// Moves live instances into the containers `container_for` resolves
    /// now. Elements without a mounted container keep their current one.
    ///
    /// Returns how many instances were moved.
    pub async fn reattach<F>(&self, container_for: F) -> usize
    where
        F: Fn(&str) -> Option<RenderTarget>,
    {
        let mut slots = self.slots.lock().await;
        let mut moved = 0;
        for (element_id, slot) in slots.iter_mut() {
            let Some(container) = container_for(element_id) else {
                tracing::debug!(
                    "[RuntimeArena] No container mounted for element {}",
                    element_id
                );
                continue;
            };
            match slot.instance.reattach(&container).await {
                Ok(()) => moved += 1,
                Err(e) => tracing::warn!(
                    "[RuntimeArena] Failed to reattach avatar for element {}: {}",
                    element_id,
                    e
                ),
            }
        }
        moved
    }

    pub async fn contains(&self, element_id: &str) -> bool {
        self.slots.lock().await.contains_key(element_id)
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Element ids holding live instances, sorted.
    pub async fn element_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn stop_logged(element_id: &str, instance: &mut dyn AvatarInstance) {
    if let Err(e) = instance.stop().await {
        tracing::warn!(
            "[RuntimeArena] Failed to stop avatar for element {}: {}",
            element_id,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scena_core::SceneError;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        stopped: AtomicUsize,
        patched: AtomicUsize,
        reattached: AtomicUsize,
    }

    struct FakeInstance {
        counters: Arc<Counters>,
        fail_stop: bool,
    }

    #[async_trait]
    impl AvatarInstance for FakeInstance {
        async fn stop(&mut self) -> Result<()> {
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(SceneError::runtime("renderer gone"));
            }
            Ok(())
        }

        async fn reattach(&mut self, _container: &RenderTarget) -> Result<()> {
            self.counters.reattached.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn apply_config(&mut self, _config: &Value) -> Result<()> {
            self.counters.patched.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn instance(counters: &Arc<Counters>) -> Box<dyn AvatarInstance> {
        Box::new(FakeInstance {
            counters: counters.clone(),
            fail_stop: false,
        })
    }

    #[tokio::test]
    async fn test_reattach_skips_unmounted_elements() {
        let arena = RuntimeArena::new();
        let counters = Arc::new(Counters::default());
        for element_id in ["e1", "e2"] {
            let ticket = arena.begin(element_id, "s1").await;
            assert!(arena.complete(ticket, "Mai", instance(&counters)).await);
        }

        let moved = arena
            .reattach(|element_id| {
                (element_id == "e1").then(|| RenderTarget::new("avatar-e1-remounted"))
            })
            .await;
        assert_eq!(moved, 1);
        assert_eq!(counters.reattached.load(Ordering::SeqCst), 1);
        assert_eq!(arena.len().await, 2);
    }

    #[tokio::test]
    async fn test_stale_completion_is_stopped() {
        let arena = RuntimeArena::new();
        let counters = Arc::new(Counters::default());

        let first = arena.begin("e1", "s1").await;
        let second = arena.begin("e1", "s1").await;
        assert!(!arena.complete(first, "Mai", instance(&counters)).await);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
        assert!(arena.complete(second, "Mai", instance(&counters)).await);
        assert!(arena.contains("e1").await);
    }

    #[tokio::test]
    async fn test_release_before_completion_discards_result() {
        let arena = RuntimeArena::new();
        let counters = Arc::new(Counters::default());

        let ticket = arena.begin("e1", "s1").await;
        assert!(!arena.release("e1").await);
        assert!(!arena.complete(ticket, "Mai", instance(&counters)).await);
        assert!(arena.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_scene_only_touches_that_scene() {
        let arena = RuntimeArena::new();
        let counters = Arc::new(Counters::default());
        for (element, scene) in [("e1", "s1"), ("e2", "s1"), ("e3", "s2")] {
            let ticket = arena.begin(element, scene).await;
            arena.complete(ticket, "Mai", instance(&counters)).await;
        }

        assert_eq!(arena.release_scene("s1").await, 2);
        assert_eq!(arena.element_ids().await, vec!["e3".to_string()]);
    }

    #[tokio::test]
    async fn test_release_scene_cancels_in_flight_start() {
        let arena = RuntimeArena::new();
        let counters = Arc::new(Counters::default());

        let released = arena.begin("e1", "s1").await;
        let other = arena.begin("e2", "s2").await;
        assert_eq!(arena.release_scene("s1").await, 0);

        assert!(!arena.complete(released, "Mai", instance(&counters)).await);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
        assert!(arena.complete(other, "Ken", instance(&counters)).await);
        assert_eq!(arena.element_ids().await, vec!["e2".to_string()]);
    }

    #[tokio::test]
    async fn test_stop_failure_is_not_fatal() {
        let arena = RuntimeArena::new();
        let counters = Arc::new(Counters::default());
        let ticket = arena.begin("e1", "s1").await;
        arena
            .complete(
                ticket,
                "Mai",
                Box::new(FakeInstance {
                    counters: counters.clone(),
                    fail_stop: true,
                }),
            )
            .await;

        assert!(arena.release("e1").await);
        assert!(arena.is_empty().await);
    }

    #[tokio::test]
    async fn test_apply_config_by_id_then_name() {
        let arena = RuntimeArena::new();
        let counters = Arc::new(Counters::default());
        for (element, name) in [("e1", "Mai"), ("e2", "Mai"), ("e3", "Ken")] {
            let ticket = arena.begin(element, "s1").await;
            arena.complete(ticket, name, instance(&counters)).await;
        }

        let config = serde_json::json!({"expression": "smile"});
        assert_eq!(arena.apply_config("e3", &config).await.unwrap(), 1);
        assert_eq!(arena.apply_config("Mai", &config).await.unwrap(), 2);
        assert_eq!(arena.apply_config("Nobody", &config).await.unwrap(), 0);
        assert_eq!(counters.patched.load(Ordering::SeqCst), 3);
    }
}
