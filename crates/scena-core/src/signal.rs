//! Typed publish/subscribe channels between editor surfaces.
//!
//! Every channel has a fixed payload type, so listeners match on a closed
//! enum rather than inspecting untyped event payloads.

use crate::roster::HumanRoster;
use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Channel names, as used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    ScenesUpdated,
    HumanRosterChanged,
    AvatarConfigChanged,
    SceneDrop,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::ScenesUpdated => "scenes-updated",
            Channel::HumanRosterChanged => "human-roster-changed",
            Channel::AvatarConfigChanged => "avatar-config-changed",
            Channel::SceneDrop => "scene-drop",
        }
    }
}

/// A message on one of the signal channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "kebab-case")]
pub enum SceneSignal {
    /// The shared scene collection changed.
    #[serde(rename_all = "camelCase")]
    ScenesUpdated {
        scenes: Vec<Scene>,
        active_scene_id: Option<String>,
        /// Only emissions with `initiator = true` are acted upon by passive
        /// listeners; echoes carry `false`.
        initiator: bool,
        /// Surface that published the update; listeners skip their own.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },
    /// The set of human-played avatar names changed.
    HumanRosterChanged { roster: HumanRoster },
    /// A runtime configuration patch for a live avatar, addressed by element
    /// id or avatar name.
    AvatarConfigChanged { id: String, config: Value },
    /// A scene was dropped onto a load target.
    SceneDrop { scene: Scene },
}

impl SceneSignal {
    pub fn channel(&self) -> Channel {
        match self {
            SceneSignal::ScenesUpdated { .. } => Channel::ScenesUpdated,
            SceneSignal::HumanRosterChanged { .. } => Channel::HumanRosterChanged,
            SceneSignal::AvatarConfigChanged { .. } => Channel::AvatarConfigChanged,
            SceneSignal::SceneDrop { .. } => Channel::SceneDrop,
        }
    }

    /// Whether a passive listener should act on this signal.
    pub fn is_actionable(&self) -> bool {
        match self {
            SceneSignal::ScenesUpdated { initiator, .. } => *initiator,
            _ => true,
        }
    }

    /// Whether this signal was published by `surface` itself.
    pub fn is_from(&self, surface: &str) -> bool {
        match self {
            SceneSignal::ScenesUpdated { origin, .. } => origin.as_deref() == Some(surface),
            _ => false,
        }
    }
}

const DEFAULT_CAPACITY: usize = 64;

/// Broadcast bus carrying [`SceneSignal`]s to every subscriber.
#[derive(Debug, Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<SceneSignal>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a signal. Returns the number of subscribers reached; zero
    /// subscribers is not an error.
    pub fn publish(&self, signal: SceneSignal) -> usize {
        let channel = signal.channel();
        match self.sender.send(signal) {
            Ok(count) => {
                tracing::trace!("[SignalBus] {} -> {} subscribers", channel.as_str(), count);
                count
            }
            Err(_) => {
                tracing::trace!("[SignalBus] {} dropped: no subscribers", channel.as_str());
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SceneSignal> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
