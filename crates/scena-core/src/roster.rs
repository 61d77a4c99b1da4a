//! Human participant roster.
//!
//! `AvatarData::is_human` is derived state: it is recomputed from the roster
//! whenever scenes are loaded, saved, or the roster changes.

use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Names of avatars that are played by humans.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HumanRoster {
    names: BTreeSet<String>,
}

impl HumanRoster {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sets `is_human` on every avatar of `scene`. Returns how many flags
    /// changed.
    pub fn apply_to_scene(&self, scene: &mut Scene) -> usize {
        let mut changed = 0;
        for scene_box in &mut scene.boxes {
            for element in &mut scene_box.elements {
                if let Some(avatar) = element.avatar_data_mut() {
                    let is_human = self.contains(&avatar.name);
                    if avatar.is_human != is_human {
                        avatar.is_human = is_human;
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Applies the roster to every scene. Returns how many flags changed.
    pub fn apply_to_scenes(&self, scenes: &mut [Scene]) -> usize {
        scenes.iter_mut().map(|scene| self.apply_to_scene(scene)).sum()
    }

    /// True if every avatar in `scenes` agrees with the roster.
    pub fn is_propagated(&self, scenes: &[Scene]) -> bool {
        scenes.iter().all(|scene| {
            scene.avatar_elements().all(|(_, element)| {
                element
                    .avatar_data()
                    .is_none_or(|avatar| avatar.is_human == self.contains(&avatar.name))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Rect;
    use crate::scene::{AvatarData, Element, SceneBox};

    fn scene_with(names: &[&str]) -> Scene {
        let mut scene = Scene::new("Panel");
        let mut scene_box = SceneBox::new(Rect::new(0.0, 0.0, 60.0, 40.0));
        scene_box.elements = names
            .iter()
            .map(|name| Element::avatar(AvatarData::new(*name, *name)))
            .collect();
        scene_box.panes.reset(names.len());
        scene.boxes.push(scene_box);
        scene
    }

    #[test]
    fn test_flags_follow_roster() {
        let mut scenes = vec![scene_with(&["Mai", "Ken"]), scene_with(&["Ken", "Yui"])];
        let roster = HumanRoster::new(["Ken"]);

        let changed = roster.apply_to_scenes(&mut scenes);
        assert_eq!(changed, 2);
        assert!(roster.is_propagated(&scenes));

        let ken = scenes[1].boxes[0].elements[0].avatar_data().unwrap();
        assert!(ken.is_human);
        let yui = scenes[1].boxes[0].elements[1].avatar_data().unwrap();
        assert!(!yui.is_human);
    }

    #[test]
    fn test_roster_change_clears_stale_flags() {
        let mut scenes = vec![scene_with(&["Mai"])];
        HumanRoster::new(["Mai"]).apply_to_scenes(&mut scenes);
        let empty = HumanRoster::default();
        assert!(!empty.is_propagated(&scenes));

        assert_eq!(empty.apply_to_scenes(&mut scenes), 1);
        assert!(empty.is_propagated(&scenes));
        // Applying again is a no-op.
        assert_eq!(empty.apply_to_scenes(&mut scenes), 0);
    }
}
