//! Saved scene summaries and load states.
//!
//! A summary is what a scene picker renders: enough to draw a preview
//! without touching the (possibly large, out-of-band) scene payload.

use super::model::Scene;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scenes whose serialized form exceeds this many bytes are stored as a
/// preview record plus a separate blob.
pub const LARGE_OBJECT_THRESHOLD: usize = 2_097_152;

/// Position of one box, for preview rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxPosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
}

/// Lightweight description of a scene's contents.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePreview {
    pub box_positions: Vec<BoxPosition>,
    pub avatar_names: Vec<String>,
    pub parties: Vec<String>,
    pub has_content: bool,
    pub has_avatars: bool,
}

impl ScenePreview {
    pub fn from_scene(scene: &Scene) -> Self {
        let box_positions = scene
            .boxes
            .iter()
            .map(|b| BoxPosition {
                id: b.id.clone(),
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                party: b.party_name().map(str::to_string),
            })
            .collect();

        let avatar_names: Vec<String> = scene
            .avatar_elements()
            .filter_map(|(_, e)| e.avatar_data().map(|a| a.name.clone()))
            .collect();

        let parties: BTreeSet<String> = scene
            .boxes
            .iter()
            .filter_map(|b| b.party_name().map(str::to_string))
            .collect();

        let has_content = scene
            .boxes
            .iter()
            .flat_map(|b| b.elements.iter())
            .any(|e| e.content_data().is_some());

        Self {
            has_avatars: !avatar_names.is_empty(),
            box_positions,
            avatar_names,
            parties: parties.into_iter().collect(),
            has_content,
        }
    }
}

/// One entry of the saved scene list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSceneSummary {
    pub id: String,
    pub name: String,
    /// Save time (RFC 3339)
    pub timestamp: String,
    /// Serialized size of the full scene in bytes
    pub size: usize,
    pub is_file_reference: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub preview: ScenePreview,
}

/// What a load produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneLoad {
    /// The full scene is available.
    Ready(Scene),
    /// Only the preview record is available; the payload blob has to be
    /// fetched before the scene can be edited. This is not an error.
    AwaitingBlob(SavedSceneSummary),
}

impl SceneLoad {
    pub fn id(&self) -> &str {
        match self {
            SceneLoad::Ready(scene) => &scene.id,
            SceneLoad::AwaitingBlob(summary) => &summary.id,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SceneLoad::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Rect;
    use crate::scene::{AvatarData, ContentData, ContentKind, Element, SceneBox};

    #[test]
    fn test_preview_summarizes_scene() {
        let mut scene = Scene::new("Town hall");
        let mut left = SceneBox::new(Rect::new(0.0, 0.0, 50.0, 100.0));
        left.elements = vec![
            Element::avatar(AvatarData::new("1", "Mai")),
            Element::content(ContentData::new(ContentKind::Image)),
        ];
        left.party = Some("Blue".to_string());
        let mut right = SceneBox::new(Rect::new(50.0, 0.0, 50.0, 100.0));
        right.party = Some(String::new());
        scene.boxes = vec![left, right];

        let preview = ScenePreview::from_scene(&scene);
        assert_eq!(preview.box_positions.len(), 2);
        assert_eq!(preview.avatar_names, vec!["Mai".to_string()]);
        assert_eq!(preview.parties, vec!["Blue".to_string()]);
        assert!(preview.has_content);
        assert!(preview.has_avatars);
        assert_eq!(preview.box_positions[1].party, None);
    }
}
