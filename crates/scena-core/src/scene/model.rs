//! Scene domain model.
//!
//! This module contains the entity graph describing a spatial composition:
//! a `Scene` owns `SceneBox`es, each box owns one to six `Element`s, and an
//! element is either an avatar or a content panel.

use crate::error::{Result, SceneError};
use crate::layout::{PaneLayout, Rect};
use crate::party::Party;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of elements a single box may hold.
pub const MAX_ELEMENTS_PER_BOX: usize = 6;

/// Which variant of the element union is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Avatar,
    Content,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Avatar => write!(f, "avatar"),
            ElementType::Content => write!(f, "content"),
        }
    }
}

/// Avatar identity and presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarData {
    /// Avatar identity (persona or participant id)
    pub id: String,
    /// Display name, also used for human roster matching
    pub name: String,
    /// Model asset reference (e.g. a `.vrm` or `.glb` URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    /// Text-to-speech voice identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Camera preset name used by the renderer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_preset: Option<String>,
    /// Whether a human participant stands in for this avatar.
    /// Derived from the roster; never authoritative on disk.
    #[serde(default)]
    pub is_human: bool,
}

impl AvatarData {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model_url: None,
            voice_id: None,
            camera_preset: None,
            is_human: false,
        }
    }
}

/// Kind of content shown in a content panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Document,
    Image,
    Audio,
    Video,
    Spreadsheet,
    Web,
    Other,
}

/// Content panel payload, in the shape the content renderer expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentData {
    pub content_type: ContentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ContentData {
    pub fn new(content_type: ContentKind) -> Self {
        Self {
            content_type,
            content_url: None,
            content_name: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// The tagged union carried by an element.
///
/// Only the active variant can hold data, so switching the tag can never
/// leave residue from the other variant behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "elementType", rename_all = "lowercase")]
pub enum ElementPayload {
    Avatar {
        #[serde(rename = "avatarData", default)]
        avatar_data: Option<AvatarData>,
    },
    Content {
        #[serde(default)]
        content: Option<ContentData>,
    },
}

impl ElementPayload {
    /// An empty payload of the given type.
    pub fn empty(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Avatar => ElementPayload::Avatar { avatar_data: None },
            ElementType::Content => ElementPayload::Content { content: None },
        }
    }
}

/// A leaf node of a box: one avatar or one content panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(flatten)]
    pub payload: ElementPayload,
}

impl Element {
    /// Creates an avatar element with no payload.
    pub fn new_avatar() -> Self {
        Self::empty(ElementType::Avatar)
    }

    /// Creates an element of the given type with no payload.
    pub fn empty(element_type: ElementType) -> Self {
        Self {
            id: new_id(),
            payload: ElementPayload::empty(element_type),
        }
    }

    pub fn avatar(data: AvatarData) -> Self {
        Self {
            id: new_id(),
            payload: ElementPayload::Avatar {
                avatar_data: Some(data),
            },
        }
    }

    pub fn content(data: ContentData) -> Self {
        Self {
            id: new_id(),
            payload: ElementPayload::Content {
                content: Some(data),
            },
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self.payload {
            ElementPayload::Avatar { .. } => ElementType::Avatar,
            ElementPayload::Content { .. } => ElementType::Content,
        }
    }

    pub fn avatar_data(&self) -> Option<&AvatarData> {
        match &self.payload {
            ElementPayload::Avatar { avatar_data } => avatar_data.as_ref(),
            ElementPayload::Content { .. } => None,
        }
    }

    pub fn avatar_data_mut(&mut self) -> Option<&mut AvatarData> {
        match &mut self.payload {
            ElementPayload::Avatar { avatar_data } => avatar_data.as_mut(),
            ElementPayload::Content { .. } => None,
        }
    }

    pub fn content_data(&self) -> Option<&ContentData> {
        match &self.payload {
            ElementPayload::Content { content } => content.as_ref(),
            ElementPayload::Avatar { .. } => None,
        }
    }

    /// True when the element is an avatar with a populated payload.
    pub fn has_live_avatar(&self) -> bool {
        self.avatar_data().is_some()
    }
}

/// A positioned, resizable container holding 1 to 6 elements.
///
/// Geometry is expressed in percentages of the editing surface. The
/// invariant `x + width <= 100` and `y + height <= 100` is restored by
/// [`SceneBox::set_rect`] on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneBox {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub elements: Vec<Element>,
    /// Horizontal split of the box between its elements
    pub panes: PaneLayout,
    /// Weak reference to a party by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    /// Snapshot of the party configuration taken at assignment time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_config: Option<Party>,
}

impl SceneBox {
    /// Creates a box with a single empty avatar element at the given geometry.
    pub fn new(rect: Rect) -> Self {
        let mut scene_box = Self {
            id: new_id(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            elements: vec![Element::new_avatar()],
            panes: PaneLayout::equal(1),
            party: None,
            party_config: None,
        };
        scene_box.set_rect(rect);
        scene_box
    }

    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Writes geometry, clamping it into the container bounds.
    pub fn set_rect(&mut self, rect: Rect) {
        let clamped = rect.clamped();
        self.x = clamped.x;
        self.y = clamped.y;
        self.width = clamped.width;
        self.height = clamped.height;
    }

    pub fn element(&self, element_id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == element_id)
    }

    pub fn element_mut(&mut self, element_id: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == element_id)
    }

    pub fn element_index(&self, element_id: &str) -> Result<usize> {
        self.elements
            .iter()
            .position(|e| e.id == element_id)
            .ok_or_else(|| SceneError::not_found("Element", element_id))
    }

    /// Name of the assigned party, treating the empty string as unassigned.
    pub fn party_name(&self) -> Option<&str> {
        self.party.as_deref().filter(|name| !name.is_empty())
    }

    /// Ids of elements currently carrying an avatar payload.
    pub fn avatar_element_ids(&self) -> Vec<String> {
        self.elements
            .iter()
            .filter(|e| e.has_live_avatar())
            .map(|e| e.id.clone())
            .collect()
    }
}

/// How parties take turns in a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyTurnMode {
    #[default]
    Sequential,
    Random,
    Moderated,
}

/// Settings shared by every party of a scene.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalPartySettings {
    pub party_turn_mode: PartyTurnMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderator_party: Option<String>,
    #[serde(default)]
    pub enable_backchannel: bool,
}

/// A named, persistable spatial composition of boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Unique scene identifier (UUID format)
    pub id: String,
    pub name: String,
    pub boxes: Vec<SceneBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default)]
    pub has_unsaved_changes: bool,
    #[serde(default)]
    pub global_party_settings: GlobalPartySettings,
    /// Rendered preview image, produced asynchronously
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Scene {
    /// Creates an empty scene with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            boxes: Vec::new(),
            background_image: None,
            has_unsaved_changes: false,
            global_party_settings: GlobalPartySettings::default(),
            thumbnail: None,
        }
    }

    pub fn find_box(&self, box_id: &str) -> Result<&SceneBox> {
        self.boxes
            .iter()
            .find(|b| b.id == box_id)
            .ok_or_else(|| SceneError::not_found("Box", box_id))
    }

    pub fn find_box_mut(&mut self, box_id: &str) -> Result<&mut SceneBox> {
        self.boxes
            .iter_mut()
            .find(|b| b.id == box_id)
            .ok_or_else(|| SceneError::not_found("Box", box_id))
    }

    /// Returns true if any box of this scene holds the given element.
    pub fn contains_element(&self, element_id: &str) -> bool {
        self.boxes.iter().any(|b| b.element(element_id).is_some())
    }

    pub fn avatar_elements(&self) -> impl Iterator<Item = (&SceneBox, &Element)> {
        self.boxes
            .iter()
            .flat_map(|b| b.elements.iter().map(move |e| (b, e)))
            .filter(|(_, e)| e.has_live_avatar())
    }

    /// Copy of this scene with fresh scene, box and element ids.
    pub fn duplicate(&self, name: impl Into<String>) -> Scene {
        let mut copy = self.clone();
        copy.id = new_id();
        copy.name = name.into();
        copy.has_unsaved_changes = true;
        copy.thumbnail = None;
        for scene_box in &mut copy.boxes {
            scene_box.id = new_id();
            for element in &mut scene_box.elements {
                element.id = new_id();
            }
        }
        copy
    }

    /// Structural equality ignoring the dirty flag and the thumbnail.
    pub fn same_content(&self, other: &Scene) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.boxes == other.boxes
            && self.background_image == other.background_image
            && self.global_party_settings == other.global_party_settings
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_box_has_one_avatar_element() {
        let scene_box = SceneBox::new(Rect::new(10.0, 10.0, 30.0, 40.0));
        assert_eq!(scene_box.elements.len(), 1);
        assert_eq!(scene_box.elements[0].element_type(), ElementType::Avatar);
        assert_eq!(scene_box.panes.widths(), &[100.0]);
    }

    #[test]
    fn test_set_rect_restores_bounds() {
        let mut scene_box = SceneBox::new(Rect::new(0.0, 0.0, 20.0, 20.0));
        scene_box.set_rect(Rect::new(95.0, 90.0, 30.0, 30.0));
        assert!(scene_box.x + scene_box.width <= 100.0);
        assert!(scene_box.y + scene_box.height <= 100.0);
        assert_eq!(scene_box.width, 30.0);
        assert_eq!(scene_box.x, 70.0);
    }

    #[test]
    fn test_element_serializes_with_tag() {
        let element = Element::avatar(AvatarData::new("a1", "Mai"));
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["elementType"], "avatar");
        assert_eq!(json["avatarData"]["name"], "Mai");
        assert!(json.get("content").is_none());

        let back: Element = serde_json::from_value(json).unwrap();
        assert_eq!(back, element);
    }

    #[test]
    fn test_empty_party_string_is_unassigned() {
        let mut scene_box = SceneBox::new(Rect::new(0.0, 0.0, 20.0, 20.0));
        scene_box.party = Some(String::new());
        assert_eq!(scene_box.party_name(), None);
    }

    #[test]
    fn test_duplicate_assigns_fresh_ids() {
        let mut scene = Scene::new("Original");
        scene.boxes.push(SceneBox::new(Rect::new(0.0, 0.0, 50.0, 50.0)));
        let copy = scene.duplicate("Copy");
        assert_ne!(copy.id, scene.id);
        assert_ne!(copy.boxes[0].id, scene.boxes[0].id);
        assert_ne!(copy.boxes[0].elements[0].id, scene.boxes[0].elements[0].id);
        assert!(copy.has_unsaved_changes);
    }
}
