//! Scene record DTOs.
//!
//! The persisted record is the scene plus store metadata (timestamp, size,
//! preview, file reference). Records written by older editors carry boxes
//! in one of three shapes, all of which are accepted here and normalized
//! into `Element[]`:
//!
//! - `elements`: the current shape, an array of tagged elements
//! - `slots`: a fixed array of nullable `{type, avatar | content}` slots
//! - direct payload: a single element's fields set on the box itself
//!
//! Geometry is optional on load (defaults fill gaps) and is clamped into
//! the container bounds. Nothing in this module fails on a structurally
//! odd box; only a record that is not JSON or lacks an id is rejected.

use scena_core::layout::{PaneLayout, Rect};
use scena_core::party::Party;
use scena_core::scene::{
    AvatarData, ContentData, ContentKind, Element, ElementPayload, ElementType,
    GlobalPartySettings, MAX_ELEMENTS_PER_BOX, SavedSceneSummary, Scene, SceneBox, ScenePreview,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_BOX_RECT: Rect = Rect {
    x: 10.0,
    y: 10.0,
    width: 30.0,
    height: 30.0,
};

// ============================================================================
// Record
// ============================================================================

/// A scene as written to `scenes/<id>.json` or `blobs/<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRecordDto {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub boxes: Vec<BoxDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    /// Save time (RFC 3339)
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub global_party_settings: GlobalPartySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_file_reference: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<ScenePreview>,
}

impl SceneRecordDto {
    /// Full inline record of `scene`.
    pub fn from_domain(scene: &Scene, timestamp: &str) -> Self {
        Self {
            id: scene.id.clone(),
            name: scene.name.clone(),
            boxes: scene.boxes.iter().map(BoxDto::from_domain).collect(),
            background_image: scene.background_image.clone(),
            timestamp: timestamp.to_string(),
            global_party_settings: scene.global_party_settings.clone(),
            thumbnail: scene.thumbnail.clone(),
            is_file_reference: false,
            file_url: None,
            size: None,
            preview: None,
        }
    }

    /// Preview-only record pointing at an out-of-band blob.
    pub fn file_reference(scene: &Scene, timestamp: &str, size: usize, file_url: String) -> Self {
        Self {
            id: scene.id.clone(),
            name: scene.name.clone(),
            boxes: Vec::new(),
            background_image: scene.background_image.clone(),
            timestamp: timestamp.to_string(),
            global_party_settings: scene.global_party_settings.clone(),
            thumbnail: scene.thumbnail.clone(),
            is_file_reference: true,
            file_url: Some(file_url),
            size: Some(size),
            preview: Some(ScenePreview::from_scene(scene)),
        }
    }

    /// Attaches list metadata to an inline record.
    pub fn with_summary(mut self, size: usize, preview: ScenePreview) -> Self {
        self.size = Some(size);
        self.preview = Some(preview);
        self
    }

    /// Converts to the domain scene, normalizing legacy box shapes.
    ///
    /// The loaded scene is clean (`has_unsaved_changes = false`).
    pub fn into_domain(self) -> Scene {
        Scene {
            id: self.id,
            name: self.name,
            boxes: self.boxes.into_iter().map(BoxDto::into_domain).collect(),
            background_image: self.background_image,
            has_unsaved_changes: false,
            global_party_settings: self.global_party_settings,
            thumbnail: self.thumbnail,
        }
    }

    /// Summary for the saved scene list.
    ///
    /// Records written without list metadata get it derived from their
    /// boxes, so `list()` never needs a second read.
    pub fn summary(&self) -> SavedSceneSummary {
        let preview = match &self.preview {
            Some(preview) => preview.clone(),
            None => ScenePreview::from_scene(&self.clone().into_domain()),
        };
        SavedSceneSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            timestamp: self.timestamp.clone(),
            size: self.size.unwrap_or(0),
            is_file_reference: self.is_file_reference,
            file_url: self.file_url.clone(),
            preview,
        }
    }
}

// ============================================================================
// Box
// ============================================================================

/// A box in any of the accepted persisted shapes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<ElementDto>>,
    /// Legacy fixed slot array; `null` entries are empty slots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<Option<SlotDto>>>,
    /// Legacy single-element payload set directly on the box
    #[serde(flatten)]
    pub direct: PayloadDto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panes: Option<PaneLayout>,
    /// Legacy bare pane widths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_widths: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_config: Option<Party>,
}

impl BoxDto {
    pub fn from_domain(scene_box: &SceneBox) -> Self {
        Self {
            id: Some(scene_box.id.clone()),
            x: Some(scene_box.x),
            y: Some(scene_box.y),
            width: Some(scene_box.width),
            height: Some(scene_box.height),
            elements: Some(
                scene_box
                    .elements
                    .iter()
                    .map(ElementDto::from_domain)
                    .collect(),
            ),
            slots: None,
            direct: PayloadDto::default(),
            panes: Some(scene_box.panes.clone()),
            pane_widths: None,
            party: scene_box.party.clone(),
            party_config: scene_box.party_config.clone(),
        }
    }

    pub fn into_domain(self) -> SceneBox {
        let rect = Rect {
            x: self.x.unwrap_or(DEFAULT_BOX_RECT.x),
            y: self.y.unwrap_or(DEFAULT_BOX_RECT.y),
            width: self.width.unwrap_or(DEFAULT_BOX_RECT.width),
            height: self.height.unwrap_or(DEFAULT_BOX_RECT.height),
        };
        let id = self.id.unwrap_or_else(new_id);

        let mut elements: Vec<Element> = match (self.elements, self.slots) {
            (Some(elements), _) if !elements.is_empty() => {
                elements.into_iter().map(ElementDto::into_domain).collect()
            }
            (_, Some(slots)) => slots
                .into_iter()
                .flatten()
                .map(SlotDto::into_domain)
                .collect(),
            _ => self
                .direct
                .into_payload()
                .map(|payload| Element { id: new_id(), payload })
                .into_iter()
                .collect(),
        };

        if elements.len() > MAX_ELEMENTS_PER_BOX {
            tracing::warn!(
                "[SceneRecordDto] Box {} has {} elements, truncating to {}",
                id,
                elements.len(),
                MAX_ELEMENTS_PER_BOX
            );
            elements.truncate(MAX_ELEMENTS_PER_BOX);
        }
        if elements.is_empty() {
            elements.push(Element::new_avatar());
        }

        let count = elements.len();
        let panes = match (self.panes, self.pane_widths) {
            (Some(panes), _) => panes.normalized(count),
            (None, Some(widths)) => PaneLayout::from_widths(widths, count),
            (None, None) => PaneLayout::equal(count),
        };

        let party = self.party.filter(|name| !name.is_empty());
        // A snapshot without a party reference is residue of a cleared party.
        let party_config = party.as_ref().and(self.party_config);

        let mut scene_box = SceneBox {
            id,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            elements,
            panes,
            party,
            party_config,
        };
        scene_box.set_rect(rect);
        scene_box
    }
}

// ============================================================================
// Element
// ============================================================================

/// Element fields shared by the current shape and the legacy direct payload.
///
/// Content may be nested under `content` or spread flat over
/// `contentType`/`contentUrl`/`contentName`/`metadata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl PayloadDto {
    fn from_domain(payload: &ElementPayload) -> Self {
        match payload {
            ElementPayload::Avatar { avatar_data } => Self {
                element_type: Some(ElementType::Avatar.to_string()),
                avatar_data: avatar_data
                    .as_ref()
                    .and_then(|data| serde_json::to_value(data).ok()),
                ..Self::default()
            },
            ElementPayload::Content { content } => Self {
                element_type: Some(ElementType::Content.to_string()),
                content: content.as_ref().map(ContentDto::from_domain),
                ..Self::default()
            },
        }
    }

    fn flat_content(&self) -> Option<ContentDto> {
        if self.content_type.is_none() && self.content_url.is_none() && self.content_name.is_none()
        {
            return None;
        }
        Some(ContentDto {
            content_type: self.content_type.clone(),
            content_url: self.content_url.clone(),
            content_name: self.content_name.clone(),
            metadata: self.metadata.clone(),
        })
    }

    /// Resolves the active variant.
    ///
    /// An explicit `elementType` wins; otherwise the type is inferred from
    /// which variant carries data. Fields of the inactive variant are
    /// discarded. Returns `None` when the fields describe nothing at all.
    fn into_payload(self) -> Option<ElementPayload> {
        let content = self.content.clone().or_else(|| self.flat_content());
        let declared = self.element_type.as_deref().and_then(parse_element_type);
        let element_type = match declared {
            Some(element_type) => element_type,
            None if self.avatar_data.is_some() => ElementType::Avatar,
            None if content.is_some() => ElementType::Content,
            None => return None,
        };

        Some(match element_type {
            ElementType::Avatar => ElementPayload::Avatar {
                avatar_data: self.avatar_data.and_then(parse_avatar),
            },
            ElementType::Content => ElementPayload::Content {
                content: content.map(ContentDto::into_domain),
            },
        })
    }
}

/// A tagged element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub payload: PayloadDto,
}

impl ElementDto {
    pub fn from_domain(element: &Element) -> Self {
        Self {
            id: Some(element.id.clone()),
            payload: PayloadDto::from_domain(&element.payload),
        }
    }

    pub fn into_domain(self) -> Element {
        Element {
            id: self.id.unwrap_or_else(new_id),
            payload: self
                .payload
                .into_payload()
                .unwrap_or_else(|| ElementPayload::empty(ElementType::Avatar)),
        }
    }
}

/// A legacy slot: `{type, avatar | content}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub slot_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentDto>,
}

impl SlotDto {
    fn into_domain(self) -> Element {
        let payload = PayloadDto {
            element_type: self.slot_type,
            avatar_data: self.avatar,
            content: self.content,
            ..PayloadDto::default()
        };
        ElementDto {
            id: self.id,
            payload,
        }
        .into_domain()
    }
}

/// Content fields with a lenient `contentType`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ContentDto {
    fn from_domain(content: &ContentData) -> Self {
        Self {
            content_type: serde_json::to_value(content.content_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string)),
            content_url: content.content_url.clone(),
            content_name: content.content_name.clone(),
            metadata: content.metadata.clone(),
        }
    }

    fn into_domain(self) -> ContentData {
        ContentData {
            content_type: self
                .content_type
                .as_deref()
                .map(parse_content_kind)
                .unwrap_or(ContentKind::Other),
            content_url: self.content_url,
            content_name: self.content_name,
            metadata: self.metadata,
        }
    }
}

// ============================================================================
// Lenient parsing
// ============================================================================

fn parse_element_type(value: &str) -> Option<ElementType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "avatar" | "persona" | "character" => Some(ElementType::Avatar),
        "content" | "document" | "media" => Some(ElementType::Content),
        other => {
            tracing::debug!("[SceneRecordDto] Unknown elementType '{}', inferring", other);
            None
        }
    }
}

/// Maps stored content type strings, including older aliases, onto
/// [`ContentKind`]. Unknown values become `Other`.
pub fn parse_content_kind(value: &str) -> ContentKind {
    match value.trim().to_ascii_lowercase().as_str() {
        "document" | "pdf" | "text" | "markdown" | "doc" => ContentKind::Document,
        "image" | "picture" | "photo" => ContentKind::Image,
        "audio" | "sound" => ContentKind::Audio,
        "video" | "movie" => ContentKind::Video,
        "spreadsheet" | "csv" | "excel" | "sheet" => ContentKind::Spreadsheet,
        "web" | "url" | "link" | "html" | "website" => ContentKind::Web,
        _ => ContentKind::Other,
    }
}

/// Parses avatar data, filling a missing id or name from the other.
fn parse_avatar(value: Value) -> Option<AvatarData> {
    let Value::Object(mut map) = value else {
        return None;
    };
    let id = map.get("id").and_then(Value::as_str).map(str::to_string);
    let name = map.get("name").and_then(Value::as_str).map(str::to_string);
    match (id, name) {
        (None, None) => {
            map.insert("id".to_string(), Value::String(new_id()));
            map.insert("name".to_string(), Value::String(String::new()));
        }
        (Some(id), None) => {
            map.insert("name".to_string(), Value::String(id));
        }
        (None, Some(name)) => {
            map.insert("id".to_string(), Value::String(name));
        }
        (Some(_), Some(_)) => {}
    }
    match serde_json::from_value::<AvatarData>(Value::Object(map)) {
        Ok(avatar) => Some(avatar),
        Err(e) => {
            tracing::warn!("[SceneRecordDto] Dropping unreadable avatarData: {}", e);
            None
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(boxes: Value) -> Scene {
        let dto: SceneRecordDto = serde_json::from_value(json!({
            "id": "s-1",
            "name": "Legacy",
            "boxes": boxes,
        }))
        .unwrap();
        dto.into_domain()
    }

    #[test]
    fn test_current_shape_round_trip() {
        let mut scene = Scene::new("Current");
        let mut scene_box = SceneBox::new(Rect::new(5.0, 5.0, 40.0, 40.0));
        scene_box.elements = vec![
            Element::avatar(AvatarData::new("p1", "Mai")),
            Element::content(ContentData::new(ContentKind::Image)),
        ];
        scene_box.panes = PaneLayout::equal(2);
        scene.boxes.push(scene_box);

        let dto = SceneRecordDto::from_domain(&scene, "2024-01-01T00:00:00Z");
        let json = serde_json::to_string(&dto).unwrap();
        let back: SceneRecordDto = serde_json::from_str(&json).unwrap();
        assert!(back.into_domain().same_content(&scene));
    }

    #[test]
    fn test_slot_array_is_normalized() {
        let scene = record(json!([{
            "id": "b-1", "x": 0, "y": 0, "width": 50, "height": 50,
            "slots": [
                {"type": "avatar", "avatar": {"id": "p1", "name": "Ken"}},
                null,
                {"type": "content", "content": {"contentType": "pdf", "contentUrl": "a.pdf"}}
            ]
        }]));
        let elements = &scene.boxes[0].elements;
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].avatar_data().unwrap().name, "Ken");
        assert_eq!(
            elements[1].content_data().unwrap().content_type,
            ContentKind::Document
        );
        assert_eq!(scene.boxes[0].panes.len(), 2);
    }

    #[test]
    fn test_direct_payload_is_normalized() {
        let scene = record(json!([{
            "id": "b-1",
            "contentType": "image",
            "contentUrl": "https://example.com/a.png",
            "contentName": "a.png"
        }]));
        let scene_box = &scene.boxes[0];
        assert_eq!(scene_box.elements.len(), 1);
        let content = scene_box.elements[0].content_data().unwrap();
        assert_eq!(content.content_type, ContentKind::Image);
        assert_eq!(content.content_name.as_deref(), Some("a.png"));
        assert_eq!(scene_box.rect(), DEFAULT_BOX_RECT);
    }

    #[test]
    fn test_inactive_variant_is_discarded() {
        let scene = record(json!([{
            "elements": [{
                "id": "e-1",
                "elementType": "avatar",
                "avatarData": {"id": "p1", "name": "Mai"},
                "content": {"contentType": "image"}
            }]
        }]));
        let element = &scene.boxes[0].elements[0];
        assert_eq!(element.element_type(), ElementType::Avatar);
        assert!(element.content_data().is_none());
    }

    #[test]
    fn test_geometry_is_clamped_on_load() {
        let scene = record(json!([{ "x": 90, "y": -5, "width": 30, "height": 200 }]));
        let rect = scene.boxes[0].rect();
        assert!(rect.within_bounds());
        assert_eq!(rect.x, 70.0);
        assert_eq!(rect.height, 100.0);
        assert_eq!(scene.boxes[0].elements.len(), 1);
    }

    #[test]
    fn test_orphan_party_config_is_dropped() {
        let scene = record(json!([{
            "party": "",
            "partyConfig": {"name": "Blue"}
        }]));
        assert!(scene.boxes[0].party.is_none());
        assert!(scene.boxes[0].party_config.is_none());
    }

    #[test]
    fn test_too_many_elements_are_truncated() {
        let elements: Vec<Value> = (0..8)
            .map(|i| json!({"id": format!("e-{}", i), "elementType": "avatar"}))
            .collect();
        let scene = record(json!([{ "elements": elements }]));
        assert_eq!(scene.boxes[0].elements.len(), MAX_ELEMENTS_PER_BOX);
    }

    #[test]
    fn test_avatar_missing_id_uses_name() {
        let avatar = parse_avatar(json!({"name": "Mai", "isHuman": true})).unwrap();
        assert_eq!(avatar.id, "Mai");
        assert!(avatar.is_human);
        assert!(parse_avatar(json!("Mai")).is_none());
    }

    #[test]
    fn test_summary_derives_missing_preview() {
        let dto: SceneRecordDto = serde_json::from_value(json!({
            "id": "s-1",
            "name": "Old",
            "timestamp": "2023-05-01T00:00:00Z",
            "boxes": [{"party": "Blue", "avatarData": {"id": "p1", "name": "Ken"}}]
        }))
        .unwrap();
        let summary = dto.summary();
        assert!(!summary.is_file_reference);
        assert_eq!(summary.preview.avatar_names, vec!["Ken".to_string()]);
        assert_eq!(summary.preview.parties, vec!["Blue".to_string()]);
    }
}
