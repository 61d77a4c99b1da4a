use crate::scene::{AvatarData, ContentData, ContentKind, ElementPayload, ElementType, new_id};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extensions of model formats an avatar runtime can load.
const AVATAR_MODEL_EXTENSIONS: &[&str] = &["vrm", "glb", "gltf", "fbx"];

const SPREADSHEET_EXTENSIONS: &[&str] = &["csv", "tsv", "xls", "xlsx", "ods", "numbers"];

/// Something dropped onto an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropPayload {
    /// A payload declared as an avatar (e.g. dragged from the avatar library)
    Avatar(AvatarData),
    /// A payload declared as content
    Content(ContentData),
    /// A raw file; classified from its MIME type or extension
    File {
        name: String,
        #[serde(default)]
        mime_type: Option<String>,
        url: String,
    },
}

impl DropPayload {
    /// The element type this payload turns an element into.
    pub fn element_type(&self) -> ElementType {
        match self {
            DropPayload::Avatar(_) => ElementType::Avatar,
            DropPayload::Content(_) => ElementType::Content,
            DropPayload::File {
                name, mime_type, ..
            } => match classify_file(name, mime_type.as_deref()) {
                None => ElementType::Avatar,
                Some(_) => ElementType::Content,
            },
        }
    }

    pub(crate) fn into_element_payload(self) -> ElementPayload {
        match self {
            DropPayload::Avatar(data) => ElementPayload::Avatar {
                avatar_data: Some(data),
            },
            DropPayload::Content(data) => ElementPayload::Content {
                content: Some(data),
            },
            DropPayload::File {
                name,
                mime_type,
                url,
            } => match classify_file(&name, mime_type.as_deref()) {
                None => {
                    let display = file_stem(&name).to_string();
                    let mut avatar = AvatarData::new(new_id(), display);
                    avatar.model_url = Some(url);
                    ElementPayload::Avatar {
                        avatar_data: Some(avatar),
                    }
                }
                Some(kind) => {
                    let mut content = ContentData::new(kind);
                    content.content_url = Some(url);
                    if let Some(mime) = mime_type.or_else(|| guess_mime(&name).map(str::to_string)) {
                        content
                            .metadata
                            .insert("mimeType".to_string(), Value::String(mime));
                    }
                    content.content_name = Some(name);
                    ElementPayload::Content {
                        content: Some(content),
                    }
                }
            },
        }
    }
}

/// Classifies a raw file.
///
/// Returns `None` for avatar model formats and `Some(kind)` for content.
/// Anything unrecognised is content of kind [`ContentKind::Other`]; files
/// are never rejected.
pub fn classify_file(name: &str, declared_mime: Option<&str>) -> Option<ContentKind> {
    let extension = extension(name);
    if AVATAR_MODEL_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }

    let mime = declared_mime
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.trim().to_ascii_lowercase())
        .or_else(|| guess_mime(name).map(str::to_string));
    let Some(mime) = mime else {
        tracing::debug!("[Classify] Unknown file type '{}', treating as content", name);
        return Some(ContentKind::Other);
    };

    let (top, sub) = mime.split_once('/').unwrap_or((mime.as_str(), ""));
    if top == "model" {
        return None;
    }
    if SPREADSHEET_EXTENSIONS.contains(&extension.as_str())
        || sub.contains("spreadsheet")
        || sub.contains("excel")
        || sub == "csv"
    {
        return Some(ContentKind::Spreadsheet);
    }

    let kind = match top {
        "image" => ContentKind::Image,
        "audio" => ContentKind::Audio,
        "video" => ContentKind::Video,
        "text" if sub == "html" => ContentKind::Web,
        "text" => ContentKind::Document,
        "application"
            if sub == "pdf"
                || sub == "msword"
                || sub == "rtf"
                || sub.contains("wordprocessing")
                || sub.contains("presentation")
                || sub.contains("powerpoint")
                || sub.contains("opendocument") =>
        {
            ContentKind::Document
        }
        _ => ContentKind::Other,
    };
    Some(kind)
}

fn guess_mime(name: &str) -> Option<&'static str> {
    mime_guess::from_path(name).first_raw()
}

fn extension(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn file_stem(name: &str) -> &str {
    std::path::Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}
