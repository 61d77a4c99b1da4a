//! Scene domain module.
//!
//! # Module Structure
//!
//! - `model`: `Scene`, `SceneBox`, `Element` and the avatar/content payloads
//! - `record`: saved scene summaries, previews and load states
//! - `repository`: repository trait for scene persistence

mod model;
mod record;
mod repository;

pub use model::{
    AvatarData, ContentData, ContentKind, Element, ElementPayload, ElementType,
    GlobalPartySettings, MAX_ELEMENTS_PER_BOX, PartyTurnMode, Scene, SceneBox,
};
pub use record::{
    BoxPosition, LARGE_OBJECT_THRESHOLD, SavedSceneSummary, ScenePreview, SceneLoad,
};
pub use repository::SceneRepository;

pub(crate) use model::new_id;
