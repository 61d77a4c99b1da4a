//! Data Transfer Objects (DTOs) for persistence.
//!
//! These DTOs describe the on-disk schema. They are private to the
//! infrastructure layer and absorb the evolution of the storage format:
//! older shapes are accepted on read and always written back in the
//! current shape.

mod scene;

pub use scene::{
    BoxDto, ContentDto, ElementDto, PayloadDto, SceneRecordDto, SlotDto, parse_content_kind,
};
