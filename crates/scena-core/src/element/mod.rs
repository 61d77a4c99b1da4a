//! Element lifecycle rules.
//!
//! These functions mutate a single [`SceneBox`] and report which element ids
//! lost their avatar payload. The caller owns the runtime avatar instances
//! and must release every reported id.

mod classify;

pub use classify::{DropPayload, classify_file};

use crate::error::{Result, SceneError};
use crate::scene::{Element, ElementPayload, ElementType, MAX_ELEMENTS_PER_BOX, SceneBox};

/// Result of a lifecycle operation that may free runtime resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Released {
    /// Element ids whose runtime avatar instances must be released
    pub element_ids: Vec<String>,
}

impl Released {
    fn none() -> Self {
        Self::default()
    }

    fn from_elements<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Self {
        Self {
            element_ids: elements
                .into_iter()
                .filter(|e| e.element_type() == ElementType::Avatar)
                .map(|e| e.id.clone())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.element_ids.is_empty()
    }
}

/// Outcome of [`delete_element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Released),
    /// The element is the last one of its box; nothing changed.
    RejectedLastElement,
}

impl DeleteOutcome {
    /// Message shown to the user for rejected deletions.
    pub fn warning(&self) -> Option<&'static str> {
        match self {
            DeleteOutcome::Deleted(_) => None,
            DeleteOutcome::RejectedLastElement => {
                Some("A box needs at least one element. Delete the box instead.")
            }
        }
    }
}

/// Sets the number of elements in a box (`1..=6`).
///
/// Shrinking truncates from the end; growing appends empty avatar elements.
/// Pane widths are reset to an equal split whenever the count changes.
pub fn set_element_count(scene_box: &mut SceneBox, count: usize) -> Result<Released> {
    if !(1..=MAX_ELEMENTS_PER_BOX).contains(&count) {
        return Err(SceneError::invalid(format!(
            "element count must be between 1 and {}, got {}",
            MAX_ELEMENTS_PER_BOX, count
        )));
    }

    let current = scene_box.elements.len();
    if count == current {
        return Ok(Released::none());
    }

    let released = if count < current {
        let removed = scene_box.elements.split_off(count);
        Released::from_elements(&removed)
    } else {
        scene_box
            .elements
            .extend((current..count).map(|_| Element::new_avatar()));
        Released::none()
    };

    scene_box.panes.reset(count);
    Ok(released)
}

/// Switches an element between avatar and content.
///
/// The payload of the variant being left is discarded. Leaving `avatar`
/// reports the element for runtime release.
pub fn set_element_type(
    scene_box: &mut SceneBox,
    element_id: &str,
    element_type: ElementType,
) -> Result<Released> {
    let element = scene_box
        .element_mut(element_id)
        .ok_or_else(|| SceneError::not_found("Element", element_id))?;

    if element.element_type() == element_type {
        return Ok(Released::none());
    }

    let released = if element.element_type() == ElementType::Avatar {
        Released {
            element_ids: vec![element.id.clone()],
        }
    } else {
        Released::none()
    };
    element.payload = ElementPayload::empty(element_type);
    Ok(released)
}

/// Deletes an element unless it is the last one of its box.
pub fn delete_element(scene_box: &mut SceneBox, element_id: &str) -> Result<DeleteOutcome> {
    let index = scene_box.element_index(element_id)?;
    if scene_box.elements.len() <= 1 {
        tracing::warn!(
            "[Element] Refusing to delete last element {} of box {}",
            element_id,
            scene_box.id
        );
        return Ok(DeleteOutcome::RejectedLastElement);
    }

    let removed = scene_box.elements.remove(index);
    scene_box.panes.reset(scene_box.elements.len());
    Ok(DeleteOutcome::Deleted(Released::from_elements([&removed])))
}

/// Places a dropped payload into an element, retyping it as needed.
///
/// Returns the resulting element type and the ids to release. An avatar
/// replaced by another avatar is released too, since its runtime instance
/// was built for the old avatar data.
pub fn drop_payload(
    scene_box: &mut SceneBox,
    element_id: &str,
    payload: DropPayload,
) -> Result<(ElementType, Released)> {
    let element = scene_box
        .element_mut(element_id)
        .ok_or_else(|| SceneError::not_found("Element", element_id))?;

    let released = if element.has_live_avatar() {
        Released {
            element_ids: vec![element.id.clone()],
        }
    } else {
        Released::none()
    };

    element.payload = payload.into_element_payload();
    Ok((element.element_type(), released))
}
