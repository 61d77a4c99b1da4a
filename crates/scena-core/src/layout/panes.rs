//! Multi-pane width distribution inside a box.
//!
//! Pane widths are percentages of the box's inner width and always sum to
//! 100. Divider drags only ever move width between the two panes adjacent to
//! the divider.

use crate::error::{Result, SceneError};
use serde::{Deserialize, Serialize};

/// Smallest width a pane may be dragged to, in percent.
pub const MIN_PANE_PERCENT: f64 = 10.0;

/// Width given to an enlarged pane when the box has room for it.
pub const ENLARGED_PANE_PERCENT: f64 = 80.0;

const SUM_TOLERANCE: f64 = 1e-6;

/// Widths saved when a pane was enlarged, restored verbatim on toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enlargement {
    pub index: usize,
    pub previous: Vec<f64>,
}

/// Horizontal split of a box between its elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneLayout {
    widths: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enlarged: Option<Enlargement>,
}

impl Default for PaneLayout {
    fn default() -> Self {
        Self::equal(1)
    }
}

impl PaneLayout {
    /// `count` panes of equal width.
    pub fn equal(count: usize) -> Self {
        Self {
            widths: equal_widths(count),
            enlarged: None,
        }
    }

    /// Builds a layout from stored widths, falling back to an equal split
    /// when they do not describe `count` panes of at least
    /// [`MIN_PANE_PERCENT`] summing to 100.
    pub fn from_widths(widths: Vec<f64>, count: usize) -> Self {
        let layout = Self {
            widths,
            enlarged: None,
        };
        if layout.widths.len() == count && layout.is_consistent() {
            layout
        } else {
            Self::equal(count)
        }
    }

    /// Validates a deserialized layout against the box's element count.
    ///
    /// Inconsistent widths fall back to an equal split; a stale enlargement
    /// record (wrong index or pane count) is dropped.
    pub fn normalized(self, count: usize) -> Self {
        if self.widths.len() != count || !self.is_consistent() {
            return Self::equal(count);
        }
        let enlarged = self.enlarged.filter(|e| {
            e.index < count && e.previous.len() == count && widths_consistent(&e.previous)
        });
        Self {
            widths: self.widths,
            enlarged,
        }
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn enlarged_index(&self) -> Option<usize> {
        self.enlarged.as_ref().map(|e| e.index)
    }

    /// Resets to an equal split of `count` panes and forgets any enlargement.
    pub fn reset(&mut self, count: usize) {
        *self = Self::equal(count);
    }

    /// True when widths sum to 100 and none is below [`MIN_PANE_PERCENT`].
    pub fn is_consistent(&self) -> bool {
        widths_consistent(&self.widths)
    }

    /// Toggles enlargement of pane `index`.
    ///
    /// Enlarging stores the current widths and gives the pane
    /// [`ENLARGED_PANE_PERCENT`] (less when the remaining panes would drop
    /// below [`MIN_PANE_PERCENT`]), splitting the rest equally. Toggling the
    /// same pane again restores the stored widths exactly. Toggling a
    /// different pane restores first, then enlarges the new one.
    ///
    /// Returns whether the pane is enlarged afterwards.
    pub fn toggle_enlarge(&mut self, index: usize) -> Result<bool> {
        if index >= self.widths.len() {
            return Err(SceneError::invalid(format!(
                "pane {} out of range for {} panes",
                index,
                self.widths.len()
            )));
        }

        if let Some(enlargement) = self.enlarged.take() {
            self.widths = enlargement.previous;
            if enlargement.index == index {
                return Ok(false);
            }
        }

        let count = self.widths.len();
        if count < 2 {
            return Ok(false);
        }

        let others = (count - 1) as f64;
        let big = ENLARGED_PANE_PERCENT.min(100.0 - MIN_PANE_PERCENT * others);
        let small = (100.0 - big) / others;
        let previous = std::mem::replace(
            &mut self.widths,
            (0..count)
                .map(|i| if i == index { big } else { small })
                .collect(),
        );
        self.enlarged = Some(Enlargement { index, previous });
        Ok(true)
    }

    /// Starts dragging the divider between panes `divider` and `divider + 1`.
    pub fn begin_divider_drag(&self, divider: usize, pointer_x: f64) -> Result<DividerDrag> {
        if divider + 1 >= self.widths.len() {
            return Err(SceneError::invalid(format!(
                "divider {} out of range for {} panes",
                divider,
                self.widths.len()
            )));
        }
        Ok(DividerDrag {
            divider,
            start_widths: self.widths.clone(),
            start_pointer_x: pointer_x,
        })
    }

    /// Applies a divider delta (percent of the box) measured from the
    /// current widths. See [`redistribute`].
    pub fn shift_divider(&mut self, divider: usize, delta_percent: f64) -> Result<()> {
        let drag = self.begin_divider_drag(divider, 0.0)?;
        self.widths = redistribute(&drag.start_widths, divider, delta_percent);
        Ok(())
    }
}

/// An in-progress divider drag.
///
/// The delta is always measured from the widths and pointer position at
/// drag start, so repeated updates never accumulate rounding drift.
#[derive(Debug, Clone, PartialEq)]
pub struct DividerDrag {
    divider: usize,
    start_widths: Vec<f64>,
    start_pointer_x: f64,
}

impl DividerDrag {
    pub fn divider(&self) -> usize {
        self.divider
    }

    /// Widths for the given pointer position, using the box's inner width in
    /// pixels as measured right now.
    pub fn widths_at(&self, pointer_x: f64, inner_width_px: f64) -> Vec<f64> {
        if inner_width_px <= 0.0 {
            return self.start_widths.clone();
        }
        let delta = (pointer_x - self.start_pointer_x) / inner_width_px * 100.0;
        redistribute(&self.start_widths, self.divider, delta)
    }

    /// Writes the widths for the pointer position into `layout`.
    pub fn apply(&self, layout: &mut PaneLayout, pointer_x: f64, inner_width_px: f64) -> Result<()> {
        if layout.widths.len() != self.start_widths.len() {
            return Err(SceneError::invalid(
                "pane count changed during divider drag",
            ));
        }
        layout.widths = self.widths_at(pointer_x, inner_width_px);
        Ok(())
    }
}

/// Moves `delta` percent from pane `divider + 1` to pane `divider`.
///
/// When either pane would fall below [`MIN_PANE_PERCENT`], it is clamped to
/// the minimum and the other pane receives the remainder of the pair's
/// original sum. No other pane changes, and a pair too narrow to hold two
/// minimum panes is left as is.
pub fn redistribute(start: &[f64], divider: usize, delta: f64) -> Vec<f64> {
    let mut widths = start.to_vec();
    if divider + 1 >= widths.len() || !delta.is_finite() {
        return widths;
    }
    let pair = start[divider] + start[divider + 1];
    if pair < 2.0 * MIN_PANE_PERCENT - SUM_TOLERANCE {
        return widths;
    }
    let mut left = start[divider] + delta;
    let mut right = start[divider + 1] - delta;
    if left < MIN_PANE_PERCENT {
        left = MIN_PANE_PERCENT;
        right = pair - MIN_PANE_PERCENT;
    } else if right < MIN_PANE_PERCENT {
        right = MIN_PANE_PERCENT;
        left = pair - MIN_PANE_PERCENT;
    }
    widths[divider] = left;
    widths[divider + 1] = right;
    widths
}

fn widths_consistent(widths: &[f64]) -> bool {
    let sum: f64 = widths.iter().sum();
    !widths.is_empty()
        && widths
            .iter()
            .all(|w| w.is_finite() && *w >= MIN_PANE_PERCENT - SUM_TOLERANCE)
        && (sum - 100.0).abs() < SUM_TOLERANCE
}

fn equal_widths(count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    vec![100.0 / count as f64; count]
}
