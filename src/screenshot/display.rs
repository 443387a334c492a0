//! Capture target resolution across multiple displays.

use crate::probe::types::{DisplayInfo, Rect};
use serde::{Deserialize, Serialize};

/// Which display(s) a capture should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayTarget {
    /// The primary display
    Primary,
    /// The display holding the most recently focused window
    Active,
    /// Every attached display; no resolution happens
    All,
}

/// Outcome of target resolution, handed to the capture provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// Capture the display with this index
    Display(usize),
    /// No display matched; the provider picks its own default
    Unresolved,
    /// Capture every display
    AllDisplays,
}

/// Resolve the display to capture.
///
/// `primary`/`active` modes find the display whose rectangle contains the
/// center of a target rectangle: the primary display's bounds, or the
/// focused window's bounds in `active` mode (falling back to primary when
/// the window is unknown). No match falls back to index 0 for `primary`
/// and to [`ResolvedTarget::Unresolved`] for `active`.
pub fn resolve_display(
    mode: DisplayTarget,
    displays: &[DisplayInfo],
    active_bounds: Option<&Rect>,
) -> ResolvedTarget {
    if mode == DisplayTarget::All {
        return ResolvedTarget::AllDisplays;
    }

    let fallback = match mode {
        DisplayTarget::Primary => ResolvedTarget::Display(0),
        _ => ResolvedTarget::Unresolved,
    };

    let primary_bounds = displays
        .iter()
        .find(|d| d.is_primary)
        .or_else(|| displays.first())
        .map(|d| d.bounds);

    let target_rect = match mode {
        DisplayTarget::Active => active_bounds.copied().or(primary_bounds),
        _ => primary_bounds,
    };

    let target_rect = match target_rect {
        Some(rect) => rect,
        None => return fallback,
    };

    let (cx, cy) = target_rect.center();
    displays
        .iter()
        .find(|d| d.bounds.contains_point(cx, cy))
        .map(|d| ResolvedTarget::Display(d.index))
        .unwrap_or(fallback)
}
