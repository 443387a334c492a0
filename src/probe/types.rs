//! Observation types shared by the platform probe seams.
//!
//! Platform APIs report display and window geometry in several shapes;
//! everything is normalized to [`Rect`] before the engine looks at it.

use serde::{Deserialize, Serialize};

/// A rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point of the rectangle.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Whether the given point lies inside the rectangle.
    pub fn contains_point(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Raw geometry as reported by a platform API.
///
/// Accepted shapes: explicit origin+size, left/top+size, or left/top/right/bottom
/// edges. Use [`RawBounds::normalize`] to get a [`Rect`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum RawBounds {
    Explicit {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    LeftTopSize {
        left: i32,
        top: i32,
        width: i32,
        height: i32,
    },
    Edges {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
}

impl RawBounds {
    pub fn normalize(&self) -> Rect {
        match *self {
            RawBounds::Explicit {
                x,
                y,
                width,
                height,
            } => Rect::new(x, y, width, height),
            RawBounds::LeftTopSize {
                left,
                top,
                width,
                height,
            } => Rect::new(left, top, width, height),
            RawBounds::Edges {
                left,
                top,
                right,
                bottom,
            } => Rect::new(left, top, right - left, bottom - top),
        }
    }
}

/// A best-effort snapshot of the currently focused window.
///
/// Produced once per poll tick and discarded after the tick is processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    /// Application name (empty when nothing could be resolved)
    pub application: String,
    /// Window title
    pub title: String,
    /// Executable path, if the probe could resolve it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Window bounds in screen coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
    /// Process id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl WindowSnapshot {
    /// The snapshot a timed-out or failed probe degrades to.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this snapshot carries no usable window identity.
    pub fn is_empty(&self) -> bool {
        self.application.is_empty() && self.title.is_empty() && self.pid.is_none()
    }

    /// Whether two snapshots describe the same window.
    ///
    /// Compared on application, title, pid, path, and bounds.
    pub fn same_window(&self, other: &WindowSnapshot) -> bool {
        self.application == other.application
            && self.title == other.title
            && self.pid == other.pid
            && self.path == other.path
            && self.bounds == other.bounds
    }
}

/// A physical display as reported by the display probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    /// Index used to address this display in capture calls
    pub index: usize,
    /// Display bounds in virtual screen coordinates
    pub bounds: Rect,
    /// Whether this is the primary display
    pub is_primary: bool,
}
