//! Immediate-mode overlay draw commands
//!
//! Produced by the scene host each frame and consumed by the overlay
//! compositor. Coordinates are in framebuffer pixels, origin top-left.

use serde::{Deserialize, Serialize};

/// 8-bit straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl GuiColor {
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `[r, g, b, a]` from a byte array.
    pub const fn from_array(c: [u8; 4]) -> Self {
        Self::rgba(c[0], c[1], c[2], c[3])
    }
}

/// Axis-aligned rectangle in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GuiRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl GuiRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One overlay draw command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuiCommand {
    /// Filled rectangle with an optional inner border
    Rect {
        rect: GuiRect,
        fill: GuiColor,
        #[serde(default)]
        border: Option<GuiColor>,
        #[serde(default)]
        border_width: f32,
    },
    /// Intersect the current clip region with `rect`
    ClipPush { rect: GuiRect },
    /// Restore the clip region saved by the matching push
    ClipPop,
}
