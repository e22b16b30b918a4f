//! 2D overlay compositing
//!
//! The compositor rasterizes the host's overlay commands on the CPU into a
//! buffer matching the swapchain image, already in the image's channel
//! order. The frame orchestrator copies the painted region onto the acquired
//! image after the scene render pass.

mod canvas;

use vkscene_shared::GuiCommand;

use crate::render::{ImageRegion, PixelFormat};

pub use canvas::{Canvas, CanvasCompositor};

/// One frame of overlay pixels.
#[derive(Debug, Clone, Copy)]
pub struct OverlayFrame<'a> {
    /// Tightly packed `width * height * 4` bytes in the target format
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Painted area; only this part is copied
    pub region: ImageRegion,
}

/// CPU overlay compositor consumed by the frame orchestrator.
pub trait OverlayCompositor {
    /// Target size or format changed.
    fn resize(&mut self, width: u32, height: u32, format: PixelFormat);

    /// Whether the compositor wants to draw at all.
    fn is_active(&self) -> bool;

    /// Rasterize `commands`. `None` when nothing was painted.
    fn frame(&mut self, commands: &[GuiCommand]) -> Option<OverlayFrame<'_>>;
}
