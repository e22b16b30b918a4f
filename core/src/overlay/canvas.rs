//! Software canvas for overlay rectangles.

use vkscene_shared::{GuiColor, GuiCommand, GuiRect};

use super::{OverlayCompositor, OverlayFrame};
use crate::render::{ImageRegion, PixelFormat};

/// Half-open pixel bounds `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl Bounds {
    fn from_rect(rect: &GuiRect) -> Self {
        Self {
            x0: rect.x.round() as i32,
            y0: rect.y.round() as i32,
            x1: (rect.x + rect.width).round() as i32,
            y1: (rect.y + rect.height).round() as i32,
        }
    }

    fn intersect(self, other: Self) -> Self {
        Self {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// RGBA8 straight-alpha canvas with a clip stack.
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    clip_stack: Vec<Bounds>,
    dirty: Option<Bounds>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self::default();
        canvas.resize(width, height);
        canvas
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * 4];
        self.clear();
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Clear to transparent and reset the clip stack.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.clip_stack.clear();
        self.dirty = None;
    }

    /// Area touched since the last clear.
    pub fn dirty_region(&self) -> Option<ImageRegion> {
        self.dirty.map(|b| {
            ImageRegion::new(
                b.x0 as u32,
                b.y0 as u32,
                (b.x1 - b.x0) as u32,
                (b.y1 - b.y0) as u32,
            )
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> GuiColor {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        GuiColor::rgba(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        )
    }

    pub fn execute(&mut self, command: &GuiCommand) {
        match command {
            GuiCommand::Rect {
                rect,
                fill,
                border,
                border_width,
            } => self.draw_rect(rect, *fill, *border, *border_width),
            GuiCommand::ClipPush { rect } => {
                let clip = self.current_clip().intersect(Bounds::from_rect(rect));
                self.clip_stack.push(clip);
            }
            GuiCommand::ClipPop => {
                self.clip_stack.pop();
            }
        }
    }

    /// Filled rect with an inner border of `border_width` pixels.
    pub fn draw_rect(
        &mut self,
        rect: &GuiRect,
        fill: GuiColor,
        border: Option<GuiColor>,
        border_width: f32,
    ) {
        let b = Bounds::from_rect(rect);
        self.fill(b, fill);

        let Some(color) = border else {
            return;
        };
        // Spans saturate at i32::MAX for rects far larger than any canvas
        let w = (border_width.round() as i32)
            .min(b.x1.saturating_sub(b.x0) / 2)
            .min(b.y1.saturating_sub(b.y0) / 2);
        if w <= 0 {
            return;
        }
        let top = Bounds { y1: b.y0 + w, ..b };
        let bottom = Bounds { y0: b.y1 - w, ..b };
        let left = Bounds {
            x1: b.x0 + w,
            y0: b.y0 + w,
            y1: b.y1 - w,
            ..b
        };
        let right = Bounds {
            x0: b.x1 - w,
            y0: b.y0 + w,
            y1: b.y1 - w,
            ..b
        };
        for strip in [top, bottom, left, right] {
            self.fill(strip, color);
        }
    }

    fn current_clip(&self) -> Bounds {
        self.clip_stack.last().copied().unwrap_or(Bounds {
            x0: 0,
            y0: 0,
            x1: self.width as i32,
            y1: self.height as i32,
        })
    }

    fn fill(&mut self, bounds: Bounds, color: GuiColor) {
        let b = bounds.intersect(self.current_clip());
        if b.is_empty() || color.a == 0 {
            return;
        }
        self.dirty = Some(self.dirty.map_or(b, |d| d.union(b)));

        let stride = self.width as usize * 4;
        for y in b.y0..b.y1 {
            let row = y as usize * stride;
            for x in b.x0..b.x1 {
                let i = row + x as usize * 4;
                blend(&mut self.pixels[i..i + 4], color);
            }
        }
    }
}

/// Source-over blend of a straight-alpha color onto one pixel.
fn blend(dst: &mut [u8], src: GuiColor) {
    let a = u32::from(src.a);
    if a == 255 {
        dst.copy_from_slice(&[src.r, src.g, src.b, src.a]);
        return;
    }
    let inv = 255 - a;
    let mix = |s: u8, d: u8| ((u32::from(s) * a + u32::from(d) * inv + 127) / 255) as u8;
    dst[0] = mix(src.r, dst[0]);
    dst[1] = mix(src.g, dst[1]);
    dst[2] = mix(src.b, dst[2]);
    dst[3] = (a + (u32::from(dst[3]) * inv + 127) / 255) as u8;
}

/// [`OverlayCompositor`] backed by a [`Canvas`].
///
/// Keeps a second buffer in the swapchain's channel order so BGRA targets
/// can be copied without conversion on the GPU.
#[derive(Debug, Default)]
pub struct CanvasCompositor {
    canvas: Canvas,
    format: Option<PixelFormat>,
    output: Vec<u8>,
}

impl CanvasCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}

impl OverlayCompositor for CanvasCompositor {
    fn resize(&mut self, width: u32, height: u32, format: PixelFormat) {
        self.canvas.resize(width, height);
        self.format = Some(format);
        self.output = vec![0; self.canvas.pixels().len()];
    }

    fn is_active(&self) -> bool {
        self.format.is_some() && self.canvas.width() > 0 && self.canvas.height() > 0
    }

    fn frame(&mut self, commands: &[GuiCommand]) -> Option<OverlayFrame<'_>> {
        self.canvas.clear();
        for command in commands {
            self.canvas.execute(command);
        }
        let region = self.canvas.dirty_region()?;

        self.output.copy_from_slice(self.canvas.pixels());
        if self.format.is_some_and(PixelFormat::is_bgra) {
            for px in self.output.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }

        Some(OverlayFrame {
            pixels: &self.output,
            width: self.canvas.width(),
            height: self.canvas.height(),
            region,
        })
    }
}
