//! Presentation and frame lifecycle
//!
//! The engine is written against [`GpuDevice`], a thin explicit-API surface
//! (swapchain, render pass, pipelines, fences, semaphores, command buffers).
//! The player implements it with Vulkan; tests implement it with a recording
//! mock.
//!
//! - [`SwapchainManager`] owns the swapchain bundle and its state machine
//! - [`FrameSync`] is the single in-flight fence and its two semaphores
//! - [`FrameOrchestrator`] runs one frame: wait, acquire, record, submit, present

mod frame;
mod swapchain;
mod sync;

use std::fmt::Debug;

use vkscene_shared::PushConstants;

use crate::error::RenderError;
use crate::scene::ShaderPaths;

pub use frame::{FrameOrchestrator, FrameOutcome, FrameSettings};
pub use swapchain::{
    RecreateOutcome, SwapchainBundle, SwapchainManager, SwapchainState, choose_extent,
    choose_image_count, choose_present_mode, choose_surface_format, resolve_pipeline,
};
pub use sync::FrameSync;

/// Presentable pixel formats the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
    /// Any other format, by raw API value
    Other(i32),
}

impl PixelFormat {
    /// Whether the red and blue channels are stored swapped relative to RGBA.
    pub fn is_bgra(self) -> bool {
        matches!(self, Self::Bgra8Srgb | Self::Bgra8Unorm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    Other(i32),
}

/// A format/color-space pair supported by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: PixelFormat,
    pub color_space: ColorSpace,
}

impl SurfaceFormat {
    /// The pair chosen whenever the surface offers it.
    pub const PREFERRED: Self = Self {
        format: PixelFormat::Bgra8Srgb,
        color_space: ColorSpace::SrgbNonlinear,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    /// Always supported
    Fifo,
    FifoRelaxed,
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Surface capabilities, formats and present modes.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSupport {
    pub min_image_count: u32,
    /// Zero means no upper limit
    pub max_image_count: u32,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

/// Everything needed to create a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub extent: Extent2D,
    pub image_count: u32,
}

/// Host-visible buffer usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Overlay staging source for image copies
    TransferSrc,
}

/// Sub-rectangle of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ImageRegion {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the region lies entirely inside `extent`.
    pub fn fits(&self, extent: Extent2D) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(extent.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(extent.height)
    }
}

/// Result of asking the swapchain for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    /// Image acquired, but the swapchain no longer matches the surface exactly
    Suboptimal(u32),
    /// The swapchain can no longer present to the surface
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Explicit graphics device used by the swapchain manager and the frame
/// orchestrator.
///
/// Handles are plain copyable values. Every `create_*` has a matching
/// `destroy_*`; callers are responsible for ordering destruction after every
/// dependent object is gone. Any `Err` is fatal: transient presentation
/// conditions are reported through [`AcquireOutcome`] and [`PresentOutcome`].
pub trait GpuDevice {
    type Swapchain: Copy + PartialEq + Debug;
    type Image: Copy + PartialEq + Debug;
    type ImageView: Copy + PartialEq + Debug;
    type RenderPass: Copy + PartialEq + Debug;
    type PipelineLayout: Copy + PartialEq + Debug;
    type Pipeline: Copy + PartialEq + Debug;
    type Framebuffer: Copy + PartialEq + Debug;
    type CommandBuffer: Copy + PartialEq + Debug;
    type Fence: Copy + PartialEq + Debug;
    type Semaphore: Copy + PartialEq + Debug;
    type Buffer: Copy + PartialEq + Debug;

    // Surface and swapchain

    fn surface_support(&mut self) -> Result<SurfaceSupport, RenderError>;
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<Self::Swapchain, RenderError>;
    fn swapchain_images(
        &mut self,
        swapchain: Self::Swapchain,
    ) -> Result<Vec<Self::Image>, RenderError>;
    fn destroy_swapchain(&mut self, swapchain: Self::Swapchain);

    // Bundle objects

    fn create_image_view(
        &mut self,
        image: Self::Image,
        format: PixelFormat,
    ) -> Result<Self::ImageView, RenderError>;
    fn destroy_image_view(&mut self, view: Self::ImageView);

    /// Single color attachment: clear on load, store on end, undefined to
    /// present layout, with an external dependency on color attachment output.
    fn create_render_pass(&mut self, format: PixelFormat) -> Result<Self::RenderPass, RenderError>;
    fn destroy_render_pass(&mut self, render_pass: Self::RenderPass);

    /// Layout with one vertex-stage push constant range of [`PushConstants`].
    fn create_pipeline_layout(&mut self) -> Result<Self::PipelineLayout, RenderError>;
    fn destroy_pipeline_layout(&mut self, layout: Self::PipelineLayout);

    fn create_graphics_pipeline(
        &mut self,
        shaders: &ShaderPaths,
        render_pass: Self::RenderPass,
        layout: Self::PipelineLayout,
        extent: Extent2D,
    ) -> Result<Self::Pipeline, RenderError>;
    fn destroy_pipeline(&mut self, pipeline: Self::Pipeline);

    fn create_framebuffer(
        &mut self,
        render_pass: Self::RenderPass,
        view: Self::ImageView,
        extent: Extent2D,
    ) -> Result<Self::Framebuffer, RenderError>;
    fn destroy_framebuffer(&mut self, framebuffer: Self::Framebuffer);

    fn allocate_command_buffers(
        &mut self,
        count: u32,
    ) -> Result<Vec<Self::CommandBuffer>, RenderError>;
    fn free_command_buffers(&mut self, buffers: &[Self::CommandBuffer]);

    // Synchronization

    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence, RenderError>;
    fn destroy_fence(&mut self, fence: Self::Fence);
    fn create_semaphore(&mut self) -> Result<Self::Semaphore, RenderError>;
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);
    /// Block until `fence` is signaled. No timeout.
    fn wait_for_fence(&mut self, fence: Self::Fence) -> Result<(), RenderError>;
    fn reset_fence(&mut self, fence: Self::Fence) -> Result<(), RenderError>;
    /// Block until the device has no work in flight.
    fn wait_idle(&mut self) -> Result<(), RenderError>;

    // Host-visible buffers

    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        size: u64,
    ) -> Result<Self::Buffer, RenderError>;
    fn write_buffer(
        &mut self,
        buffer: Self::Buffer,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), RenderError>;
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    // Frame

    /// Acquire the next image, signaling `signal` when it is ready. No timeout.
    fn acquire_next_image(
        &mut self,
        swapchain: Self::Swapchain,
        signal: Self::Semaphore,
    ) -> Result<AcquireOutcome, RenderError>;

    /// Submit `cmd`, waiting on `wait` at color attachment output, signaling
    /// `signal` and then `fence` on completion.
    fn submit(
        &mut self,
        cmd: Self::CommandBuffer,
        wait: Self::Semaphore,
        signal: Self::Semaphore,
        fence: Self::Fence,
    ) -> Result<(), RenderError>;

    /// Present `image_index` after `wait` is signaled.
    fn present(
        &mut self,
        swapchain: Self::Swapchain,
        image_index: u32,
        wait: Self::Semaphore,
    ) -> Result<PresentOutcome, RenderError>;

    // Recording

    fn reset_command_buffer(&mut self, cmd: Self::CommandBuffer) -> Result<(), RenderError>;
    fn begin_command_buffer(&mut self, cmd: Self::CommandBuffer) -> Result<(), RenderError>;
    fn end_command_buffer(&mut self, cmd: Self::CommandBuffer) -> Result<(), RenderError>;

    fn cmd_begin_render_pass(
        &mut self,
        cmd: Self::CommandBuffer,
        render_pass: Self::RenderPass,
        framebuffer: Self::Framebuffer,
        extent: Extent2D,
        clear_color: [f32; 4],
    );
    fn cmd_end_render_pass(&mut self, cmd: Self::CommandBuffer);
    fn cmd_bind_geometry(
        &mut self,
        cmd: Self::CommandBuffer,
        vertices: Self::Buffer,
        indices: Self::Buffer,
    );
    fn cmd_bind_pipeline(&mut self, cmd: Self::CommandBuffer, pipeline: Self::Pipeline);
    fn cmd_push_constants(
        &mut self,
        cmd: Self::CommandBuffer,
        layout: Self::PipelineLayout,
        constants: &PushConstants,
    );
    fn cmd_draw_indexed(
        &mut self,
        cmd: Self::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    );

    /// Copy `region` of a tightly packed `image_extent`-sized staging buffer
    /// onto `image`: present layout to transfer destination, copy, then back
    /// to present layout.
    fn cmd_blit_to_image(
        &mut self,
        cmd: Self::CommandBuffer,
        staging: Self::Buffer,
        image: Self::Image,
        image_extent: Extent2D,
        region: ImageRegion,
    );
}
