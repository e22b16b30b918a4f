//! Per-frame orchestration
//!
//! One frame in flight. Each frame waits on the in-flight fence, acquires an
//! image, records the scene and the overlay into that image's command buffer,
//! submits, and presents. Any sign that the swapchain no longer matches the
//! surface (out-of-date or suboptimal acquire, a pending resize, out-of-date
//! or suboptimal present) triggers exactly one swapchain rebuild.


use tracing::{debug, info, warn};
use vkscene_shared::PushConstants;

use super::{
    AcquireOutcome, BufferUsage, Extent2D, FrameSync, GpuDevice, PixelFormat, PresentMode,
    PresentOutcome, RecreateOutcome, SwapchainManager, SwapchainState,
};
use crate::error::RenderError;
use crate::overlay::OverlayCompositor;
use crate::scene::{SceneCache, SceneGeometry, SceneHost, ShaderRegistry};
use crate::trace_point;

/// Fixed rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSettings {
    pub clear_color: [f32; 4],
    /// Used when supported, FIFO otherwise
    pub present_mode: PresentMode,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.15, 1.0],
            present_mode: PresentMode::Mailbox,
        }
    }
}

/// What happened to one call of [`FrameOrchestrator::draw_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation. `recreated` is
    /// set when presentation reported a stale swapchain and it was rebuilt.
    Presented { recreated: bool },
    /// Nothing was drawn; the swapchain was stale and a rebuild was attempted.
    Aborted,
    /// Nothing was drawn; the drawable is zero-sized (minimized).
    Suspended,
}

struct StagingBuffer<D: GpuDevice> {
    buffer: D::Buffer,
    extent: Extent2D,
}

/// Owner of the device and every GPU object used to draw a scene.
pub struct FrameOrchestrator<D: GpuDevice> {
    device: D,
    swapchain: SwapchainManager<D>,
    sync: Option<FrameSync<D>>,
    scene: Option<SceneCache<D>>,
    staging: Option<StagingBuffer<D>>,
    overlay_target: Option<(Extent2D, PixelFormat)>,
    clear_color: [f32; 4],
    drawable: Extent2D,
    resized: bool,
    needs_recreate: bool,
}

impl<D: GpuDevice> FrameOrchestrator<D> {
    /// Load the scene from `host`, upload it, and build the first swapchain.
    ///
    /// A zero-sized drawable is accepted; the swapchain is then created by
    /// the first frame drawn after a nonzero size is reported.
    pub fn new(
        device: D,
        host: &dyn SceneHost,
        settings: FrameSettings,
        drawable: Extent2D,
    ) -> Result<Self, RenderError> {
        let shaders = ShaderRegistry::load(host)?;
        let geometry = SceneGeometry::aggregate(host.load_scene_objects()?)?;
        geometry.check_shader_keys(&shaders);

        let mut orchestrator = Self {
            device,
            swapchain: SwapchainManager::new(shaders, settings.present_mode),
            sync: None,
            scene: None,
            staging: None,
            overlay_target: None,
            clear_color: settings.clear_color,
            drawable,
            resized: false,
            needs_recreate: false,
        };

        // On error, Drop releases whatever was created so far
        orchestrator.scene = Some(SceneCache::upload(&mut orchestrator.device, geometry)?);
        orchestrator.sync = Some(FrameSync::new(&mut orchestrator.device)?);
        if drawable.is_zero() {
            debug!("Drawable is zero-sized, swapchain creation deferred");
            orchestrator.needs_recreate = true;
        } else {
            orchestrator
                .swapchain
                .create(&mut orchestrator.device, drawable)?;
        }
        Ok(orchestrator)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn swapchain(&self) -> &SwapchainManager<D> {
        &self.swapchain
    }

    /// Draw descriptors of the uploaded scene.
    pub fn objects(&self) -> &[crate::scene::RenderObject] {
        self.scene
            .as_ref()
            .map_or(&[], |scene| scene.objects.as_slice())
    }

    /// Record a new drawable size in physical pixels. The swapchain is
    /// rebuilt by the next frame.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.drawable = Extent2D::new(width, height);
        self.resized = true;
    }

    /// Draw one frame.
    pub fn draw_frame(
        &mut self,
        host: &dyn SceneHost,
        overlay: Option<&mut dyn OverlayCompositor>,
        time: f32,
    ) -> Result<FrameOutcome, RenderError> {
        if matches!(self.swapchain.state(), SwapchainState::Destroyed) {
            return Err(RenderError::InvalidTransition {
                operation: "draw",
                state: "destroyed",
            });
        }
        if self.needs_recreate || self.swapchain.bundle().is_none() {
            // Only the zero-size path leaves the fence in a waitable state
            // without a rebuild, so nothing below runs until one succeeds.
            if !self.recover()? {
                return Ok(FrameOutcome::Suspended);
            }
        }

        let (Some(sync), Some(bundle)) = (self.sync.as_ref(), self.swapchain.bundle()) else {
            return Err(RenderError::InvalidTransition {
                operation: "draw",
                state: "shut down",
            });
        };
        let fence = sync.in_flight;
        let image_available = sync.image_available;
        let render_finished = sync.render_finished;
        let swapchain = bundle.swapchain;

        self.device.wait_for_fence(fence)?;
        self.device.reset_fence(fence)?;

        let image_index = match self.device.acquire_next_image(swapchain, image_available)? {
            AcquireOutcome::Ready(index) if !self.resized => index,
            outcome => {
                trace_point!("frame abort", acquire = outcome, resized = self.resized);
                debug!("Frame aborted: {:?}, resized: {}", outcome, self.resized);
                self.recover()?;
                return Ok(FrameOutcome::Aborted);
            }
        };

        let cmd = self.record(host, overlay, image_index, time)?;

        self.device
            .submit(cmd, image_available, render_finished, fence)?;
        let presented = self
            .device
            .present(swapchain, image_index, render_finished)?;
        trace_point!("frame present", image = image_index, outcome = presented);

        if presented == PresentOutcome::Presented && !self.resized {
            return Ok(FrameOutcome::Presented { recreated: false });
        }
        debug!("Present reported {:?}, resized: {}", presented, self.resized);
        let recreated = self.recover()?;
        Ok(FrameOutcome::Presented { recreated })
    }

    /// Record the command buffer for `image_index` and return it.
    fn record(
        &mut self,
        host: &dyn SceneHost,
        overlay: Option<&mut dyn OverlayCompositor>,
        image_index: u32,
        time: f32,
    ) -> Result<D::CommandBuffer, RenderError> {
        let (Some(bundle), Some(scene)) = (self.swapchain.bundle(), self.scene.as_ref()) else {
            return Err(RenderError::InvalidTransition {
                operation: "record",
                state: "shut down",
            });
        };
        let index = image_index as usize;
        let (Some(&cmd), Some(&framebuffer), Some(&image)) = (
            bundle.command_buffers.get(index),
            bundle.framebuffers.get(index),
            bundle.images.get(index),
        ) else {
            return Err(RenderError::gpu(
                "acquire_next_image",
                format!("image index {image_index} out of range"),
            ));
        };
        let extent = bundle.extent;
        let format = bundle.format.format;
        let layout = bundle.pipeline_layout;

        let view_proj = host.view_projection(extent.aspect());

        let device = &mut self.device;
        device.reset_command_buffer(cmd)?;
        device.begin_command_buffer(cmd)?;
        device.cmd_begin_render_pass(cmd, bundle.render_pass, framebuffer, extent, self.clear_color);
        device.cmd_bind_geometry(cmd, scene.vertex_buffer, scene.index_buffer);

        let mut bound = None;
        for object in &scene.objects {
            let pipeline = bundle.pipeline(&object.shader_key)?;
            if bound != Some(pipeline) {
                device.cmd_bind_pipeline(cmd, pipeline);
                bound = Some(pipeline);
            }
            let model = host.model_matrix(object.transform, time);
            device.cmd_push_constants(cmd, layout, &PushConstants::new(model, view_proj));
            device.cmd_draw_indexed(
                cmd,
                object.index_count,
                object.index_offset,
                object.vertex_offset,
            );
        }
        device.cmd_end_render_pass(cmd);

        if let Some(overlay) = overlay {
            self.record_overlay(host, overlay, cmd, image, extent, format)?;
        }

        self.device.end_command_buffer(cmd)?;
        Ok(cmd)
    }

    /// Composite the overlay and copy its painted region onto `image`.
    /// Any frame that does not match the image is skipped.
    fn record_overlay(
        &mut self,
        host: &dyn SceneHost,
        overlay: &mut dyn OverlayCompositor,
        cmd: D::CommandBuffer,
        image: D::Image,
        extent: Extent2D,
        format: PixelFormat,
    ) -> Result<(), RenderError> {
        if self.overlay_target != Some((extent, format)) {
            overlay.resize(extent.width, extent.height, format);
            self.overlay_target = Some((extent, format));
        }
        if !overlay.is_active() {
            return Ok(());
        }

        let commands = host.gui_commands();
        let Some(frame) = overlay.frame(&commands) else {
            return Ok(());
        };

        let expected_len = extent.width as usize * extent.height as usize * 4;
        if frame.width != extent.width
            || frame.height != extent.height
            || frame.pixels.len() != expected_len
            || frame.region.is_empty()
            || !frame.region.fits(extent)
        {
            debug!(
                "Overlay frame skipped: {}x{} ({} bytes), region {:?}, target {}x{}",
                frame.width,
                frame.height,
                frame.pixels.len(),
                frame.region,
                extent.width,
                extent.height
            );
            return Ok(());
        }

        let staging = self.ensure_staging(extent)?;
        self.device.write_buffer(staging, 0, frame.pixels)?;
        self.device
            .cmd_blit_to_image(cmd, staging, image, extent, frame.region);
        Ok(())
    }

    fn ensure_staging(&mut self, extent: Extent2D) -> Result<D::Buffer, RenderError> {
        if let Some(staging) = &self.staging {
            if staging.extent == extent {
                return Ok(staging.buffer);
            }
        }
        if let Some(old) = self.staging.take() {
            self.device.destroy_buffer(old.buffer);
        }
        let size = u64::from(extent.width) * u64::from(extent.height) * 4;
        let buffer = self.device.create_buffer(BufferUsage::TransferSrc, size)?;
        self.staging = Some(StagingBuffer { buffer, extent });
        Ok(buffer)
    }

    /// Rebuild the swapchain for the current drawable size.
    ///
    /// Returns whether a new bundle exists. On success the frame sync objects
    /// are replaced too: an aborted frame leaves the fence reset with nothing
    /// to signal it.
    fn recover(&mut self) -> Result<bool, RenderError> {
        self.needs_recreate = true;
        match self.swapchain.recreate(&mut self.device, self.drawable)? {
            RecreateOutcome::Recreated => {
                if let Some(sync) = self.sync.as_mut() {
                    sync.rebuild(&mut self.device)?;
                }
                self.resized = false;
                self.needs_recreate = false;
                Ok(true)
            }
            RecreateOutcome::Deferred => Ok(false),
        }
    }

    /// Reload geometry and shaders from `host`.
    ///
    /// On error the current scene stays loaded. New shaders take effect
    /// through a swapchain rebuild on the next frame.
    pub fn reload_scene(&mut self, host: &dyn SceneHost) -> Result<(), RenderError> {
        let shaders = ShaderRegistry::load(host)?;
        let geometry = SceneGeometry::aggregate(host.load_scene_objects()?)?;
        geometry.check_shader_keys(&shaders);

        self.device.wait_idle()?;
        let cache = SceneCache::upload(&mut self.device, geometry)?;
        if let Some(old) = self.scene.replace(cache) {
            old.destroy(&mut self.device);
        }

        if &shaders != self.swapchain.shaders() {
            self.swapchain.set_shaders(shaders);
            self.needs_recreate = true;
        }
        info!("Scene reloaded: {} objects", self.objects().len());
        trace_point!("scene reload", objects = self.objects().len());
        Ok(())
    }

    /// Wait for the device and destroy every GPU object. Idempotent.
    pub fn shutdown(&mut self) {
        if matches!(self.swapchain.state(), SwapchainState::Destroyed)
            && self.sync.is_none()
            && self.scene.is_none()
        {
            return;
        }
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle failed during shutdown: {}", e);
        }
        self.swapchain.close(&mut self.device);
        if let Some(staging) = self.staging.take() {
            self.device.destroy_buffer(staging.buffer);
        }
        if let Some(scene) = self.scene.take() {
            scene.destroy(&mut self.device);
        }
        if let Some(sync) = self.sync.take() {
            sync.destroy(&mut self.device);
        }
        trace_point!("renderer shutdown");
    }
}

impl<D: GpuDevice> Drop for FrameOrchestrator<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
