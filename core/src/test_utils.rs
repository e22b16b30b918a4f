//! Shared test utilities: a recording GPU device, a scripted scene host, an
//! overlay stub and an in-memory audio backend.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use glam::{Mat4, Vec3};
use hashbrown::HashMap;
use vkscene_shared::{GuiCommand, PushConstants, Vertex};

use crate::audio::{AudioBackend, AudioFormat, AudioStream, VoiceMixer};
use crate::error::{AudioError, RenderError, SceneError};
use crate::overlay::{OverlayCompositor, OverlayFrame};
use crate::render::{
    AcquireOutcome, BufferUsage, ColorSpace, Extent2D, GpuDevice, ImageRegion, PixelFormat,
    PresentMode, PresentOutcome, SurfaceFormat, SurfaceSupport, SwapchainDesc,
};
use crate::scene::{SceneHost, SceneObject, ShaderPaths, ShaderRegistry, TransformHandle};

// ============================================================================
// Scene fixtures
// ============================================================================

pub fn shader_paths(key: &str) -> ShaderPaths {
    ShaderPaths {
        vertex: PathBuf::from(format!("shaders/{key}.vert.spv")),
        fragment: PathBuf::from(format!("shaders/{key}.frag.spv")),
    }
}

pub fn shader_map(keys: &[&str]) -> BTreeMap<String, ShaderPaths> {
    keys.iter()
        .map(|&key| (key.to_string(), shader_paths(key)))
        .collect()
}

pub fn shader_registry(keys: &[&str]) -> ShaderRegistry {
    ShaderRegistry::new(shader_map(keys)).unwrap()
}

pub fn triangle(shader: &str) -> SceneObject {
    SceneObject {
        vertices: vec![
            Vertex::new([0.0, -0.5, 0.0], [1.0, 0.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
        ],
        indices: vec![0, 1, 2],
        shader_key: shader.to_string(),
        transform: None,
    }
}

pub fn quad(shader: &str) -> SceneObject {
    SceneObject {
        vertices: vec![
            Vertex::new([-0.5, -0.5, 0.0], [1.0, 1.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0], [1.0, 1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0], [1.0, 1.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0]),
        ],
        indices: vec![0, 1, 2, 2, 3, 0],
        shader_key: shader.to_string(),
        transform: None,
    }
}

// ============================================================================
// Mock scene host
// ============================================================================

/// Scene host with fixed data.
///
/// `view_projection(aspect)` is a uniform scale by `aspect`, and
/// `model_matrix(Some(h), t)` translates by `(h, t, 0)`, so tests can read
/// both back out of the pushed constants.
pub struct MockHost {
    pub objects: Vec<SceneObject>,
    pub shaders: BTreeMap<String, ShaderPaths>,
    pub gui: Vec<GuiCommand>,
}

impl MockHost {
    pub fn new(objects: Vec<SceneObject>, shader_keys: &[&str]) -> Self {
        Self {
            objects,
            shaders: shader_map(shader_keys),
            gui: Vec::new(),
        }
    }
}

impl SceneHost for MockHost {
    fn load_scene_objects(&self) -> Result<Vec<SceneObject>, SceneError> {
        Ok(self.objects.clone())
    }

    fn load_shader_paths(&self) -> Result<BTreeMap<String, ShaderPaths>, SceneError> {
        Ok(self.shaders.clone())
    }

    fn view_projection(&self, aspect: f32) -> Mat4 {
        Mat4::from_scale(Vec3::splat(aspect))
    }

    fn model_matrix(&self, handle: Option<TransformHandle>, time: f32) -> Mat4 {
        match handle {
            Some(TransformHandle(id)) => Mat4::from_translation(Vec3::new(id as f32, time, 0.0)),
            None => Mat4::IDENTITY,
        }
    }

    fn gui_commands(&self) -> Vec<GuiCommand> {
        self.gui.clone()
    }
}

// ============================================================================
// Mock overlay
// ============================================================================

/// Overlay that returns a solid buffer with a fixed painted region.
pub struct MockOverlay {
    pub active: bool,
    pub region: ImageRegion,
    pub resizes: Vec<(u32, u32, PixelFormat)>,
    pub frames_requested: usize,
    pixels: Vec<u8>,
    size: (u32, u32),
}

impl MockOverlay {
    pub fn new(region: ImageRegion) -> Self {
        Self {
            active: true,
            region,
            resizes: Vec::new(),
            frames_requested: 0,
            pixels: Vec::new(),
            size: (0, 0),
        }
    }
}

impl OverlayCompositor for MockOverlay {
    fn resize(&mut self, width: u32, height: u32, format: PixelFormat) {
        self.resizes.push((width, height, format));
        self.size = (width, height);
        self.pixels = vec![0xAB; width as usize * height as usize * 4];
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn frame(&mut self, _commands: &[GuiCommand]) -> Option<OverlayFrame<'_>> {
        self.frames_requested += 1;
        Some(OverlayFrame {
            pixels: &self.pixels,
            width: self.size.0,
            height: self.size.1,
            region: self.region,
        })
    }
}

// ============================================================================
// Mock GPU device
// ============================================================================

/// Recording GPU device.
///
/// Handles are unique `u64`s. The mock tracks which handles are alive, which
/// render pass and view each framebuffer references, and the signal state of
/// fences and semaphores. Misuse that a real driver would reject or hang on
/// is recorded in [`violations`](Self::violations).
pub struct MockDevice {
    next_handle: u64,
    live: HashMap<u64, &'static str>,
    framebuffer_refs: HashMap<u64, (u64, u64)>,
    view_swapchain: HashMap<u64, u64>,
    image_swapchain: HashMap<u64, u64>,
    swapchain_images: HashMap<u64, Vec<u64>>,
    fence_signaled: HashMap<u64, bool>,
    semaphore_signaled: HashMap<u64, bool>,
    buffers: HashMap<u64, Vec<u8>>,
    next_image: u32,
    log: Vec<&'static str>,
    violations: Vec<String>,
    fail_on: Option<&'static str>,

    pub support: SurfaceSupport,
    pub acquire_script: VecDeque<AcquireOutcome>,
    pub present_script: VecDeque<PresentOutcome>,
    pub swapchain_descs: Vec<SwapchainDesc>,
    pub bound_pipelines: Vec<u64>,
    pub pushed: Vec<PushConstants>,
    pub draws: Vec<(u32, u32, i32)>,
    pub blits: Vec<(u64, u64, Extent2D, ImageRegion)>,
    pub clear_colors: Vec<[f32; 4]>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            live: HashMap::new(),
            framebuffer_refs: HashMap::new(),
            view_swapchain: HashMap::new(),
            image_swapchain: HashMap::new(),
            swapchain_images: HashMap::new(),
            fence_signaled: HashMap::new(),
            semaphore_signaled: HashMap::new(),
            buffers: HashMap::new(),
            next_image: 0,
            log: Vec::new(),
            violations: Vec::new(),
            fail_on: None,
            support: SurfaceSupport {
                min_image_count: 2,
                max_image_count: 3,
                min_extent: Extent2D::new(1, 1),
                max_extent: Extent2D::new(4096, 4096),
                formats: vec![
                    SurfaceFormat {
                        format: PixelFormat::Rgba8Unorm,
                        color_space: ColorSpace::SrgbNonlinear,
                    },
                    SurfaceFormat::PREFERRED,
                ],
                present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            },
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            swapchain_descs: Vec::new(),
            bound_pipelines: Vec::new(),
            pushed: Vec::new(),
            draws: Vec::new(),
            blits: Vec::new(),
            clear_colors: Vec::new(),
        }
    }

    /// Make the named operation fail with a GPU error from now on.
    pub fn fail_on(&mut self, operation: &'static str) {
        self.fail_on = Some(operation);
    }

    pub fn log(&self) -> &[&'static str] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn count(&self, operation: &str) -> usize {
        self.log.iter().filter(|&&op| op == operation).count()
    }

    /// Object kinds in destruction order.
    pub fn destroy_kinds(&self) -> Vec<&'static str> {
        self.log
            .iter()
            .filter_map(|op| {
                op.strip_prefix("destroy_")
                    .or_else(|| op.strip_prefix("free_"))
            })
            .collect()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn live_handle_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: u64) -> bool {
        self.live.contains_key(&handle)
    }

    /// Every live framebuffer references a live render pass and image view.
    pub fn framebuffers_consistent(&self) -> bool {
        self.framebuffer_refs
            .values()
            .all(|(pass, view)| self.is_live(*pass) && self.is_live(*view))
    }

    pub fn buffer_contents(&self, buffer: u64) -> Vec<u8> {
        self.buffers.get(&buffer).cloned().unwrap_or_default()
    }

    fn record(&mut self, operation: &'static str) -> Result<(), RenderError> {
        self.log.push(operation);
        if self.fail_on == Some(operation) {
            return Err(RenderError::gpu(operation, "injected failure"));
        }
        Ok(())
    }

    fn alloc(&mut self, kind: &'static str) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle, kind);
        handle
    }

    fn release(&mut self, operation: &'static str, handle: u64, kind: &'static str) {
        self.log.push(operation);
        match self.live.remove(&handle) {
            Some(found) if found == kind => {}
            Some(found) => self
                .violations
                .push(format!("{operation}: handle {handle} is a {found}")),
            None => self
                .violations
                .push(format!("{operation}: handle {handle} is not live")),
        }
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }
}

impl GpuDevice for MockDevice {
    type Swapchain = u64;
    type Image = u64;
    type ImageView = u64;
    type RenderPass = u64;
    type PipelineLayout = u64;
    type Pipeline = u64;
    type Framebuffer = u64;
    type CommandBuffer = u64;
    type Fence = u64;
    type Semaphore = u64;
    type Buffer = u64;

    fn surface_support(&mut self) -> Result<SurfaceSupport, RenderError> {
        self.record("surface_support")?;
        Ok(self.support.clone())
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<u64, RenderError> {
        self.record("create_swapchain")?;
        self.swapchain_descs.push(*desc);
        let swapchain = self.alloc("swapchain");
        let images: Vec<u64> = (0..desc.image_count)
            .map(|_| {
                let image = self.next_handle;
                self.next_handle += 1;
                image
            })
            .collect();
        for &image in &images {
            self.image_swapchain.insert(image, swapchain);
        }
        self.swapchain_images.insert(swapchain, images);
        Ok(swapchain)
    }

    fn swapchain_images(&mut self, swapchain: u64) -> Result<Vec<u64>, RenderError> {
        self.record("swapchain_images")?;
        Ok(self
            .swapchain_images
            .get(&swapchain)
            .cloned()
            .unwrap_or_default())
    }

    fn destroy_swapchain(&mut self, swapchain: u64) {
        let views_alive = self
            .view_swapchain
            .iter()
            .any(|(view, owner)| *owner == swapchain && self.is_live(*view));
        if views_alive {
            self.violation(format!("swapchain {swapchain} destroyed while views are live"));
        }
        self.release("destroy_swapchain", swapchain, "swapchain");
        self.swapchain_images.remove(&swapchain);
        self.next_image = 0;
    }

    fn create_image_view(&mut self, image: u64, _format: PixelFormat) -> Result<u64, RenderError> {
        self.record("create_image_view")?;
        let view = self.alloc("image_view");
        if let Some(&swapchain) = self.image_swapchain.get(&image) {
            self.view_swapchain.insert(view, swapchain);
        }
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: u64) {
        if self.framebuffer_refs.values().any(|(_, v)| *v == view) {
            self.violation(format!("image view {view} destroyed while a framebuffer uses it"));
        }
        self.release("destroy_image_view", view, "image_view");
        self.view_swapchain.remove(&view);
    }

    fn create_render_pass(&mut self, _format: PixelFormat) -> Result<u64, RenderError> {
        self.record("create_render_pass")?;
        Ok(self.alloc("render_pass"))
    }

    fn destroy_render_pass(&mut self, render_pass: u64) {
        if self.framebuffer_refs.values().any(|(p, _)| *p == render_pass) {
            self.violation(format!(
                "render pass {render_pass} destroyed while a framebuffer uses it"
            ));
        }
        self.release("destroy_render_pass", render_pass, "render_pass");
    }

    fn create_pipeline_layout(&mut self) -> Result<u64, RenderError> {
        self.record("create_pipeline_layout")?;
        Ok(self.alloc("pipeline_layout"))
    }

    fn destroy_pipeline_layout(&mut self, layout: u64) {
        self.release("destroy_pipeline_layout", layout, "pipeline_layout");
    }

    fn create_graphics_pipeline(
        &mut self,
        _shaders: &ShaderPaths,
        render_pass: u64,
        layout: u64,
        _extent: Extent2D,
    ) -> Result<u64, RenderError> {
        self.record("create_graphics_pipeline")?;
        if !self.is_live(render_pass) || !self.is_live(layout) {
            self.violation("pipeline created against a dead render pass or layout".to_string());
        }
        Ok(self.alloc("pipeline"))
    }

    fn destroy_pipeline(&mut self, pipeline: u64) {
        self.release("destroy_pipeline", pipeline, "pipeline");
    }

    fn create_framebuffer(
        &mut self,
        render_pass: u64,
        view: u64,
        _extent: Extent2D,
    ) -> Result<u64, RenderError> {
        self.record("create_framebuffer")?;
        let framebuffer = self.alloc("framebuffer");
        self.framebuffer_refs.insert(framebuffer, (render_pass, view));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: u64) {
        self.release("destroy_framebuffer", framebuffer, "framebuffer");
        self.framebuffer_refs.remove(&framebuffer);
    }

    fn allocate_command_buffers(&mut self, count: u32) -> Result<Vec<u64>, RenderError> {
        self.record("allocate_command_buffers")?;
        Ok((0..count).map(|_| self.alloc("command_buffer")).collect())
    }

    fn free_command_buffers(&mut self, buffers: &[u64]) {
        for &buffer in buffers {
            self.release("free_command_buffers", buffer, "command_buffer");
        }
    }

    fn create_fence(&mut self, signaled: bool) -> Result<u64, RenderError> {
        self.record("create_fence")?;
        let fence = self.alloc("fence");
        self.fence_signaled.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: u64) {
        self.release("destroy_fence", fence, "fence");
        self.fence_signaled.remove(&fence);
    }

    fn create_semaphore(&mut self) -> Result<u64, RenderError> {
        self.record("create_semaphore")?;
        let semaphore = self.alloc("semaphore");
        self.semaphore_signaled.insert(semaphore, false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&mut self, semaphore: u64) {
        self.release("destroy_semaphore", semaphore, "semaphore");
        self.semaphore_signaled.remove(&semaphore);
    }

    fn wait_for_fence(&mut self, fence: u64) -> Result<(), RenderError> {
        self.record("wait_for_fence")?;
        if self.fence_signaled.get(&fence) != Some(&true) {
            // nothing pending will ever signal it: a real device would hang
            self.violation(format!("wait on fence {fence} that can never signal"));
            return Err(RenderError::gpu("wait_for_fence", "deadlock"));
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: u64) -> Result<(), RenderError> {
        self.record("reset_fence")?;
        self.fence_signaled.insert(fence, false);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), RenderError> {
        self.record("wait_idle")
    }

    fn create_buffer(&mut self, _usage: BufferUsage, size: u64) -> Result<u64, RenderError> {
        self.record("create_buffer")?;
        let buffer = self.alloc("buffer");
        self.buffers.insert(buffer, vec![0; size as usize]);
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: u64, offset: u64, bytes: &[u8]) -> Result<(), RenderError> {
        self.record("write_buffer")?;
        let Some(contents) = self.buffers.get_mut(&buffer) else {
            return Err(RenderError::gpu("write_buffer", "unknown buffer"));
        };
        let start = offset as usize;
        let end = start + bytes.len();
        if end > contents.len() {
            return Err(RenderError::gpu("write_buffer", "write past end of buffer"));
        }
        contents[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: u64) {
        self.release("destroy_buffer", buffer, "buffer");
        self.buffers.remove(&buffer);
    }

    fn acquire_next_image(
        &mut self,
        swapchain: u64,
        signal: u64,
    ) -> Result<AcquireOutcome, RenderError> {
        self.record("acquire_next_image")?;
        if !self.is_live(swapchain) {
            self.violation(format!("acquire on dead swapchain {swapchain}"));
        }
        let image_count = self
            .swapchain_images
            .get(&swapchain)
            .map_or(1, |images| images.len().max(1) as u32);
        let outcome = self.acquire_script.pop_front().unwrap_or_else(|| {
            let index = self.next_image % image_count;
            self.next_image += 1;
            AcquireOutcome::Ready(index)
        });
        if !matches!(outcome, AcquireOutcome::OutOfDate) {
            if self.semaphore_signaled.get(&signal) == Some(&true) {
                self.violation(format!("acquire signals semaphore {signal} that is already signaled"));
            }
            self.semaphore_signaled.insert(signal, true);
        }
        Ok(outcome)
    }

    fn submit(&mut self, _cmd: u64, wait: u64, signal: u64, fence: u64) -> Result<(), RenderError> {
        self.record("submit")?;
        if self.semaphore_signaled.get(&wait) != Some(&true) {
            self.violation(format!("submit waits on unsignaled semaphore {wait}"));
        }
        if self.fence_signaled.get(&fence) != Some(&false) {
            self.violation(format!("submit with fence {fence} not reset"));
        }
        self.semaphore_signaled.insert(wait, false);
        self.semaphore_signaled.insert(signal, true);
        // work completes immediately
        self.fence_signaled.insert(fence, true);
        Ok(())
    }

    fn present(
        &mut self,
        swapchain: u64,
        _image_index: u32,
        wait: u64,
    ) -> Result<PresentOutcome, RenderError> {
        self.record("present")?;
        if !self.is_live(swapchain) {
            self.violation(format!("present on dead swapchain {swapchain}"));
        }
        if self.semaphore_signaled.get(&wait) != Some(&true) {
            self.violation(format!("present waits on unsignaled semaphore {wait}"));
        }
        self.semaphore_signaled.insert(wait, false);
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn reset_command_buffer(&mut self, _cmd: u64) -> Result<(), RenderError> {
        self.record("reset_command_buffer")
    }

    fn begin_command_buffer(&mut self, _cmd: u64) -> Result<(), RenderError> {
        self.record("begin_command_buffer")
    }

    fn end_command_buffer(&mut self, _cmd: u64) -> Result<(), RenderError> {
        self.record("end_command_buffer")
    }

    fn cmd_begin_render_pass(
        &mut self,
        _cmd: u64,
        render_pass: u64,
        framebuffer: u64,
        _extent: Extent2D,
        clear_color: [f32; 4],
    ) {
        self.log.push("cmd_begin_render_pass");
        self.clear_colors.push(clear_color);
        if self.framebuffer_refs.get(&framebuffer).map(|(p, _)| *p) != Some(render_pass) {
            self.violation(format!(
                "framebuffer {framebuffer} does not belong to render pass {render_pass}"
            ));
        }
    }

    fn cmd_end_render_pass(&mut self, _cmd: u64) {
        self.log.push("cmd_end_render_pass");
    }

    fn cmd_bind_geometry(&mut self, _cmd: u64, vertices: u64, indices: u64) {
        self.log.push("cmd_bind_geometry");
        if !self.is_live(vertices) || !self.is_live(indices) {
            self.violation("bound a dead geometry buffer".to_string());
        }
    }

    fn cmd_bind_pipeline(&mut self, _cmd: u64, pipeline: u64) {
        self.log.push("cmd_bind_pipeline");
        if !self.is_live(pipeline) {
            self.violation(format!("bound dead pipeline {pipeline}"));
        }
        self.bound_pipelines.push(pipeline);
    }

    fn cmd_push_constants(&mut self, _cmd: u64, _layout: u64, constants: &PushConstants) {
        self.log.push("cmd_push_constants");
        self.pushed.push(*constants);
    }

    fn cmd_draw_indexed(&mut self, _cmd: u64, index_count: u32, first_index: u32, vertex_offset: i32) {
        self.log.push("cmd_draw_indexed");
        self.draws.push((index_count, first_index, vertex_offset));
    }

    fn cmd_blit_to_image(
        &mut self,
        _cmd: u64,
        staging: u64,
        image: u64,
        image_extent: Extent2D,
        region: ImageRegion,
    ) {
        self.log.push("cmd_blit_to_image");
        self.blits.push((staging, image, image_extent, region));
    }
}

// ============================================================================
// Mock audio backend
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Opened(AudioFormat),
    Resumed,
    Paused,
    Dropped,
}

/// Audio backend whose "device callback" is driven by the test.
#[derive(Default)]
pub struct MockAudioBackend {
    events: Arc<Mutex<Vec<StreamEvent>>>,
    mixer: Option<Arc<VoiceMixer>>,
    unavailable: bool,
}

impl MockAudioBackend {
    /// Backend that has no device.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<StreamEvent>>> {
        Arc::clone(&self.events)
    }

    /// Pull one block the way a device callback would.
    pub fn run_callback(&self, sample_count: usize) -> Vec<i16> {
        let mut block = vec![0; sample_count];
        if let Some(mixer) = &self.mixer {
            mixer.mix_into(&mut block);
        }
        block
    }
}

pub struct MockStream {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl AudioStream for MockStream {
    fn resume(&mut self) -> Result<(), AudioError> {
        self.events.lock().unwrap().push(StreamEvent::Resumed);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.events.lock().unwrap().push(StreamEvent::Paused);
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.events.lock().unwrap().push(StreamEvent::Dropped);
    }
}

impl AudioBackend for MockAudioBackend {
    type Stream = MockStream;

    fn open_stream(
        &mut self,
        format: AudioFormat,
        mixer: Arc<VoiceMixer>,
    ) -> Result<MockStream, AudioError> {
        if self.unavailable {
            return Err(AudioError::Device("no output device".to_string()));
        }
        self.events.lock().unwrap().push(StreamEvent::Opened(format));
        self.mixer = Some(mixer);
        Ok(MockStream {
            events: Arc::clone(&self.events),
        })
    }
}
