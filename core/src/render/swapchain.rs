//! Swapchain bundle state machine
//!
//! The bundle is every presentation object whose lifetime depends on the
//! swapchain: images, views, render pass, pipeline layout, one pipeline per
//! shader key, framebuffers and command buffers. It is created as one unit
//! and destroyed as one unit, so a framebuffer never outlives its render pass
//! or image view.
//!
//! ```text
//! Uninitialized --create--> Ready --recreate--> Ready --destroy--> Destroyed
//! ```

use hashbrown::HashMap;
use tracing::{debug, info};

use super::{Extent2D, GpuDevice, PresentMode, SurfaceFormat, SurfaceSupport, SwapchainDesc};
use crate::error::RenderError;
use crate::scene::ShaderRegistry;
use crate::trace_point;

/// Pick the preferred surface format pair, else the first one reported.
pub fn choose_surface_format(formats: &[SurfaceFormat]) -> Result<SurfaceFormat, RenderError> {
    if formats.contains(&SurfaceFormat::PREFERRED) {
        return Ok(SurfaceFormat::PREFERRED);
    }
    formats.first().copied().ok_or(RenderError::NoSurfaceFormats)
}

/// Pick `preferred` when the surface supports it, else FIFO.
pub fn choose_present_mode(modes: &[PresentMode], preferred: PresentMode) -> PresentMode {
    if modes.contains(&preferred) {
        preferred
    } else {
        PresentMode::Fifo
    }
}

/// Clamp the drawable size (physical pixels) to the surface limits.
pub fn choose_extent(support: &SurfaceSupport, drawable: Extent2D) -> Extent2D {
    let width = drawable
        .width
        .max(support.min_extent.width)
        .min(support.max_extent.width.max(support.min_extent.width));
    let height = drawable
        .height
        .max(support.min_extent.height)
        .min(support.max_extent.height.max(support.min_extent.height));
    Extent2D::new(width, height)
}

/// One more image than the minimum, capped by the maximum when there is one.
pub fn choose_image_count(support: &SurfaceSupport) -> u32 {
    let wanted = support.min_image_count + 1;
    if support.max_image_count == 0 {
        wanted
    } else {
        wanted.min(support.max_image_count)
    }
}

/// Look up the pipeline for `key`, falling back to `default_key`.
pub fn resolve_pipeline<P: Copy>(
    pipelines: &HashMap<String, P>,
    key: &str,
    default_key: &str,
) -> Result<P, RenderError> {
    pipelines
        .get(key)
        .or_else(|| pipelines.get(default_key))
        .copied()
        .ok_or_else(|| RenderError::MissingPipeline {
            key: key.to_string(),
            default_key: default_key.to_string(),
        })
}

/// A fully built set of presentation objects.
#[derive(Debug)]
pub struct SwapchainBundle<D: GpuDevice> {
    pub swapchain: D::Swapchain,
    pub format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub extent: Extent2D,
    pub images: Vec<D::Image>,
    pub image_views: Vec<D::ImageView>,
    pub render_pass: D::RenderPass,
    pub pipeline_layout: D::PipelineLayout,
    pub pipelines: HashMap<String, D::Pipeline>,
    pub default_key: String,
    pub framebuffers: Vec<D::Framebuffer>,
    pub command_buffers: Vec<D::CommandBuffer>,
}

impl<D: GpuDevice> SwapchainBundle<D> {
    /// Pipeline for a shader key, falling back to the default key.
    pub fn pipeline(&self, key: &str) -> Result<D::Pipeline, RenderError> {
        resolve_pipeline(&self.pipelines, key, &self.default_key)
    }

    fn into_parts(self) -> BundleParts<D> {
        BundleParts {
            swapchain: Some(self.swapchain),
            image_views: self.image_views,
            render_pass: Some(self.render_pass),
            pipeline_layout: Some(self.pipeline_layout),
            pipelines: self.pipelines,
            framebuffers: self.framebuffers,
            command_buffers: self.command_buffers,
        }
    }
}

/// Objects created so far while building a bundle.
struct BundleParts<D: GpuDevice> {
    swapchain: Option<D::Swapchain>,
    image_views: Vec<D::ImageView>,
    render_pass: Option<D::RenderPass>,
    pipeline_layout: Option<D::PipelineLayout>,
    pipelines: HashMap<String, D::Pipeline>,
    framebuffers: Vec<D::Framebuffer>,
    command_buffers: Vec<D::CommandBuffer>,
}

impl<D: GpuDevice> BundleParts<D> {
    fn empty() -> Self {
        Self {
            swapchain: None,
            image_views: Vec::new(),
            render_pass: None,
            pipeline_layout: None,
            pipelines: HashMap::new(),
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
        }
    }

    /// Destroy in reverse dependency order.
    fn teardown(mut self, device: &mut D) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        if !self.command_buffers.is_empty() {
            device.free_command_buffers(&self.command_buffers);
        }
        for (_, pipeline) in self.pipelines.drain() {
            device.destroy_pipeline(pipeline);
        }
        if let Some(layout) = self.pipeline_layout.take() {
            device.destroy_pipeline_layout(layout);
        }
        if let Some(render_pass) = self.render_pass.take() {
            device.destroy_render_pass(render_pass);
        }
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view);
        }
        if let Some(swapchain) = self.swapchain.take() {
            device.destroy_swapchain(swapchain);
        }
    }
}

/// Lifecycle state of the bundle.
#[derive(Debug)]
pub enum SwapchainState<D: GpuDevice> {
    Uninitialized,
    Ready(SwapchainBundle<D>),
    Destroyed,
}

impl<D: GpuDevice> SwapchainState<D> {
    fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready(_) => "ready",
            Self::Destroyed => "destroyed",
        }
    }
}

/// Result of [`SwapchainManager::recreate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    Recreated,
    /// The drawable is zero-sized; the old bundle (if any) is left untouched
    /// until a nonzero size is reported.
    Deferred,
}

/// Owner of the swapchain bundle.
pub struct SwapchainManager<D: GpuDevice> {
    state: SwapchainState<D>,
    shaders: ShaderRegistry,
    preferred_present_mode: PresentMode,
    generation: u64,
}

impl<D: GpuDevice> SwapchainManager<D> {
    pub fn new(shaders: ShaderRegistry, preferred_present_mode: PresentMode) -> Self {
        Self {
            state: SwapchainState::Uninitialized,
            shaders,
            preferred_present_mode,
            generation: 0,
        }
    }

    pub fn state(&self) -> &SwapchainState<D> {
        &self.state
    }

    pub fn bundle(&self) -> Option<&SwapchainBundle<D>> {
        match &self.state {
            SwapchainState::Ready(bundle) => Some(bundle),
            _ => None,
        }
    }

    /// Number of bundles created so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    /// Swap the shader map used by the next create. The live bundle keeps
    /// its pipelines until it is recreated.
    pub fn set_shaders(&mut self, shaders: ShaderRegistry) {
        self.shaders = shaders;
    }

    /// Build the bundle. Only legal from `Uninitialized`.
    pub fn create(&mut self, device: &mut D, drawable: Extent2D) -> Result<(), RenderError> {
        if !matches!(self.state, SwapchainState::Uninitialized) {
            return Err(RenderError::InvalidTransition {
                operation: "create",
                state: self.state.name(),
            });
        }
        let bundle = self.build(device, drawable)?;
        self.generation += 1;
        info!(
            "Swapchain created: {:?} / {:?}, {:?}, {}x{}, {} images",
            bundle.format.format,
            bundle.format.color_space,
            bundle.present_mode,
            bundle.extent.width,
            bundle.extent.height,
            bundle.images.len()
        );
        trace_point!("swapchain create", generation = self.generation);
        self.state = SwapchainState::Ready(bundle);
        Ok(())
    }

    /// Tear down the bundle permanently. A no-op unless `Ready`.
    pub fn destroy(&mut self, device: &mut D) {
        match std::mem::replace(&mut self.state, SwapchainState::Destroyed) {
            SwapchainState::Ready(bundle) => {
                bundle.into_parts().teardown(device);
                trace_point!("swapchain destroy");
            }
            other => self.state = other,
        }
    }

    /// Tear down the bundle if any and refuse every later transition.
    pub fn close(&mut self, device: &mut D) {
        self.destroy(device);
        self.state = SwapchainState::Destroyed;
    }

    /// Rebuild the bundle for a new drawable size.
    ///
    /// Waits for the device to go idle before anything is destroyed. A
    /// zero-sized drawable defers the rebuild and keeps the current bundle.
    /// If the new bundle cannot be built, the manager is left
    /// `Uninitialized` with nothing alive.
    pub fn recreate(
        &mut self,
        device: &mut D,
        drawable: Extent2D,
    ) -> Result<RecreateOutcome, RenderError> {
        if matches!(self.state, SwapchainState::Destroyed) {
            return Err(RenderError::InvalidTransition {
                operation: "recreate",
                state: self.state.name(),
            });
        }
        if drawable.is_zero() {
            debug!("Swapchain recreate deferred: drawable is zero-sized");
            return Ok(RecreateOutcome::Deferred);
        }

        device.wait_idle()?;
        if let SwapchainState::Ready(bundle) =
            std::mem::replace(&mut self.state, SwapchainState::Uninitialized)
        {
            bundle.into_parts().teardown(device);
        }
        trace_point!("swapchain recreate", width = drawable.width, height = drawable.height);
        self.create(device, drawable)?;
        Ok(RecreateOutcome::Recreated)
    }

    fn build(&self, device: &mut D, drawable: Extent2D) -> Result<SwapchainBundle<D>, RenderError> {
        let support = device.surface_support()?;
        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, self.preferred_present_mode);
        let extent = choose_extent(&support, drawable);
        let desc = SwapchainDesc {
            format,
            present_mode,
            extent,
            image_count: choose_image_count(&support),
        };

        let mut parts = BundleParts::empty();
        match self.build_parts(device, &desc, &mut parts) {
            Ok(bundle) => Ok(bundle),
            Err(e) => {
                parts.teardown(device);
                Err(e)
            }
        }
    }

    /// Create each bundle object in dependency order, recording it in `parts`
    /// as soon as it exists so a failure can unwind everything created.
    fn build_parts(
        &self,
        device: &mut D,
        desc: &SwapchainDesc,
        parts: &mut BundleParts<D>,
    ) -> Result<SwapchainBundle<D>, RenderError> {
        let swapchain = device.create_swapchain(desc)?;
        parts.swapchain = Some(swapchain);
        let images = device.swapchain_images(swapchain)?;

        for &image in &images {
            let view = device.create_image_view(image, desc.format.format)?;
            parts.image_views.push(view);
        }

        let render_pass = device.create_render_pass(desc.format.format)?;
        parts.render_pass = Some(render_pass);
        let layout = device.create_pipeline_layout()?;
        parts.pipeline_layout = Some(layout);

        for (key, paths) in self.shaders.iter() {
            let pipeline = device.create_graphics_pipeline(paths, render_pass, layout, desc.extent)?;
            parts.pipelines.insert(key.to_string(), pipeline);
        }

        for &view in &parts.image_views {
            let framebuffer = device.create_framebuffer(render_pass, view, desc.extent)?;
            parts.framebuffers.push(framebuffer);
        }

        parts.command_buffers = device.allocate_command_buffers(images.len() as u32)?;

        Ok(SwapchainBundle {
            swapchain,
            format: desc.format,
            present_mode: desc.present_mode,
            extent: desc.extent,
            images,
            image_views: parts.image_views.clone(),
            render_pass,
            pipeline_layout: layout,
            pipelines: parts.pipelines.clone(),
            default_key: self.shaders.default_key().to_string(),
            framebuffers: parts.framebuffers.clone(),
            command_buffers: parts.command_buffers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ColorSpace, PixelFormat};
    use crate::test_utils::{MockDevice, shader_registry};

    fn support() -> SurfaceSupport {
        SurfaceSupport {
            min_image_count: 2,
            max_image_count: 3,
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(4096, 4096),
            formats: vec![SurfaceFormat {
                format: PixelFormat::Rgba8Unorm,
                color_space: ColorSpace::SrgbNonlinear,
            }],
            present_modes: vec![PresentMode::Fifo],
        }
    }

    #[test]
    fn test_surface_format_prefers_bgra_srgb() {
        let other = SurfaceFormat {
            format: PixelFormat::Rgba8Unorm,
            color_space: ColorSpace::SrgbNonlinear,
        };
        assert_eq!(
            choose_surface_format(&[other, SurfaceFormat::PREFERRED]).unwrap(),
            SurfaceFormat::PREFERRED
        );
        assert_eq!(choose_surface_format(&[other]).unwrap(), other);

        // BGRA sRGB in a different color space is not the preferred pair
        let wrong_space = SurfaceFormat {
            format: PixelFormat::Bgra8Srgb,
            color_space: ColorSpace::Other(1_000_104_001),
        };
        assert_eq!(
            choose_surface_format(&[wrong_space, other]).unwrap(),
            wrong_space
        );
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RenderError::NoSurfaceFormats)
        ));
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let modes = [PresentMode::Fifo, PresentMode::Mailbox];
        assert_eq!(
            choose_present_mode(&modes, PresentMode::Mailbox),
            PresentMode::Mailbox
        );
        assert_eq!(
            choose_present_mode(&[PresentMode::Fifo], PresentMode::Mailbox),
            PresentMode::Fifo
        );
        assert_eq!(
            choose_present_mode(&modes, PresentMode::Immediate),
            PresentMode::Fifo
        );
    }

    #[test]
    fn test_extent_clamped_to_limits() {
        let mut s = support();
        s.min_extent = Extent2D::new(100, 100);
        s.max_extent = Extent2D::new(800, 600);
        assert_eq!(choose_extent(&s, Extent2D::new(640, 480)), Extent2D::new(640, 480));
        assert_eq!(choose_extent(&s, Extent2D::new(10, 5000)), Extent2D::new(100, 600));
    }

    #[test]
    fn test_image_count() {
        let mut s = support();
        assert_eq!(choose_image_count(&s), 3);
        s.max_image_count = 2;
        assert_eq!(choose_image_count(&s), 2);
        s.max_image_count = 0;
        s.min_image_count = 4;
        assert_eq!(choose_image_count(&s), 5);
    }

    #[test]
    fn test_resolve_pipeline_fallback() {
        let mut pipelines = HashMap::new();
        pipelines.insert("default".to_string(), 1u64);
        pipelines.insert("glow".to_string(), 2u64);

        assert_eq!(resolve_pipeline(&pipelines, "glow", "default").unwrap(), 2);
        assert_eq!(resolve_pipeline(&pipelines, "missing", "default").unwrap(), 1);

        pipelines.remove("default");
        let err = resolve_pipeline(&pipelines, "missing", "default").unwrap_err();
        assert!(matches!(err, RenderError::MissingPipeline { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_create_builds_full_bundle() {
        let mut device = MockDevice::new();
        let mut manager = SwapchainManager::new(
            shader_registry(&["default", "glow"]),
            PresentMode::Mailbox,
        );
        manager.create(&mut device, Extent2D::new(800, 600)).unwrap();

        let bundle = manager.bundle().unwrap();
        assert_eq!(bundle.format, SurfaceFormat::PREFERRED);
        assert_eq!(bundle.present_mode, PresentMode::Mailbox);
        assert_eq!(bundle.extent, Extent2D::new(800, 600));
        assert_eq!(bundle.images.len(), 3);
        assert_eq!(bundle.image_views.len(), 3);
        assert_eq!(bundle.framebuffers.len(), 3);
        assert_eq!(bundle.command_buffers.len(), 3);
        assert_eq!(bundle.pipelines.len(), 2);
        assert_eq!(bundle.default_key, "default");
        assert!(device.framebuffers_consistent());
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let mut device = MockDevice::new();
        let mut manager = SwapchainManager::new(shader_registry(&["default"]), PresentMode::Fifo);
        manager.create(&mut device, Extent2D::new(64, 64)).unwrap();
        assert!(matches!(
            manager.create(&mut device, Extent2D::new(64, 64)),
            Err(RenderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_destroy_order_and_idempotence() {
        let mut device = MockDevice::new();
        let mut manager = SwapchainManager::new(shader_registry(&["default"]), PresentMode::Fifo);

        // From Uninitialized: no-op, and create is still allowed afterwards
        manager.destroy(&mut device);
        assert!(matches!(manager.state(), SwapchainState::Uninitialized));

        manager.create(&mut device, Extent2D::new(64, 64)).unwrap();
        device.clear_log();
        manager.destroy(&mut device);
        assert!(matches!(manager.state(), SwapchainState::Destroyed));
        assert_eq!(device.live_handle_count(), 0);
        assert!(device.violations().is_empty());

        let kinds = device.destroy_kinds();
        let first = |kind: &str| kinds.iter().position(|k| *k == kind).unwrap();
        let last = |kind: &str| kinds.iter().rposition(|k| *k == kind).unwrap();
        assert!(last("framebuffer") < first("command_buffers"));
        assert!(first("command_buffers") < first("pipeline"));
        assert!(last("pipeline") < first("pipeline_layout"));
        assert!(first("pipeline_layout") < first("render_pass"));
        assert!(first("render_pass") < first("image_view"));
        assert!(last("image_view") < first("swapchain"));

        // From Destroyed: no-op
        manager.destroy(&mut device);
        assert!(matches!(
            manager.recreate(&mut device, Extent2D::new(64, 64)),
            Err(RenderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_repeated_recreate_never_dangles() {
        let mut device = MockDevice::new();
        let mut manager = SwapchainManager::new(
            shader_registry(&["default", "glow"]),
            PresentMode::Mailbox,
        );
        manager.create(&mut device, Extent2D::new(320, 240)).unwrap();

        for i in 1..=10 {
            let size = Extent2D::new(320 + i * 16, 240 + i * 8);
            assert_eq!(
                manager.recreate(&mut device, size).unwrap(),
                RecreateOutcome::Recreated
            );
            assert!(device.framebuffers_consistent());
            assert_eq!(manager.bundle().unwrap().extent, size);
        }

        assert!(device.violations().is_empty());
        assert_eq!(manager.generation(), 11);
        // one bundle's worth of objects alive: swapchain, 3 views, pass,
        // layout, 2 pipelines, 3 framebuffers, 3 command buffers
        assert_eq!(device.live_handle_count(), 14);
    }

    #[test]
    fn test_recreate_waits_idle_before_destroying() {
        let mut device = MockDevice::new();
        let mut manager = SwapchainManager::new(shader_registry(&["default"]), PresentMode::Fifo);
        manager.create(&mut device, Extent2D::new(64, 64)).unwrap();
        device.clear_log();

        manager.recreate(&mut device, Extent2D::new(128, 64)).unwrap();
        let log = device.log();
        let idle = log.iter().position(|&c| c == "wait_idle").unwrap();
        let first_destroy = log.iter().position(|c| c.starts_with("destroy_")).unwrap();
        assert!(idle < first_destroy);
    }

    #[test]
    fn test_recreate_deferred_while_zero_sized() {
        let mut device = MockDevice::new();
        let mut manager = SwapchainManager::new(shader_registry(&["default"]), PresentMode::Fifo);
        manager.create(&mut device, Extent2D::new(64, 64)).unwrap();
        device.clear_log();

        assert_eq!(
            manager.recreate(&mut device, Extent2D::new(0, 64)).unwrap(),
            RecreateOutcome::Deferred
        );
        assert!(device.log().is_empty());
        assert_eq!(manager.bundle().unwrap().extent, Extent2D::new(64, 64));
    }

    #[test]
    fn test_failed_create_unwinds_partial_bundle() {
        let mut device = MockDevice::new();
        device.fail_on("create_framebuffer");
        let mut manager = SwapchainManager::new(shader_registry(&["default"]), PresentMode::Fifo);

        let err = manager
            .create(&mut device, Extent2D::new(64, 64))
            .unwrap_err();
        assert!(matches!(err, RenderError::Gpu { .. }));
        assert!(matches!(manager.state(), SwapchainState::Uninitialized));
        assert_eq!(device.live_handle_count(), 0);
        assert!(device.violations().is_empty());
    }

    #[test]
    fn test_shader_swap_applies_on_recreate() {
        let mut device = MockDevice::new();
        let mut manager = SwapchainManager::new(shader_registry(&["default"]), PresentMode::Fifo);
        manager.create(&mut device, Extent2D::new(64, 64)).unwrap();

        manager.set_shaders(shader_registry(&["a", "b", "c"]));
        assert_eq!(manager.bundle().unwrap().pipelines.len(), 1);

        manager.recreate(&mut device, Extent2D::new(64, 64)).unwrap();
        let bundle = manager.bundle().unwrap();
        assert_eq!(bundle.pipelines.len(), 3);
        assert_eq!(bundle.default_key, "a");
    }
}
