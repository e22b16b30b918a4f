//! [`GpuDevice`] over Vulkan

use anyhow::Result;
use ash::vk;
use hashbrown::HashMap;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use vkscene_core::RenderError;
use vkscene_core::render::{
    AcquireOutcome, BufferUsage, ColorSpace, Extent2D, GpuDevice, ImageRegion, PixelFormat,
    PresentMode, PresentOutcome, SurfaceFormat, SurfaceSupport, SwapchainDesc,
};
use vkscene_core::scene::ShaderPaths;
use vkscene_shared::PushConstants;

use super::buffer::HostBuffer;
use super::context::VulkanContext;
use super::pipeline;

pub fn pixel_format(format: vk::Format) -> PixelFormat {
    match format {
        vk::Format::B8G8R8A8_SRGB => PixelFormat::Bgra8Srgb,
        vk::Format::B8G8R8A8_UNORM => PixelFormat::Bgra8Unorm,
        vk::Format::R8G8B8A8_SRGB => PixelFormat::Rgba8Srgb,
        vk::Format::R8G8B8A8_UNORM => PixelFormat::Rgba8Unorm,
        other => PixelFormat::Other(other.as_raw()),
    }
}

pub fn vk_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        PixelFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        PixelFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Other(raw) => vk::Format::from_raw(raw),
    }
}

pub fn color_space(space: vk::ColorSpaceKHR) -> ColorSpace {
    match space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
        other => ColorSpace::Other(other.as_raw()),
    }
}

pub fn vk_color_space(space: ColorSpace) -> vk::ColorSpaceKHR {
    match space {
        ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::Other(raw) => vk::ColorSpaceKHR::from_raw(raw),
    }
}

pub fn present_mode(mode: vk::PresentModeKHR) -> PresentMode {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => PresentMode::Immediate,
        vk::PresentModeKHR::MAILBOX => PresentMode::Mailbox,
        vk::PresentModeKHR::FIFO => PresentMode::Fifo,
        vk::PresentModeKHR::FIFO_RELAXED => PresentMode::FifoRelaxed,
        other => PresentMode::Other(other.as_raw()),
    }
}

pub fn vk_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentMode::Other(raw) => vk::PresentModeKHR::from_raw(raw),
    }
}

fn vk_extent(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

fn color_subresource() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// The Vulkan device used by the frame orchestrator.
pub struct VulkanDevice {
    buffers: HashMap<vk::Buffer, HostBuffer>,
    // dropped last
    ctx: VulkanContext,
}

impl VulkanDevice {
    pub fn new<W>(window: &W, validation: bool) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        Ok(Self {
            buffers: HashMap::new(),
            ctx: VulkanContext::new(window, validation)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.ctx.device_name
    }

    fn device(&self) -> &ash::Device {
        &self.ctx.device
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            tracing::warn!("{} buffers still alive at device teardown", self.buffers.len());
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy(&self.ctx.device);
        }
    }
}

impl GpuDevice for VulkanDevice {
    type Swapchain = vk::SwapchainKHR;
    type Image = vk::Image;
    type ImageView = vk::ImageView;
    type RenderPass = vk::RenderPass;
    type PipelineLayout = vk::PipelineLayout;
    type Pipeline = vk::Pipeline;
    type Framebuffer = vk::Framebuffer;
    type CommandBuffer = vk::CommandBuffer;
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type Buffer = vk::Buffer;

    fn surface_support(&mut self) -> Result<SurfaceSupport, RenderError> {
        let ctx = &self.ctx;
        let (caps, formats, modes) = unsafe {
            let caps = ctx
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
                .map_err(|e| RenderError::gpu("get_surface_capabilities", e))?;
            let formats = ctx
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, ctx.surface)
                .map_err(|e| RenderError::gpu("get_surface_formats", e))?;
            let modes = ctx
                .surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, ctx.surface)
                .map_err(|e| RenderError::gpu("get_surface_present_modes", e))?;
            (caps, formats, modes)
        };

        // A defined, nonzero current extent is the only size the surface accepts
        let current = caps.current_extent;
        let (min_extent, max_extent) =
            if current.width != u32::MAX && current.width != 0 && current.height != 0 {
                (current, current)
            } else {
                (caps.min_image_extent, caps.max_image_extent)
            };

        Ok(SurfaceSupport {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            min_extent: Extent2D::new(min_extent.width, min_extent.height),
            max_extent: Extent2D::new(max_extent.width, max_extent.height),
            formats: formats
                .iter()
                .map(|f| SurfaceFormat {
                    format: pixel_format(f.format),
                    color_space: color_space(f.color_space),
                })
                .collect(),
            present_modes: modes.into_iter().map(present_mode).collect(),
        })
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR, RenderError> {
        let ctx = &self.ctx;
        let caps = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
        }
        .map_err(|e| RenderError::gpu("get_surface_capabilities", e))?;
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(ctx.surface)
            .min_image_count(desc.image_count)
            .image_format(vk_format(desc.format.format))
            .image_color_space(vk_color_space(desc.format.color_space))
            .image_extent(vk_extent(desc.extent))
            .image_array_layers(1)
            // transfer destination for the overlay copy
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk_present_mode(desc.present_mode))
            .clipped(true);

        unsafe { ctx.swapchain_loader.create_swapchain(&info, None) }
            .map_err(|e| RenderError::gpu("create_swapchain", e))
    }

    fn swapchain_images(
        &mut self,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>, RenderError> {
        unsafe { self.ctx.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| RenderError::gpu("get_swapchain_images", e))
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        unsafe { self.ctx.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: PixelFormat,
    ) -> Result<vk::ImageView, RenderError> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(vk_format(format))
            .subresource_range(color_subresource());
        unsafe { self.device().create_image_view(&info, None) }
            .map_err(|e| RenderError::gpu("create_image_view", e))
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        unsafe { self.device().destroy_image_view(view, None) };
    }

    fn create_render_pass(&mut self, format: PixelFormat) -> Result<vk::RenderPass, RenderError> {
        pipeline::create_render_pass(self.device(), vk_format(format))
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        unsafe { self.device().destroy_render_pass(render_pass, None) };
    }

    fn create_pipeline_layout(&mut self) -> Result<vk::PipelineLayout, RenderError> {
        pipeline::create_pipeline_layout(self.device())
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        unsafe { self.device().destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(
        &mut self,
        shaders: &ShaderPaths,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        extent: Extent2D,
    ) -> Result<vk::Pipeline, RenderError> {
        pipeline::create_graphics_pipeline(self.device(), shaders, render_pass, layout, extent)
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe { self.device().destroy_pipeline(pipeline, None) };
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: Extent2D,
    ) -> Result<vk::Framebuffer, RenderError> {
        let attachments = [view];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.device().create_framebuffer(&info, None) }
            .map_err(|e| RenderError::gpu("create_framebuffer", e))
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        unsafe { self.device().destroy_framebuffer(framebuffer, None) };
    }

    fn allocate_command_buffers(
        &mut self,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, RenderError> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.ctx.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device().allocate_command_buffers(&info) }
            .map_err(|e| RenderError::gpu("allocate_command_buffers", e))
    }

    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.ctx
                .device
                .free_command_buffers(self.ctx.command_pool, buffers)
        };
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence, RenderError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device().create_fence(&info, None) }
            .map_err(|e| RenderError::gpu("create_fence", e))
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device().destroy_fence(fence, None) };
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore, RenderError> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device().create_semaphore(&info, None) }
            .map_err(|e| RenderError::gpu("create_semaphore", e))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device().destroy_semaphore(semaphore, None) };
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<(), RenderError> {
        unsafe { self.device().wait_for_fences(&[fence], true, u64::MAX) }
            .map_err(|e| RenderError::gpu("wait_for_fences", e))
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<(), RenderError> {
        unsafe { self.device().reset_fences(&[fence]) }
            .map_err(|e| RenderError::gpu("reset_fences", e))
    }

    fn wait_idle(&mut self) -> Result<(), RenderError> {
        unsafe { self.device().device_wait_idle() }
            .map_err(|e| RenderError::gpu("device_wait_idle", e))
    }

    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> Result<vk::Buffer, RenderError> {
        let buffer = HostBuffer::create(
            &self.ctx.device,
            &self.ctx.memory_properties,
            usage,
            size,
        )?;
        self.buffers.insert(buffer.buffer, buffer);
        Ok(buffer.buffer)
    }

    fn write_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), RenderError> {
        let Some(host) = self.buffers.get(&buffer) else {
            return Err(RenderError::gpu("write_buffer", "unknown buffer"));
        };
        host.write(&self.ctx.device, offset, bytes)
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        if let Some(host) = self.buffers.remove(&buffer) {
            host.destroy(&self.ctx.device);
        }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome, RenderError> {
        let result = unsafe {
            self.ctx
                .swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RenderError::gpu("acquire_next_image", e)),
        }
    }

    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), RenderError> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [signal];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device()
                .queue_submit(self.ctx.queue, std::slice::from_ref(&submit), fence)
        }
        .map_err(|e| RenderError::gpu("queue_submit", e))
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome, RenderError> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.ctx.swapchain_loader.queue_present(self.ctx.queue, &info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(RenderError::gpu("queue_present", e)),
        }
    }

    fn reset_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<(), RenderError> {
        unsafe {
            self.device()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| RenderError::gpu("reset_command_buffer", e))
    }

    fn begin_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<(), RenderError> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device().begin_command_buffer(cmd, &info) }
            .map_err(|e| RenderError::gpu("begin_command_buffer", e))
    }

    fn end_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<(), RenderError> {
        unsafe { self.device().end_command_buffer(cmd) }
            .map_err(|e| RenderError::gpu("end_command_buffer", e))
    }

    fn cmd_begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk_extent(extent),
            })
            .clear_values(&clear_values);
        unsafe {
            self.device()
                .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        };
    }

    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        unsafe { self.device().cmd_end_render_pass(cmd) };
    }

    fn cmd_bind_geometry(&mut self, cmd: vk::CommandBuffer, vertices: vk::Buffer, indices: vk::Buffer) {
        unsafe {
            self.device().cmd_bind_vertex_buffers(cmd, 0, &[vertices], &[0]);
            self.device()
                .cmd_bind_index_buffer(cmd, indices, 0, vk::IndexType::UINT16);
        }
    }

    fn cmd_bind_pipeline(&mut self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn cmd_push_constants(
        &mut self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        constants: &PushConstants,
    ) {
        unsafe {
            self.device().cmd_push_constants(
                cmd,
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                constants.as_bytes(),
            )
        };
    }

    fn cmd_draw_indexed(
        &mut self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) {
        unsafe {
            self.device()
                .cmd_draw_indexed(cmd, index_count, 1, first_index, vertex_offset, 0)
        };
    }

    fn cmd_blit_to_image(
        &mut self,
        cmd: vk::CommandBuffer,
        staging: vk::Buffer,
        image: vk::Image,
        image_extent: Extent2D,
        region: ImageRegion,
    ) {
        let to_transfer = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource());

        let copy = vk::BufferImageCopy {
            buffer_offset: (u64::from(region.y) * u64::from(image_extent.width)
                + u64::from(region.x))
                * 4,
            buffer_row_length: image_extent.width,
            buffer_image_height: image_extent.height,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D {
                x: region.x as i32,
                y: region.y as i32,
                z: 0,
            },
            image_extent: vk::Extent3D {
                width: region.width,
                height: region.height,
                depth: 1,
            },
        };

        let to_present = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource());

        let device = self.device();
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );
            device.cmd_copy_buffer_to_image(
                cmd,
                staging,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_present],
            );
        }
    }
}
