//! Vulkan backend for the frame orchestrator
//!
//! - [`VulkanContext`]: instance, surface, device, queue and command pool
//! - [`VulkanDevice`]: the `GpuDevice` implementation the engine renders with

mod buffer;
mod context;
mod device;
mod pipeline;

pub use context::VulkanContext;
pub use device::VulkanDevice;
