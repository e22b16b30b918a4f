//! vkscene player
//!
//! Desktop front end for the core engine: a winit window, an ash-backed
//! [`vulkan::VulkanDevice`], and a cpal-backed [`audio::CpalBackend`].

pub mod app;
pub mod audio;
pub mod report;
pub mod vulkan;
