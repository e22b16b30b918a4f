//! vkscene core
//!
//! Platform-free engine pieces shared by every front end:
//!
//! - [`audio`]: the voice mixer and the output bridge that drives it from a
//!   device callback thread
//! - [`render`]: the swapchain bundle state machine and the per-frame
//!   orchestrator, written against the [`render::GpuDevice`] trait
//! - [`scene`]: the scene host interface, the declarative scene file host,
//!   and the uploaded scene data cache
//! - [`overlay`]: the CPU overlay compositor blitted on top of each frame
//!
//! Windowing, the Vulkan device, and the audio device live in the player.

pub mod audio;
pub mod config;
pub mod error;
pub mod overlay;
pub mod render;
pub mod scene;
pub mod trace;

#[cfg(test)]
pub mod test_utils;

pub use error::{AudioError, RenderError, SceneError};

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
