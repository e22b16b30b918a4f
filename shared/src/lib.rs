//! Shared types for vkscene.
//!
//! Everything here is plain data: vertex and push-constant layouts that are
//! uploaded to the GPU as-is, overlay draw commands, and camera math in the
//! Vulkan clip-space convention.

pub mod gui;
pub mod math;
pub mod vertex;

pub use gui::{GuiColor, GuiCommand, GuiRect};
pub use vertex::{PushConstants, Vertex};
