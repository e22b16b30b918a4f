//! GPU vertex and push-constant layouts.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use serde::{Deserialize, Serialize};

/// Interleaved vertex: position then color, both `vec3`.
///
/// Memory layout (24 bytes): `position` at offset 0, `color` at offset 12.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    /// Size of one vertex in bytes (binding stride)
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
    /// Byte offset of the position attribute (location 0)
    pub const POSITION_OFFSET: u32 = 0;
    /// Byte offset of the color attribute (location 1)
    pub const COLOR_OFFSET: u32 = 12;

    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// Per-draw constant block pushed to the vertex stage.
///
/// Both matrices are column-major, matching GLSL `mat4`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub model: [f32; 16],
    pub view_proj: [f32; 16],
}

const _: () = assert!(std::mem::size_of::<PushConstants>() == 128);
const _: () = assert!(std::mem::size_of::<Vertex>() == 24);

impl PushConstants {
    /// Size of the block in bytes (push constant range)
    pub const SIZE: u32 = std::mem::size_of::<PushConstants>() as u32;

    pub fn new(model: Mat4, view_proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array(),
            view_proj: view_proj.to_cols_array(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
