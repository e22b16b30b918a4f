//! Camera math in the Vulkan convention
//!
//! Right-handed view space, depth mapped to `[0, 1]`, and clip-space Y
//! pointing down. `glam` builds the GL-style right-handed matrices; the
//! projection's Y scale is negated here so geometry is not drawn upside down.

use glam::{Mat4, Vec3};

/// Right-handed look-at view matrix.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, target, up)
}

/// Perspective projection for Vulkan clip space.
///
/// `fov_y` is in radians. Near maps to depth 0 and far maps to depth 1.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y, aspect, near, far);
    proj.y_axis.y = -proj.y_axis.y;
    proj
}

/// Combined view-projection for a camera.
pub fn view_projection(
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    perspective(fov_y, aspect, near, far) * look_at(eye, target, up)
}
