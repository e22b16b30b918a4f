//! Uploaded scene geometry and draw descriptors
//!
//! All objects share one vertex buffer and one index buffer. Indices stay
//! local to their object; each draw rebases them with its vertex offset.

use tracing::{debug, warn};
use vkscene_shared::Vertex;

use super::{SceneObject, ShaderRegistry, TransformHandle};
use crate::error::{RenderError, SceneError};
use crate::render::{BufferUsage, GpuDevice};

/// Draw call for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderObject {
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
    pub transform: Option<TransformHandle>,
    pub shader_key: String,
}

/// Aggregated CPU-side geometry, before upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub objects: Vec<RenderObject>,
}

impl SceneGeometry {
    /// Concatenate host objects into shared arrays.
    pub fn aggregate(objects: Vec<SceneObject>) -> Result<Self, SceneError> {
        if objects.is_empty() {
            return Err(SceneError::EmptyScene);
        }

        let mut geometry = Self::default();
        for (i, object) in objects.into_iter().enumerate() {
            if let Some(&index) = object
                .indices
                .iter()
                .find(|&&index| usize::from(index) >= object.vertices.len())
            {
                return Err(SceneError::IndexOutOfRange {
                    object: i,
                    index,
                    vertex_count: object.vertices.len(),
                });
            }

            let vertex_offset =
                i32::try_from(geometry.vertices.len()).map_err(|_| SceneError::TooLarge {
                    what: "vertices",
                    limit: i32::MAX as usize,
                })?;
            let index_offset =
                u32::try_from(geometry.indices.len()).map_err(|_| SceneError::TooLarge {
                    what: "indices",
                    limit: u32::MAX as usize,
                })?;

            geometry.objects.push(RenderObject {
                index_offset,
                index_count: object.indices.len() as u32,
                vertex_offset,
                transform: object.transform,
                shader_key: object.shader_key,
            });
            geometry.vertices.extend_from_slice(&object.vertices);
            geometry.indices.extend_from_slice(&object.indices);
        }

        if geometry.vertices.is_empty() || geometry.indices.is_empty() {
            return Err(SceneError::EmptyGeometry);
        }
        Ok(geometry)
    }

    /// Warn about objects whose shader key will fall back to the default.
    pub fn check_shader_keys(&self, shaders: &ShaderRegistry) {
        for object in &self.objects {
            if !shaders.contains(&object.shader_key) {
                warn!(
                    "Shader key '{}' not found, using '{}'",
                    object.shader_key,
                    shaders.default_key()
                );
            }
        }
    }
}

/// Scene geometry resident in GPU buffers.
pub struct SceneCache<D: GpuDevice> {
    pub vertex_buffer: D::Buffer,
    pub index_buffer: D::Buffer,
    pub objects: Vec<RenderObject>,
}

impl<D: GpuDevice> SceneCache<D> {
    /// Upload aggregated geometry into host-visible buffers.
    pub fn upload(device: &mut D, geometry: SceneGeometry) -> Result<Self, RenderError> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&geometry.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&geometry.indices);

        let vertex_buffer = device.create_buffer(BufferUsage::Vertex, vertex_bytes.len() as u64)?;
        let index_buffer = match device.create_buffer(BufferUsage::Index, index_bytes.len() as u64)
        {
            Ok(buffer) => buffer,
            Err(e) => {
                device.destroy_buffer(vertex_buffer);
                return Err(e);
            }
        };

        let written = device
            .write_buffer(vertex_buffer, 0, vertex_bytes)
            .and_then(|()| device.write_buffer(index_buffer, 0, index_bytes));
        if let Err(e) = written {
            device.destroy_buffer(index_buffer);
            device.destroy_buffer(vertex_buffer);
            return Err(e);
        }

        debug!(
            "Scene uploaded: {} objects, {} vertices, {} indices",
            geometry.objects.len(),
            geometry.vertices.len(),
            geometry.indices.len()
        );
        Ok(Self {
            vertex_buffer,
            index_buffer,
            objects: geometry.objects,
        })
    }

    pub fn destroy(self, device: &mut D) {
        device.destroy_buffer(self.index_buffer);
        device.destroy_buffer(self.vertex_buffer);
    }
}
