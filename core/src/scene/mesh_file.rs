//! glTF/GLB mesh import for scene objects

use std::path::Path;

use tracing::debug;
use vkscene_shared::Vertex;

use crate::error::SceneError;

/// Color used when a primitive has neither vertex colors nor a material.
const DEFAULT_COLOR: [f32; 3] = [0.6, 0.8, 1.0];

/// Vertices addressable by a 16-bit index buffer.
const MAX_VERTICES: usize = u16::MAX as usize + 1;

/// Load the first primitive of the first mesh in a glTF or GLB file.
///
/// Colors come from `COLOR_0` when present, else from the material's base
/// color. Non-indexed primitives get sequential indices.
pub(super) fn load_mesh_file(path: &Path) -> Result<(Vec<Vertex>, Vec<u16>), SceneError> {
    let invalid = |reason| SceneError::InvalidMesh {
        path: path.to_path_buf(),
        reason,
    };

    let (document, buffers, _images) = gltf::import(path).map_err(|source| SceneError::Mesh {
        path: path.to_path_buf(),
        source,
    })?;

    let mesh = document.meshes().next().ok_or_else(|| invalid("no meshes"))?;
    let primitive = mesh
        .primitives()
        .find(|p| p.mode() == gltf::mesh::Mode::Triangles)
        .ok_or_else(|| invalid("no triangle primitives"))?;

    let reader =
        primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| invalid("no vertex positions"))?
        .collect();
    if positions.is_empty() {
        return Err(invalid("no vertex positions"));
    }
    if positions.len() > MAX_VERTICES {
        return Err(SceneError::TooLarge {
            what: "mesh vertices",
            limit: MAX_VERTICES,
        });
    }

    let material = primitive.material();
    let base_color = match material.index() {
        Some(_) => {
            let [r, g, b, _] = material.pbr_metallic_roughness().base_color_factor();
            [r, g, b]
        }
        None => DEFAULT_COLOR,
    };
    let colors: Option<Vec<[f32; 3]>> = reader
        .read_colors(0)
        .map(|iter| iter.into_rgb_f32().collect());

    let vertices: Vec<Vertex> = positions
        .iter()
        .enumerate()
        .map(|(i, &position)| {
            let color = colors
                .as_ref()
                .and_then(|c| c.get(i).copied())
                .unwrap_or(base_color);
            Vertex::new(position, color)
        })
        .collect();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(iter) => iter.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if indices.len() < 3 {
        return Err(invalid("no triangle faces"));
    }
    let indices = narrow_indices(&indices)?;

    debug!(
        "Imported {}: {} vertices, {} indices",
        path.display(),
        vertices.len(),
        indices.len()
    );
    Ok((vertices, indices))
}

/// Narrow 32-bit indices to the 16-bit index buffer format.
fn narrow_indices(indices: &[u32]) -> Result<Vec<u16>, SceneError> {
    indices
        .iter()
        .map(|&i| {
            u16::try_from(i).map_err(|_| SceneError::TooLarge {
                what: "mesh index values",
                limit: u16::MAX as usize,
            })
        })
        .collect()
}
