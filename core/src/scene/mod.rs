//! Scene data pulled from the scene host
//!
//! The host supplies geometry, shader paths, the camera and per-object
//! transforms through [`SceneHost`]. The engine never interprets transform
//! handles; it only hands them back to the host each frame.

mod cache;
mod declarative;
mod mesh_file;

use std::collections::BTreeMap;
use std::path::PathBuf;

use glam::Mat4;
use serde::{Deserialize, Serialize};
use vkscene_shared::{GuiCommand, Vertex};

use crate::error::SceneError;

pub use cache::{RenderObject, SceneCache, SceneGeometry};
pub use declarative::{AudioCues, DeclarativeScene};

/// Opaque per-object transform reference, resolved by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformHandle(pub u32);

/// Compiled SPIR-V stages for one shader variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

/// One object as supplied by the host. Indices are local to `vertices`.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub shader_key: String,
    pub transform: Option<TransformHandle>,
}

/// Data-pull interface to the scene host.
///
/// Calls are synchronous and happen on the render thread. The host must not
/// block; if it does, rendering blocks with it.
pub trait SceneHost {
    /// Geometry for every object. Pulled on load and on reload.
    fn load_scene_objects(&self) -> Result<Vec<SceneObject>, SceneError>;

    /// Shader variants by key. Must not be empty.
    fn load_shader_paths(&self) -> Result<BTreeMap<String, ShaderPaths>, SceneError>;

    /// Camera view-projection for the given width/height ratio.
    fn view_projection(&self, aspect: f32) -> Mat4;

    /// Model matrix for an object at `time` seconds. `None` is identity.
    fn model_matrix(&self, handle: Option<TransformHandle>, time: f32) -> Mat4;

    /// Overlay draw commands for this frame.
    fn gui_commands(&self) -> Vec<GuiCommand> {
        Vec::new()
    }
}

/// Shader map plus the key used when an object's key is unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderRegistry {
    shaders: BTreeMap<String, ShaderPaths>,
    default_key: String,
}

impl ShaderRegistry {
    /// Name of the variant used as the fallback when present.
    pub const DEFAULT_KEY: &'static str = "default";

    /// Build from a host shader map.
    ///
    /// The default key is `"default"` when present, otherwise the first key
    /// in sorted order.
    pub fn new(shaders: BTreeMap<String, ShaderPaths>) -> Result<Self, SceneError> {
        let default_key = if shaders.contains_key(Self::DEFAULT_KEY) {
            Self::DEFAULT_KEY.to_string()
        } else {
            shaders
                .keys()
                .next()
                .cloned()
                .ok_or(SceneError::EmptyShaderMap)?
        };
        Ok(Self {
            shaders,
            default_key,
        })
    }

    pub fn load(host: &dyn SceneHost) -> Result<Self, SceneError> {
        Self::new(host.load_shader_paths()?)
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shaders.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ShaderPaths)> {
        self.shaders.iter().map(|(k, v)| (k.as_str(), v))
    }
}
