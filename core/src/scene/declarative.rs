//! TOML scene files
//!
//! A scene file describes the camera, the shader table, the objects with
//! their motion, the overlay, and the audio cues:
//!
//! ```toml
//! [camera]
//! eye = [2.0, 2.0, 2.0]
//!
//! [shaders.default]
//! vertex = "shaders/cube.vert.spv"
//! fragment = "shaders/cube.frag.spv"
//!
//! [[objects]]
//! mesh = { kind = "cube", size = 1.0 }
//! transform = { kind = "spin", axis = [0.0, 1.0, 0.0], speed = 1.0 }
//!
//! [[objects]]
//! mesh = { kind = "file", path = "meshes/ship.glb" }
//!
//! [audio]
//! background = "audio/loop.ogg"
//! effects = ["audio/click.wav"]
//! ```
//!
//! Relative paths are resolved against the scene file's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use serde::Deserialize;
use tracing::info;
use vkscene_shared::math::view_projection;
use vkscene_shared::{GuiCommand, Vertex};

use super::mesh_file::load_mesh_file;
use super::{SceneHost, SceneObject, ShaderPaths, TransformHandle};
use crate::error::SceneError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
struct CameraDesc {
    eye: [f32; 3],
    target: [f32; 3],
    up: [f32; 3],
    fov_degrees: f32,
    near: f32,
    far: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            eye: [2.0, 2.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fov_degrees: 45.0,
            near: 0.1,
            far: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum MeshDesc {
    Cube {
        #[serde(default = "default_size")]
        size: f32,
    },
    Triangle,
    Custom {
        vertices: Vec<Vertex>,
        indices: Vec<u16>,
    },
    /// First triangle primitive of a glTF or GLB file
    File { path: PathBuf },
}

fn default_size() -> f32 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TransformDesc {
    #[default]
    Static,
    /// Rotation about `axis` at `speed` radians per second
    Spin {
        #[serde(default = "default_axis")]
        axis: [f32; 3],
        #[serde(default = "default_speed")]
        speed: f32,
    },
    /// Vertical sine motion
    Bob {
        #[serde(default = "default_amplitude")]
        amplitude: f32,
        #[serde(default = "default_speed")]
        frequency: f32,
    },
}

fn default_axis() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

fn default_speed() -> f32 {
    1.0
}

fn default_amplitude() -> f32 {
    0.25
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ObjectDesc {
    #[serde(default = "default_shader")]
    shader: String,
    mesh: MeshDesc,
    #[serde(default)]
    transform: TransformDesc,
    #[serde(default)]
    position: [f32; 3],
}

fn default_shader() -> String {
    super::ShaderRegistry::DEFAULT_KEY.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
struct AudioDesc {
    background: Option<PathBuf>,
    #[serde(rename = "loop")]
    looping: bool,
    effects: Vec<PathBuf>,
}

impl Default for AudioDesc {
    fn default() -> Self {
        Self {
            background: None,
            looping: true,
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct SceneFile {
    camera: CameraDesc,
    shaders: BTreeMap<String, ShaderPaths>,
    objects: Vec<ObjectDesc>,
    overlay: Vec<GuiCommand>,
    audio: AudioDesc,
}

/// Audio files named by a scene, with resolved paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioCues {
    pub background: Option<PathBuf>,
    pub looping: bool,
    /// Triggered by the number keys, in order
    pub effects: Vec<PathBuf>,
}

/// Scene host backed by a TOML file.
///
/// Transform handles are object indices; each object's motion is evaluated
/// from its description when the engine asks for its model matrix.
#[derive(Debug, Clone)]
pub struct DeclarativeScene {
    path: PathBuf,
    file: SceneFile,
}

impl DeclarativeScene {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path).map_err(|source| SceneError::Io {
            path: path.clone(),
            source,
        })?;
        let scene = Self::parse(&text, path)?;
        info!(
            "Loaded scene {}: {} objects, {} shaders",
            scene.path.display(),
            scene.file.objects.len(),
            scene.file.shaders.len()
        );
        Ok(scene)
    }

    /// Parse scene text. Relative paths resolve against `path`'s directory.
    pub fn parse(text: &str, path: PathBuf) -> Result<Self, SceneError> {
        let mut file: SceneFile = toml::from_str(text).map_err(|e| SceneError::Parse {
            path: path.clone(),
            source: Box::new(e),
        })?;

        let base = path.parent().unwrap_or(Path::new("")).to_path_buf();
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for shader in file.shaders.values_mut() {
            resolve(&mut shader.vertex);
            resolve(&mut shader.fragment);
        }
        if let Some(background) = file.audio.background.as_mut() {
            resolve(background);
        }
        file.audio.effects.iter_mut().for_each(resolve);
        for object in &mut file.objects {
            if let MeshDesc::File { path } = &mut object.mesh {
                resolve(path);
            }
        }

        Ok(Self { path, file })
    }

    /// Re-read the scene file. The current scene is kept on error.
    pub fn reload(&mut self) -> Result<(), SceneError> {
        *self = Self::load(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audio_cues(&self) -> AudioCues {
        AudioCues {
            background: self.file.audio.background.clone(),
            looping: self.file.audio.looping,
            effects: self.file.audio.effects.clone(),
        }
    }
}

impl SceneHost for DeclarativeScene {
    fn load_scene_objects(&self) -> Result<Vec<SceneObject>, SceneError> {
        self.file
            .objects
            .iter()
            .enumerate()
            .map(|(i, object)| {
                let (vertices, indices) = mesh_geometry(&object.mesh)?;
                Ok(SceneObject {
                    vertices,
                    indices,
                    shader_key: object.shader.clone(),
                    transform: Some(TransformHandle(i as u32)),
                })
            })
            .collect()
    }

    fn load_shader_paths(&self) -> Result<BTreeMap<String, ShaderPaths>, SceneError> {
        if self.file.shaders.is_empty() {
            return Err(SceneError::EmptyShaderMap);
        }
        Ok(self.file.shaders.clone())
    }

    fn view_projection(&self, aspect: f32) -> Mat4 {
        let camera = &self.file.camera;
        view_projection(
            Vec3::from(camera.eye),
            Vec3::from(camera.target),
            Vec3::from(camera.up),
            camera.fov_degrees.to_radians(),
            aspect,
            camera.near,
            camera.far,
        )
    }

    fn model_matrix(&self, handle: Option<TransformHandle>, time: f32) -> Mat4 {
        let Some(object) = handle.and_then(|TransformHandle(i)| self.file.objects.get(i as usize))
        else {
            return Mat4::IDENTITY;
        };
        let translation = Mat4::from_translation(Vec3::from(object.position));
        match object.transform {
            TransformDesc::Static => translation,
            TransformDesc::Spin { axis, speed } => {
                let axis = Vec3::from(axis).try_normalize().unwrap_or(Vec3::Y);
                translation * Mat4::from_axis_angle(axis, speed * time)
            }
            TransformDesc::Bob {
                amplitude,
                frequency,
            } => {
                let offset = amplitude * (std::f32::consts::TAU * frequency * time).sin();
                translation * Mat4::from_translation(Vec3::new(0.0, offset, 0.0))
            }
        }
    }

    fn gui_commands(&self) -> Vec<GuiCommand> {
        self.file.overlay.clone()
    }
}

fn mesh_geometry(mesh: &MeshDesc) -> Result<(Vec<Vertex>, Vec<u16>), SceneError> {
    let geometry = match mesh {
        MeshDesc::Cube { size } => cube(*size),
        MeshDesc::Triangle => (
            vec![
                Vertex::new([0.0, -0.5, 0.0], [1.0, 0.0, 0.0]),
                Vertex::new([0.5, 0.5, 0.0], [0.0, 1.0, 0.0]),
                Vertex::new([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
            ],
            vec![0, 1, 2],
        ),
        MeshDesc::Custom { vertices, indices } => (vertices.clone(), indices.clone()),
        MeshDesc::File { path } => return load_mesh_file(path),
    };
    Ok(geometry)
}

/// Axis-aligned cube centered on the origin, one color per corner.
fn cube(size: f32) -> (Vec<Vertex>, Vec<u16>) {
    let h = size * 0.5;
    let vertices = vec![
        Vertex::new([-h, -h, -h], [1.0, 0.0, 0.0]),
        Vertex::new([h, -h, -h], [0.0, 1.0, 0.0]),
        Vertex::new([h, h, -h], [0.0, 0.0, 1.0]),
        Vertex::new([-h, h, -h], [1.0, 1.0, 0.0]),
        Vertex::new([-h, -h, h], [1.0, 0.0, 1.0]),
        Vertex::new([h, -h, h], [0.0, 1.0, 1.0]),
        Vertex::new([h, h, h], [1.0, 1.0, 1.0]),
        Vertex::new([-h, h, h], [0.2, 0.2, 0.2]),
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 1, 2, 2, 3, 0, // back
        4, 6, 5, 6, 4, 7, // front
        0, 3, 7, 7, 4, 0, // left
        1, 5, 6, 6, 2, 1, // right
        3, 2, 6, 6, 7, 3, // top
        0, 4, 5, 5, 1, 0, // bottom
    ];
    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneGeometry, ShaderRegistry};
    use vkscene_shared::{GuiColor, GuiRect};

    const SCENE: &str = r#"
[camera]
eye = [0.0, 0.0, 5.0]
fov_degrees = 60.0

[shaders.default]
vertex = "shaders/cube.vert.spv"
fragment = "shaders/cube.frag.spv"

[shaders.glow]
vertex = "/abs/glow.vert.spv"
fragment = "shaders/glow.frag.spv"

[[objects]]
mesh = { kind = "cube", size = 2.0 }
transform = { kind = "spin", speed = 2.0 }

[[objects]]
shader = "glow"
mesh = { kind = "triangle" }
position = [1.0, 0.0, 0.0]

[[objects]]
shader = "missing"
transform = { kind = "bob", amplitude = 0.5, frequency = 1.0 }

[objects.mesh]
kind = "custom"
indices = [0, 1, 2]
vertices = [
    { position = [0.0, 0.0, 0.0], color = [1.0, 1.0, 1.0] },
    { position = [1.0, 0.0, 0.0], color = [1.0, 1.0, 1.0] },
    { position = [0.0, 1.0, 0.0], color = [1.0, 1.0, 1.0] },
]

[[overlay]]
kind = "rect"
rect = { x = 8.0, y = 8.0, width = 120.0, height = 24.0 }
fill = { r = 0, g = 0, b = 0, a = 160 }

[audio]
background = "audio/music.wav"
effects = ["audio/click.wav", "/sfx/boom.wav"]
"#;

    fn scene() -> DeclarativeScene {
        DeclarativeScene::parse(SCENE, PathBuf::from("/scenes/demo.toml")).unwrap()
    }

    fn approx(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn test_objects_and_meshes() {
        let scene = scene();
        let objects = scene.load_scene_objects().unwrap();
        assert_eq!(objects.len(), 3);

        assert_eq!(objects[0].vertices.len(), 8);
        assert_eq!(objects[0].indices.len(), 36);
        assert_eq!(objects[0].shader_key, "default");
        assert_eq!(objects[0].vertices[6].position, [1.0, 1.0, 1.0]);
        assert_eq!(objects[1].shader_key, "glow");
        assert_eq!(objects[2].transform, Some(TransformHandle(2)));

        // the whole scene aggregates cleanly
        let geometry = SceneGeometry::aggregate(objects).unwrap();
        assert_eq!(geometry.vertices.len(), 14);
    }

    #[test]
    fn test_bundled_scene_parses() {
        let text = include_str!("../../../scenes/cube.toml");
        let scene = DeclarativeScene::parse(text, PathBuf::from("/game/scenes/cube.toml")).unwrap();
        assert_eq!(scene.load_scene_objects().unwrap().len(), 2);
        assert_eq!(scene.gui_commands().len(), 1);
        let shaders = scene.load_shader_paths().unwrap();
        assert_eq!(
            shaders["default"].vertex,
            Path::new("/game/scenes/../shaders/cube.vert.spv")
        );
        assert!(scene.audio_cues().background.is_none());
    }

    #[test]
    fn test_paths_resolved_against_scene_dir() {
        let scene = scene();
        let shaders = scene.load_shader_paths().unwrap();
        assert_eq!(
            shaders["default"].vertex,
            PathBuf::from("/scenes/shaders/cube.vert.spv")
        );
        assert_eq!(shaders["glow"].vertex, PathBuf::from("/abs/glow.vert.spv"));

        let cues = scene.audio_cues();
        assert_eq!(
            cues.background,
            Some(PathBuf::from("/scenes/audio/music.wav"))
        );
        assert!(cues.looping);
        assert_eq!(
            cues.effects,
            vec![
                PathBuf::from("/scenes/audio/click.wav"),
                PathBuf::from("/sfx/boom.wav")
            ]
        );
    }

    #[test]
    fn test_model_matrices() {
        let scene = scene();

        let spin = scene.model_matrix(Some(TransformHandle(0)), 0.5);
        assert!(approx(spin, Mat4::from_rotation_y(1.0)));

        let fixed = scene.model_matrix(Some(TransformHandle(1)), 10.0);
        assert!(approx(fixed, Mat4::from_translation(Vec3::X)));

        // quarter period: full amplitude
        let bob = scene.model_matrix(Some(TransformHandle(2)), 0.25);
        assert!(approx(bob, Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0))));

        assert_eq!(scene.model_matrix(None, 1.0), Mat4::IDENTITY);
        assert_eq!(
            scene.model_matrix(Some(TransformHandle(99)), 1.0),
            Mat4::IDENTITY
        );
    }

    #[test]
    fn test_camera_maps_target_to_center() {
        let scene = scene();
        let clip = scene.view_projection(16.0 / 9.0) * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn test_overlay_commands() {
        let commands = scene().gui_commands();
        assert_eq!(
            commands,
            vec![GuiCommand::Rect {
                rect: GuiRect::new(8.0, 8.0, 120.0, 24.0),
                fill: GuiColor::rgba(0, 0, 0, 160),
                border: None,
                border_width: 0.0,
            }]
        );
    }

    #[test]
    fn test_missing_shaders_rejected() {
        let scene = DeclarativeScene::parse(
            "[[objects]]\nmesh = { kind = \"triangle\" }\n",
            PathBuf::from("scene.toml"),
        )
        .unwrap();
        assert!(matches!(
            ShaderRegistry::load(&scene),
            Err(SceneError::EmptyShaderMap)
        ));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = DeclarativeScene::parse("[[objects]]\nmesh = 3\n", PathBuf::from("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, SceneError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_reload_picks_up_changes_and_keeps_scene_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.toml");
        std::fs::write(&path, SCENE).unwrap();

        let mut scene = DeclarativeScene::load(&path).unwrap();
        assert_eq!(scene.load_scene_objects().unwrap().len(), 3);

        let edited = SCENE.replace("kind = \"triangle\"", "kind = \"cube\"");
        std::fs::write(&path, edited).unwrap();
        scene.reload().unwrap();
        assert_eq!(scene.load_scene_objects().unwrap()[1].vertices.len(), 8);

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(scene.reload().is_err());
        assert_eq!(scene.load_scene_objects().unwrap().len(), 3);
    }

    #[test]
    fn test_file_mesh_resolved_and_errors_propagate() {
        let scene = DeclarativeScene::parse(
            "[[objects]]\nmesh = { kind = \"file\", path = \"meshes/ship.glb\" }\n",
            PathBuf::from("/nowhere/scene.toml"),
        )
        .unwrap();
        match scene.load_scene_objects() {
            Err(SceneError::Mesh { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nowhere/meshes/ship.glb"));
            }
            other => panic!("expected mesh import error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DeclarativeScene::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, SceneError::Io { .. }));
    }
}
