//! Error types for the core engine.

use std::path::PathBuf;

use crate::audio::AudioFormat;

/// Audio configuration and device errors.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("invalid audio format: {sample_rate} Hz, {channels} channels")]
    InvalidFormat { sample_rate: u32, channels: u16 },

    #[error("audio format mismatch: output is {expected}, clip is {requested}")]
    FormatMismatch {
        expected: AudioFormat,
        requested: AudioFormat,
    },

    #[error("decoded audio clip is empty: {0}")]
    EmptyClip(PathBuf),

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Compressed {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("unsupported audio file type: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("audio device unavailable: {0}")]
    Device(String),

    #[error("failed to control audio stream: {0}")]
    StreamControl(String),
}

impl AudioError {
    /// Whether the error comes from the platform device rather than from
    /// configuration. Device errors disable audio instead of aborting.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device(_) | Self::StreamControl(_))
    }
}

/// Scene data errors reported while loading from the scene host.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("scene host returned an empty shader map")]
    EmptyShaderMap,

    #[error("scene host returned no objects")]
    EmptyScene,

    #[error("scene geometry is empty")]
    EmptyGeometry,

    #[error("object {object} index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        object: usize,
        index: u16,
        vertex_count: usize,
    },

    #[error("failed to import mesh {path}: {source}")]
    Mesh {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },

    #[error("mesh {path} is unusable: {reason}")]
    InvalidMesh { path: PathBuf, reason: &'static str },

    #[error("scene geometry exceeds {limit} {what}")]
    TooLarge { what: &'static str, limit: usize },
}

/// Fatal rendering errors. Out-of-date and suboptimal surfaces are not
/// errors; they are reported through the acquire and present outcomes.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{operation} failed: {reason}")]
    Gpu {
        operation: &'static str,
        reason: String,
    },

    #[error("surface reports no formats")]
    NoSurfaceFormats,

    #[error("cannot {operation} a swapchain that is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("no pipeline for shader key '{key}' and no default pipeline '{default_key}'")]
    MissingPipeline { key: String, default_key: String },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl RenderError {
    pub fn gpu(operation: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Gpu {
            operation,
            reason: reason.to_string(),
        }
    }
}
