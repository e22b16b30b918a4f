//! Runtime report written by `--config-out`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Device extensions the player enables.
pub const DEVICE_EXTENSIONS: &[&str] = &["VK_KHR_swapchain"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeReport {
    pub window_width: u32,
    pub window_height: u32,
    pub scene_file: PathBuf,
    pub scene_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,
    pub shaders_directory: PathBuf,
    pub device_extensions: Vec<String>,
    pub config_file: PathBuf,
}

impl RuntimeReport {
    /// Describe a run of `scene_file` at the given window size, reported to
    /// `config_file`.
    pub fn new(width: u32, height: u32, scene_file: &Path, config_file: &Path) -> Self {
        let scene_directory = scene_file.parent().map(Path::to_path_buf).unwrap_or_default();
        let project_root = scene_directory
            .parent()
            .filter(|root| !root.as_os_str().is_empty())
            .map(Path::to_path_buf);
        let shaders_directory = project_root
            .as_ref()
            .map_or_else(|| PathBuf::from("shaders"), |root| root.join("shaders"));

        Self {
            window_width: width,
            window_height: height,
            scene_file: scene_file.to_path_buf(),
            scene_directory,
            project_root,
            shaders_directory,
            device_extensions: DEVICE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            config_file: config_file.to_path_buf(),
        }
    }

    /// Write as JSON to `config_file`, creating parent directories.
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.config_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create report directory {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(&self.config_file, json).with_context(|| {
            format!("Failed to write report {}", self.config_file.display())
        })?;
        tracing::info!("Runtime report written to {}", self.config_file.display());
        Ok(())
    }
}
