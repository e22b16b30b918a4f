//! Configuration management (config.toml)
//!
//! Handles loading, saving, and providing defaults for player settings.
//! Settings are stored in TOML format in the platform-specific config directory.
//! Command-line flags override individual values after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::render::PresentMode;

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Window settings
    #[serde(default)]
    pub window: WindowConfig,
    /// Video/presentation settings
    #[serde(default)]
    pub video: VideoConfig,
    /// Audio settings
    #[serde(default)]
    pub audio: AudioConfig,
    /// Diagnostics
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Initial window configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Inner width in physical pixels (default: 1024)
    #[serde(default = "default_width")]
    pub width: u32,
    /// Inner height in physical pixels (default: 768)
    #[serde(default = "default_height")]
    pub height: u32,
    /// Window title (default: "vkscene")
    #[serde(default = "default_title")]
    pub title: String,
}

/// Preferred presentation mode.
///
/// The preference is used only when the surface supports it; FIFO is always
/// the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentPreference {
    /// Low-latency triple buffering
    #[default]
    Mailbox,
    /// Classic vsync
    Fifo,
    /// No vsync, may tear
    Immediate,
}

impl PresentPreference {
    pub fn present_mode(self) -> PresentMode {
        match self {
            Self::Mailbox => PresentMode::Mailbox,
            Self::Fifo => PresentMode::Fifo,
            Self::Immediate => PresentMode::Immediate,
        }
    }
}

/// Video configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Present mode preference (default: mailbox)
    #[serde(default)]
    pub present_mode: PresentPreference,
    /// Render pass clear color, linear RGBA (default: [0.1, 0.1, 0.15, 1.0])
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
}

/// Audio configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Whether to open an audio device at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Diagnostics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DebugConfig {
    /// Emit lifecycle trace events (default: false)
    #[serde(default)]
    pub trace: bool,
    /// Enable the Khronos validation layer when installed (default: false)
    #[serde(default)]
    pub validation: bool,
}

fn default_width() -> u32 {
    1024
}
fn default_height() -> u32 {
    768
}
fn default_title() -> String {
    "vkscene".to_string()
}
fn default_clear_color() -> [f32; 4] {
    [0.1, 0.1, 0.15, 1.0]
}
fn default_true() -> bool {
    true
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentPreference::default(),
            clear_color: default_clear_color(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/vkscene`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "vkscene", "vkscene")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from an explicit path, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Loads the configuration from the platform config directory, writing the
/// defaults there when no config file exists yet.
pub fn load_or_create() -> Config {
    config_dir()
        .map(|dir| load_or_create_at(&dir.join("config.toml")))
        .unwrap_or_default()
}

/// Like [`load_from`], but a missing file is created with the defaults.
/// A failed write is logged and the defaults are still returned.
pub fn load_or_create_at(path: &Path) -> Config {
    if path.exists() {
        return load_from(path);
    }
    let config = Config::default();
    match save_to(&config, path) {
        Ok(()) => tracing::info!("Wrote default config to {}", path.display()),
        Err(e) => tracing::warn!("Failed to write default config {}: {}", path.display(), e),
    }
    config
}

/// Saves the configuration to an explicit path, creating parent directories.
pub fn save_to(config: &Config, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, content)
}
