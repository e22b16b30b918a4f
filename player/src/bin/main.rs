//! vkscene - Vulkan scene player
//!
//! # Usage
//!
//! ```bash
//! vkscene                          # scenes/cube.toml next to the executable
//! vkscene path/to/scene.toml
//! vkscene scene.toml --width 1280 --height 720
//! vkscene scene.toml --trace --no-audio
//! vkscene scene.toml --config-out run.json
//! ```
//!
//! # Keyboard Shortcuts
//!
//! - ESC: Quit
//! - R: Reload the scene file
//! - 1-9: Play the matching sound effect

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vkscene_core::{config, trace, trace_point};
use vkscene_player::app::{AppOptions, run};
use vkscene_player::report::RuntimeReport;

const DEFAULT_SCENE: &str = "scenes/cube.toml";

#[derive(Parser)]
#[command(name = "vkscene")]
#[command(author, version, about = "vkscene - Vulkan scene player with mixed audio")]
struct Args {
    /// Scene file to play (default: scenes/cube.toml)
    scene: Option<PathBuf>,

    /// Window width in pixels (overrides config)
    #[arg(long)]
    width: Option<u32>,

    /// Window height in pixels (overrides config)
    #[arg(long)]
    height: Option<u32>,

    /// Emit lifecycle trace events
    #[arg(long)]
    trace: bool,

    /// Run without opening an audio device
    #[arg(long)]
    no_audio: bool,

    /// Enable the Vulkan validation layer when installed
    #[arg(long)]
    validation: bool,

    /// Write a JSON report of the resolved runtime settings to FILE
    #[arg(long, value_name = "FILE")]
    config_out: Option<PathBuf>,
}

/// The bundled scene next to the executable, else relative to the working
/// directory.
fn default_scene() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_SCENE)))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCENE))
}

fn apply_overrides(config: &mut config::Config, args: &Args) {
    if let Some(width) = args.width {
        config.window.width = width;
    }
    if let Some(height) = args.height {
        config.window.height = height;
    }
    if args.trace {
        config.debug.trace = true;
    }
    if args.no_audio {
        config.audio.enabled = false;
    }
    if args.validation {
        config.debug.validation = true;
    }
}

fn write_report(config: &config::Config, scene: &Path, out: &Path) -> Result<()> {
    RuntimeReport::new(config.window.width, config.window.height, scene, out).write()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = config::load_or_create();
    apply_overrides(&mut config, &args);
    trace::set_enabled(config.debug.trace);

    let scene_path = args.scene.clone().unwrap_or_else(default_scene);
    if !scene_path.exists() {
        anyhow::bail!("Scene file not found: {}", scene_path.display());
    }

    if let Some(out) = &args.config_out {
        write_report(&config, &scene_path, out)?;
    }

    trace_point!("app start", scene = scene_path.display().to_string());
    tracing::info!("Playing {}", scene_path.display());

    run(AppOptions { scene_path, config })
}
