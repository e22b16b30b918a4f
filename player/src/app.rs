//! Windowed player
//!
//! Owns the window, the Vulkan frame orchestrator, the overlay compositor and
//! the audio output, and drives them from winit's event loop. Rendering is
//! continuous: every presented or aborted frame requests the next redraw. A
//! suspended frame (minimized window) waits for the next resize instead.
//!
//! Reloading the scene (R) re-uploads geometry, reloads the effect cues and
//! restarts the background music when its file or loop flag changed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use vkscene_core::audio::{AudioOutput, PcmClip, decode_audio};
use vkscene_core::config::Config;
use vkscene_core::overlay::CanvasCompositor;
use vkscene_core::render::{Extent2D, FrameOrchestrator, FrameOutcome, FrameSettings};
use vkscene_core::scene::{AudioCues, DeclarativeScene};
use vkscene_core::{AudioError, trace_point};

use crate::audio::CpalBackend;
use crate::vulkan::VulkanDevice;

/// Startup options resolved from the command line and config file.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub scene_path: PathBuf,
    pub config: Config,
}

/// Key actions the player responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Exit,
    Reload,
    Effect(usize),
}

fn key_action(code: KeyCode) -> Option<KeyAction> {
    let action = match code {
        KeyCode::Escape => KeyAction::Exit,
        KeyCode::KeyR => KeyAction::Reload,
        KeyCode::Digit1 => KeyAction::Effect(0),
        KeyCode::Digit2 => KeyAction::Effect(1),
        KeyCode::Digit3 => KeyAction::Effect(2),
        KeyCode::Digit4 => KeyAction::Effect(3),
        KeyCode::Digit5 => KeyAction::Effect(4),
        KeyCode::Digit6 => KeyAction::Effect(5),
        KeyCode::Digit7 => KeyAction::Effect(6),
        KeyCode::Digit8 => KeyAction::Effect(7),
        KeyCode::Digit9 => KeyAction::Effect(8),
        _ => return None,
    };
    Some(action)
}

fn frame_settings(config: &Config) -> FrameSettings {
    FrameSettings {
        clear_color: config.video.clear_color,
        present_mode: config.video.present_mode.present_mode(),
    }
}

/// Decode every effect cue, keeping a slot for clips that failed to load so
/// number keys stay mapped to their position in the scene file.
fn load_effects(paths: &[PathBuf]) -> Vec<Option<PcmClip>> {
    paths
        .iter()
        .map(|path| match decode_audio(path) {
            Ok(clip) => Some(clip),
            Err(e) => {
                warn!("Skipping sound effect: {}", e);
                None
            }
        })
        .collect()
}

/// Whether a reload has to restart the background music.
fn background_changed(old: &AudioCues, new: &AudioCues) -> bool {
    old.background != new.background || (new.background.is_some() && old.looping != new.looping)
}

struct App {
    options: AppOptions,
    scene: DeclarativeScene,
    overlay: CanvasCompositor,
    window: Option<Arc<Window>>,
    renderer: Option<FrameOrchestrator<VulkanDevice>>,
    audio: Option<AudioOutput<CpalBackend>>,
    effects: Vec<Option<PcmClip>>,
    started: Instant,
    exit_error: Option<anyhow::Error>,
}

impl App {
    fn new(options: AppOptions) -> Result<Self> {
        let scene = DeclarativeScene::load(&options.scene_path)
            .with_context(|| format!("Failed to load scene {}", options.scene_path.display()))?;
        Ok(Self {
            options,
            scene,
            overlay: CanvasCompositor::new(),
            window: None,
            renderer: None,
            audio: None,
            effects: Vec::new(),
            started: Instant::now(),
            exit_error: None,
        })
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_config = &self.options.config.window;
        let attributes = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_inner_size(PhysicalSize::new(window_config.width, window_config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create window")?,
        );

        let device = VulkanDevice::new(window.as_ref(), self.options.config.debug.validation)?;
        info!("Using GPU: {}", device.name());

        let size = window.inner_size();
        let renderer = FrameOrchestrator::new(
            device,
            &self.scene,
            frame_settings(&self.options.config),
            Extent2D::new(size.width, size.height),
        )
        .context("Failed to initialize renderer")?;

        self.renderer = Some(renderer);
        self.window = Some(window);

        if self.options.config.audio.enabled {
            self.start_audio()?;
        } else {
            info!("Audio disabled");
        }

        self.started = Instant::now();
        self.request_redraw();
        Ok(())
    }

    fn start_audio(&mut self) -> Result<()> {
        let cues = self.scene.audio_cues();
        let mut output = AudioOutput::new(CpalBackend::new());

        if let Some(path) = &cues.background {
            match decode_audio(path) {
                Ok(clip) => {
                    if let Err(e) = output.play_background(&clip, cues.looping) {
                        if e.is_device_error() {
                            warn!("Audio unavailable, continuing without sound: {}", e);
                            return Ok(());
                        }
                        return Err(e).context("Failed to start background music");
                    }
                }
                Err(e) => warn!("Skipping background music: {}", e),
            }
        }

        self.effects = load_effects(&cues.effects);
        self.audio = Some(output);
        Ok(())
    }

    fn play_effect(&mut self, slot: usize) -> Result<()> {
        let Some(Some(clip)) = self.effects.get(slot) else {
            debug!("No sound effect in slot {}", slot + 1);
            return Ok(());
        };
        let Some(audio) = self.audio.as_mut() else {
            return Ok(());
        };
        match audio.play_effect(clip, false) {
            Ok(()) => Ok(()),
            Err(e) if e.is_device_error() => {
                warn!("Audio stopped, continuing without sound: {}", e);
                self.audio = None;
                Ok(())
            }
            Err(e @ AudioError::FormatMismatch { .. }) => {
                Err(e).context("Sound effect does not match the output format")
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-read the scene file and swap it in once its data is uploaded.
    fn reload(&mut self) {
        let mut scene = self.scene.clone();
        if let Err(e) = scene.reload() {
            warn!("Scene reload failed, keeping previous scene: {}", e);
            return;
        }
        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(e) = renderer.reload_scene(&scene) {
                warn!("Scene upload failed, keeping previous scene: {}", e);
                return;
            }
        }
        let old_cues = self.scene.audio_cues();
        self.scene = scene;
        let cues = self.scene.audio_cues();
        if self.audio.is_some() {
            self.effects = load_effects(&cues.effects);
            if background_changed(&old_cues, &cues) {
                self.restart_background(&cues);
            }
        }
        self.request_redraw();
    }

    fn restart_background(&mut self, cues: &AudioCues) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        let Some(path) = &cues.background else {
            audio.stop_background();
            info!("Background music stopped");
            return;
        };
        let clip = match decode_audio(path) {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Skipping background music: {}", e);
                audio.stop_background();
                return;
            }
        };
        match audio.play_background(&clip, cues.looping) {
            Ok(()) => info!("Background music now {}", path.display()),
            Err(e) if e.is_device_error() => {
                warn!("Audio stopped, continuing without sound: {}", e);
                self.audio = None;
            }
            Err(e) => warn!("Keeping previous background music: {}", e),
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let time = self.started.elapsed().as_secs_f32();
        let outcome = renderer.draw_frame(&self.scene, Some(&mut self.overlay), time)?;
        match outcome {
            FrameOutcome::Presented { .. } | FrameOutcome::Aborted => self.request_redraw(),
            FrameOutcome::Suspended => debug!("Drawable is zero-sized, waiting for resize"),
        }
        Ok(())
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("{:#}", error);
        if self.exit_error.is_none() {
            self.exit_error = Some(error);
        }
        event_loop.exit();
    }

    /// Release GPU objects before the device, the device before the
    /// window, and stop audio last.
    fn shutdown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.shutdown();
        }
        self.audio = None;
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.notify_resized(size.width, size.height);
                }
                self.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key_action(code) {
                Some(KeyAction::Exit) => event_loop.exit(),
                Some(KeyAction::Reload) => self.reload(),
                Some(KeyAction::Effect(slot)) => {
                    if let Err(e) = self.play_effect(slot) {
                        self.fail(event_loop, e);
                    }
                }
                None => {}
            },
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e.context("Frame failed"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// Open the window and run the scene until the window closes.
///
/// Returns the first fatal error that ended the loop, if any.
pub fn run(options: AppOptions) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new(options)?;
    trace_point!("event loop start");
    event_loop.run_app(&mut app)?;
    app.shutdown();
    match app.exit_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
