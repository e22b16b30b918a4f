//! Audio output bridge
//!
//! Owns the one device stream. The stream's callback runs on a platform
//! thread and pulls mixed blocks straight from the shared [`VoiceMixer`]; the
//! bridge itself holds no lock.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{AudioFormat, PcmClip, VoiceMixer};
use crate::error::AudioError;
use crate::trace_point;

/// A running device stream.
pub trait AudioStream {
    /// Start or resume device callbacks.
    fn resume(&mut self) -> Result<(), AudioError>;
    /// Stop device callbacks. No callback runs after this returns.
    fn pause(&mut self) -> Result<(), AudioError>;
}

/// Platform audio device factory.
pub trait AudioBackend {
    type Stream: AudioStream;

    /// Open a 16-bit stream in `format` whose callback mixes from `mixer`.
    ///
    /// The stream may start paused; [`AudioOutput`] resumes it right away.
    fn open_stream(
        &mut self,
        format: AudioFormat,
        mixer: Arc<VoiceMixer>,
    ) -> Result<Self::Stream, AudioError>;
}

/// Owner of the mixer and the device stream.
///
/// The stream is opened lazily by the first clip played. Dropping the output
/// pauses the stream before it is torn down.
pub struct AudioOutput<B: AudioBackend> {
    backend: B,
    mixer: Arc<VoiceMixer>,
    stream: Option<OpenStream<B::Stream>>,
}

struct OpenStream<S> {
    stream: S,
    format: AudioFormat,
}

impl<B: AudioBackend> AudioOutput<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            mixer: Arc::new(VoiceMixer::new()),
            stream: None,
        }
    }

    /// Open the device stream on first call; check the format afterwards.
    pub fn ensure_stream(&mut self, format: AudioFormat) -> Result<(), AudioError> {
        if !format.is_valid() {
            return Err(AudioError::InvalidFormat {
                sample_rate: format.sample_rate,
                channels: format.channels,
            });
        }

        if let Some(open) = &self.stream {
            if open.format != format {
                return Err(AudioError::FormatMismatch {
                    expected: open.format,
                    requested: format,
                });
            }
            return Ok(());
        }

        let mut stream = self.backend.open_stream(format, Arc::clone(&self.mixer))?;
        stream.resume()?;
        info!("Audio stream opened: {}", format);
        trace_point!("audio stream open", format = format);
        self.stream = Some(OpenStream { stream, format });
        Ok(())
    }

    /// Replace the background music.
    pub fn play_background(&mut self, clip: &PcmClip, looping: bool) -> Result<(), AudioError> {
        self.ensure_stream(clip.format())?;
        self.mixer.set_background_voice(clip, looping)
    }

    /// Silence the background music. The stream stays open.
    pub fn stop_background(&self) {
        self.mixer.clear_background();
    }

    /// Start a sound effect.
    pub fn play_effect(&mut self, clip: &PcmClip, looping: bool) -> Result<(), AudioError> {
        self.ensure_stream(clip.format())?;
        self.mixer.add_effect_voice(clip, looping)
    }

    /// Format of the open stream, if any.
    pub fn format(&self) -> Option<AudioFormat> {
        self.stream.as_ref().map(|open| open.format)
    }

    pub fn mixer(&self) -> &Arc<VoiceMixer> {
        &self.mixer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: AudioBackend> Drop for AudioOutput<B> {
    fn drop(&mut self) {
        if let Some(mut open) = self.stream.take() {
            if let Err(e) = open.stream.pause() {
                warn!("Failed to pause audio stream before teardown: {}", e);
            }
            drop(open);
            debug!("Audio stream closed");
        }
    }
}
