//! Audio playback
//!
//! Architecture:
//! - [`VoiceMixer`] owns the background voice and the effect voices behind one
//!   mutex and mixes them on demand
//! - [`AudioOutput`] owns the device stream; the stream's callback thread pulls
//!   mixed blocks from the mixer whenever the device queue runs low
//! - [`decode_audio`] turns a WAV or Ogg Vorbis file into a [`PcmClip`]
//!
//! All audio is 16-bit signed interleaved PCM. The output format is fixed by
//! the first clip played and every later clip must match it.

mod decode;
mod mixer;
mod output;

use std::fmt;
use std::sync::Arc;

pub use decode::{decode_audio, decode_compressed, decode_wav, decode_wav_reader};
pub use mixer::VoiceMixer;
pub use output::{AudioBackend, AudioOutput, AudioStream};

/// Sample rate and channel count of an interleaved PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz / {} ch", self.sample_rate, self.channels)
    }
}

/// Decoded sound: interleaved 16-bit samples plus their format.
///
/// The sample buffer is shared and never mutated, so a clip can back any
/// number of voices at once.
#[derive(Clone, Debug)]
pub struct PcmClip {
    samples: Arc<[i16]>,
    format: AudioFormat,
}

impl PcmClip {
    pub fn new(samples: impl Into<Arc<[i16]>>, format: AudioFormat) -> Self {
        Self {
            samples: samples.into(),
            format,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn shared_samples(&self) -> Arc<[i16]> {
        Arc::clone(&self.samples)
    }
}
