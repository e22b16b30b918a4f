//! Multi-voice PCM mixer
//!
//! Voices are summed into a 32-bit accumulator without gain scaling, then
//! hard-clipped to the 16-bit range. The same mutex guards the voice list for
//! the whole mix pass and for every add/replace, so the device callback and
//! the main thread never observe a half-updated voice.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::warn;

use super::{AudioFormat, PcmClip};
use crate::error::AudioError;

/// One playing sound.
#[derive(Debug)]
struct Voice {
    samples: Arc<[i16]>,
    /// In `[0, len)` while active; wraps to 0 for looping voices
    position: usize,
    looping: bool,
    active: bool,
}

impl Voice {
    fn new(samples: Arc<[i16]>, looping: bool) -> Self {
        let active = !samples.is_empty();
        Self {
            samples,
            position: 0,
            looping,
            active,
        }
    }

    /// Add this voice's next `acc.len()` samples into `acc`.
    ///
    /// Returns whether the voice is still active afterwards.
    fn mix_into(&mut self, acc: &mut [i32]) -> bool {
        if !self.active {
            return false;
        }
        let len = self.samples.len();
        for slot in acc.iter_mut() {
            if self.position >= len {
                if self.looping {
                    self.position = 0;
                } else {
                    self.active = false;
                    break;
                }
            }
            *slot = slot.saturating_add(i32::from(self.samples[self.position]));
            self.position += 1;
        }
        if self.position >= len {
            if self.looping {
                self.position = 0;
            } else {
                self.active = false;
            }
        }
        self.active
    }
}

#[derive(Debug, Default)]
struct MixState {
    background: Option<Voice>,
    effects: Vec<Voice>,
    /// Scratch space, zeroed and resized at the start of every mix
    accumulator: Vec<i32>,
}

/// Thread-safe voice mixer.
///
/// Holds zero or one background voice (replaced, never cross-faded) and an
/// unbounded list of effect voices that are removed once they finish.
#[derive(Debug, Default)]
pub struct VoiceMixer {
    format: OnceLock<AudioFormat>,
    state: Mutex<MixState>,
}

impl VoiceMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The output format, once the first clip has fixed it.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format.get().copied()
    }

    /// Fix the output format on first use and check it afterwards.
    pub fn bind_format(&self, requested: AudioFormat) -> Result<AudioFormat, AudioError> {
        if !requested.is_valid() {
            return Err(AudioError::InvalidFormat {
                sample_rate: requested.sample_rate,
                channels: requested.channels,
            });
        }
        let expected = *self.format.get_or_init(|| requested);
        if expected != requested {
            return Err(AudioError::FormatMismatch {
                expected,
                requested,
            });
        }
        Ok(expected)
    }

    /// Replace the background voice. The previous one stops immediately.
    pub fn set_background_voice(&self, clip: &PcmClip, looping: bool) -> Result<(), AudioError> {
        self.bind_format(clip.format())?;
        let voice = Voice::new(clip.shared_samples(), looping);
        self.lock().background = Some(voice);
        Ok(())
    }

    /// Start a transient effect voice alongside the others.
    pub fn add_effect_voice(&self, clip: &PcmClip, looping: bool) -> Result<(), AudioError> {
        self.bind_format(clip.format())?;
        let voice = Voice::new(clip.shared_samples(), looping);
        self.lock().effects.push(voice);
        Ok(())
    }

    /// Mix the next `sample_count` interleaved samples.
    pub fn mix(&self, sample_count: usize) -> Vec<i16> {
        let mut out = vec![0; sample_count];
        self.mix_into(&mut out);
        out
    }

    /// Mix the next `out.len()` interleaved samples into `out`.
    ///
    /// Callback-friendly variant of [`mix`](Self::mix): it does not allocate
    /// once the accumulator has grown to the device's block size.
    pub fn mix_into(&self, out: &mut [i16]) {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.accumulator.clear();
        state.accumulator.resize(out.len(), 0);
        let acc = state.accumulator.as_mut_slice();

        let background_done = state
            .background
            .as_mut()
            .is_some_and(|voice| !voice.mix_into(acc));
        if background_done {
            state.background = None;
        }
        state.effects.retain_mut(|voice| voice.mix_into(acc));

        for (dst, &sum) in out.iter_mut().zip(acc.iter()) {
            *dst = sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        }
    }

    /// Number of live effect voices.
    pub fn effect_count(&self) -> usize {
        self.lock().effects.len()
    }

    /// Whether a background voice is still playing.
    pub fn has_background(&self) -> bool {
        self.lock().background.is_some()
    }

    /// Read position of the background voice, if any.
    pub fn background_position(&self) -> Option<usize> {
        self.lock().background.as_ref().map(|v| v.position)
    }

    /// Stop the background voice, leaving effects playing.
    pub fn clear_background(&self) {
        self.lock().background = None;
    }

    /// Stop every voice.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.background = None;
        state.effects.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MixState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("Voice mixer lock was poisoned, recovering");
            e.into_inner()
        })
    }
}
