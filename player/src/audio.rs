//! cpal audio backend
//!
//! The device callback pulls straight from the shared voice mixer. Streams
//! are 16-bit when the device offers it; otherwise the mixed block is
//! converted to `f32` in a scratch buffer owned by the callback.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SampleRate};
use tracing::{debug, error};
use vkscene_core::AudioError;
use vkscene_core::audio::{AudioBackend, AudioFormat, AudioStream, VoiceMixer};

pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CpalStream {
    stream: cpal::Stream,
}

impl AudioStream for CpalStream {
    fn resume(&mut self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamControl(format!("Failed to play audio stream: {e}")))
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamControl(format!("Failed to pause audio stream: {e}")))
    }
}

impl AudioBackend for CpalBackend {
    type Stream = CpalStream;

    fn open_stream(
        &mut self,
        format: AudioFormat,
        mixer: Arc<VoiceMixer>,
    ) -> Result<CpalStream, AudioError> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("No audio output device available".to_string()))?;

        let rate = SampleRate(format.sample_rate);
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| AudioError::Device(format!("Failed to query output configs: {e}")))?
            .filter(|range| {
                range.channels() == format.channels
                    && range.min_sample_rate() <= rate
                    && rate <= range.max_sample_rate()
            })
            .collect();

        let range = [SampleFormat::I16, SampleFormat::F32]
            .into_iter()
            .find_map(|wanted| {
                supported
                    .iter()
                    .find(|range| range.sample_format() == wanted)
            })
            .cloned()
            .ok_or_else(|| AudioError::Device(format!("No output config supports {format}")))?;

        let sample_format = range.sample_format();
        let config: cpal::StreamConfig = range.with_sample_rate(rate).into();
        debug!("Audio device config: {:?} {:?}", config, sample_format);

        let stream = match sample_format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| mixer.mix_into(data),
                |err| error!("Audio stream error: {}", err),
                None,
            ),
            _ => {
                let mut scratch: Vec<i16> = vec![0; 4096];
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if scratch.len() < data.len() {
                            scratch.resize(data.len(), 0);
                        }
                        let block = &mut scratch[..data.len()];
                        mixer.mix_into(block);
                        for (out, &sample) in data.iter_mut().zip(block.iter()) {
                            *out = f32::from_sample(sample);
                        }
                    },
                    |err| error!("Audio stream error: {}", err),
                    None,
                )
            }
        }
        .map_err(|e| AudioError::Device(format!("Failed to build audio stream: {e}")))?;

        Ok(CpalStream { stream })
    }
}
