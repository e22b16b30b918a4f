//! Audio file decoding. WAV goes through hound, Ogg Vorbis through
//! symphonia.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::{AudioFormat, PcmClip};
use crate::error::AudioError;

/// Decode an audio file, picking the decoder from its extension.
pub fn decode_audio(path: &Path) -> Result<PcmClip, AudioError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("wav") => decode_wav(path),
        Some("ogg" | "oga") => decode_compressed(path),
        _ => Err(AudioError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Decode a WAV file into interleaved 16-bit PCM.
pub fn decode_wav(path: &Path) -> Result<PcmClip, AudioError> {
    let reader = hound::WavReader::open(path).map_err(|source| AudioError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    decode(reader, path)
}

/// Decode WAV data from any reader. `label` names the source in errors.
pub fn decode_wav_reader<R: Read>(reader: R, label: &Path) -> Result<PcmClip, AudioError> {
    let reader = hound::WavReader::new(reader).map_err(|source| AudioError::Decode {
        path: label.to_path_buf(),
        source,
    })?;
    decode(reader, label)
}

fn decode<R: Read>(mut reader: hound::WavReader<R>, label: &Path) -> Result<PcmClip, AudioError> {
    let spec = reader.spec();
    let format = AudioFormat::new(spec.sample_rate, spec.channels);
    let to_error = |source: hound::Error| AudioError::Decode {
        path: label.to_path_buf(),
        source,
    };

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(to_error)?,
        (hound::SampleFormat::Int, bits) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| rescale_int(s, bits)))
            .collect::<Result<_, _>>()
            .map_err(to_error)?,
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<Result<_, _>>()
            .map_err(to_error)?,
    };

    if samples.is_empty() {
        return Err(AudioError::EmptyClip(label.to_path_buf()));
    }

    debug!(
        "Decoded {}: {} samples, {}",
        label.display(),
        samples.len(),
        format
    );
    Ok(PcmClip::new(samples, format))
}

/// Decode the default track of any container symphonia can read.
pub fn decode_compressed(path: &Path) -> Result<PcmClip, AudioError> {
    let file = File::open(path).map_err(|source| AudioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let to_error = |source: SymphoniaError| AudioError::Compressed {
        path: path.to_path_buf(),
        source,
    };

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let opened = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(to_error)?;
    let mut format = opened.format;

    let track = format
        .default_track()
        .ok_or_else(|| to_error(SymphoniaError::Unsupported("no audio track")))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(to_error)?;

    let mut samples: Vec<i16> = Vec::new();
    let mut stream_format: Option<AudioFormat> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(to_error(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(to_error(e)),
        };

        let spec = *decoded.spec();
        let packet_format = AudioFormat::new(spec.rate, spec.channels.count() as u16);
        match stream_format {
            None => stream_format = Some(packet_format),
            Some(existing) if existing != packet_format => {
                return Err(to_error(SymphoniaError::Unsupported(
                    "stream changes format mid-file",
                )));
            }
            Some(_) => {}
        }

        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let format = match stream_format {
        Some(format) if !samples.is_empty() => format,
        _ => return Err(AudioError::EmptyClip(path.to_path_buf())),
    };

    debug!(
        "Decoded {}: {} samples, {}",
        path.display(),
        samples.len(),
        format
    );
    Ok(PcmClip::new(samples, format))
}

/// Rescale a signed integer sample of `bits` width to 16 bits.
fn rescale_int(sample: i32, bits: u16) -> i16 {
    let bits = u32::from(bits);
    if bits > 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}
