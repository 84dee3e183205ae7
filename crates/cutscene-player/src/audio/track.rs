//! Whole-track audio preparation: load 8-bit PCM, upscale to 16 bits,
//! smooth, and bring it back down to 8 bits.

use std::io::{self, Cursor, Read};
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_PCM_U8};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioError, SAMPLE_RATE};

/// A fully prepared 8-bit unsigned mono track.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    samples: Vec<u8>,
}

impl AudioTrack {
    /// Read the whole resource and run it through the filter pipeline.
    pub fn load<R: Read>(mut reader: R, filter_strength: usize) -> Result<Self, AudioError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let pcm = decode_pcm8(bytes)?;
        Ok(Self::prepare(&pcm, filter_strength))
    }

    /// Upscale, smooth with a `filter_strength`-sample window, downscale.
    pub fn prepare(raw: &[u8], filter_strength: usize) -> Self {
        let wide = upscale(raw);
        let smoothed = moving_average(&wide, filter_strength);
        Self {
            samples: downscale(&smoothed),
        }
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(SAMPLE_RATE))
    }

    /// Samples from `skip` onwards; empty when `skip` is past the end.
    pub fn into_tail(mut self, skip: usize) -> Vec<u8> {
        if skip >= self.samples.len() {
            return Vec::new();
        }
        self.samples.drain(..skip);
        self.samples
    }
}

/// Map unsigned 8-bit samples onto the signed 16-bit range.
pub fn upscale(raw: &[u8]) -> Vec<i16> {
    raw.iter().map(|&s| (i16::from(s) - 128) * 256).collect()
}

/// Trailing moving average over `window` samples.
///
/// A window of 0 or 1 leaves the signal unchanged. Leading samples average
/// over what has been seen so far, so a constant signal stays constant.
pub fn moving_average(samples: &[i16], window: usize) -> Vec<i16> {
    if window <= 1 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len());
    let mut sum: i64 = 0;
    for (i, &s) in samples.iter().enumerate() {
        sum += i64::from(s);
        if i >= window {
            sum -= i64::from(samples[i - window]);
        }
        let count = (i + 1).min(window) as i64;
        out.push((sum / count) as i16);
    }
    out
}

/// Map signed 16-bit samples back to unsigned 8-bit.
pub fn downscale(samples: &[i16]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| ((i32::from(s) >> 8) + 128).clamp(0, 255) as u8)
        .collect()
}

/// Whether `bytes` start with a RIFF/WAVE header.
pub fn is_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// 8-bit samples of a WAVE file, or the bytes themselves when headerless.
///
/// WAVE input must be 8-bit unsigned mono PCM.
pub fn decode_pcm8(bytes: Vec<u8>) -> Result<Vec<u8>, AudioError> {
    if !is_wave(&bytes) {
        return Ok(bytes);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), MediaSourceStreamOptions::default());
    let mut hint = Hint::new();
    hint.with_extension("wav");
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(format_error)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Format("WAVE file has no audio track".into()))?;
    check_params(&track.codec_params)?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(format_error)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(format_error(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder.decode(&packet).map_err(format_error)?;
        let mut buf = SampleBuffer::<u8>::new(decoded.capacity() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }
    Ok(samples)
}

fn check_params(params: &CodecParameters) -> Result<(), AudioError> {
    let channels = params.channels.map_or(0, |c| c.count());
    if params.codec != CODEC_TYPE_PCM_U8 || channels != 1 {
        let bits = params.bits_per_sample.unwrap_or(0);
        return Err(AudioError::Format(format!(
            "expected 8-bit unsigned mono PCM, got {channels} channels, {bits} bits"
        )));
    }
    if let Some(rate) = params.sample_rate
        && rate != SAMPLE_RATE
    {
        log::warn!("Audio track is {rate} Hz, playing at {SAMPLE_RATE} Hz");
    }
    Ok(())
}

fn format_error(e: SymphoniaError) -> AudioError {
    AudioError::Format(e.to_string())
}
