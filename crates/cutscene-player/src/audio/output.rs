use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::volume::GainRange;
use super::worker::AudioControl;
use super::{AudioError, SAMPLE_RATE};

/// Opens output devices. Shared by every session.
pub trait AudioOutput: Send + Sync {
    /// Open a device that pulls its samples from `feed`. Output stays silent
    /// until [`OutputStream::start`].
    fn open(&self, feed: Arc<SampleFeed>) -> Result<Box<dyn OutputStream>, AudioError>;

    fn gain_range(&self) -> GainRange {
        GainRange::SOFTWARE
    }
}

/// An opened device. Dropping it stops and closes the device.
pub trait OutputStream {
    fn start(&mut self) -> Result<(), AudioError>;
}

/// Prepared samples plus a play cursor, read from the device callback.
///
/// The cursor counts device frames; when the device runs at another rate
/// the nearest source sample is repeated or skipped.
pub struct SampleFeed {
    samples: Vec<u8>,
    frames_played: AtomicU64,
    device_rate: AtomicU32,
    control: Arc<AudioControl>,
}

impl SampleFeed {
    pub(crate) fn new(samples: Vec<u8>, control: Arc<AudioControl>) -> Self {
        Self {
            samples,
            frames_played: AtomicU64::new(0),
            device_rate: AtomicU32::new(SAMPLE_RATE),
            control,
        }
    }

    /// Tell the feed the rate the device actually runs at.
    pub fn set_device_rate(&self, rate: u32) {
        self.device_rate.store(rate.max(1), Ordering::Relaxed);
    }

    /// Fill an interleaved buffer of `channels` channels, mono duplicated.
    /// Writes silence once drained or after a stop request.
    pub fn fill(&self, out: &mut [f32], channels: usize) {
        if self.control.is_halted() {
            out.fill(0.0);
            return;
        }
        let rate = u64::from(self.device_rate.load(Ordering::Relaxed));
        let amplitude = self.control.gain().get();
        let mut frame = self.frames_played.load(Ordering::Relaxed);

        for slot in out.chunks_mut(channels.max(1)) {
            let src = frame * u64::from(SAMPLE_RATE) / rate;
            let value = match usize::try_from(src).ok().and_then(|i| self.samples.get(i)) {
                Some(&s) => {
                    frame += 1;
                    ((f32::from(s) - 128.0) / 128.0 * amplitude).clamp(-1.0, 1.0)
                }
                None => 0.0,
            };
            slot.fill(value);
        }
        self.frames_played.store(frame, Ordering::Release);
    }

    /// Index of the next source sample to play.
    pub fn position(&self) -> usize {
        let frames = self.frames_played.load(Ordering::Acquire);
        let rate = u64::from(self.device_rate.load(Ordering::Relaxed));
        usize::try_from(frames * u64::from(SAMPLE_RATE) / rate).unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.position() >= self.samples.len()
    }

    /// Nominal time until the last sample is handed to the device.
    pub fn remaining(&self) -> Duration {
        let left = self.samples.len().saturating_sub(self.position());
        Duration::from_secs_f64(left as f64 / f64::from(SAMPLE_RATE))
    }
}

/// The default output device through cpal.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl AudioOutput for CpalOutput {
    fn open(&self, feed: Arc<SampleFeed>) -> Result<Box<dyn OutputStream>, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no audio output device found".into()))?;

        let device_name = device
            .description()
            .map(|d| d.name().to_string())
            .unwrap_or_else(|_| "Unknown".into());

        let (config, format) = choose_config(&device)?;
        log::info!(
            "Audio output: {device_name}, {}Hz, {}ch, {format:?}",
            config.sample_rate,
            config.channels
        );
        feed.set_device_rate(config.sample_rate);

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, feed)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, feed)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, feed)?,
            SampleFormat::U8 => build_stream::<u8>(&device, &config, feed)?,
            other => {
                return Err(AudioError::DeviceUnavailable(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        };
        // cpal may start streams on creation; hold it silent until start().
        if let Err(e) = stream.pause() {
            log::debug!("Could not pause new output stream: {e}");
        }

        Ok(Box::new(CpalStream { stream }))
    }
}

/// Prefer a native 22050 Hz mono config, else the device default.
fn choose_config(device: &cpal::Device) -> Result<(StreamConfig, SampleFormat), AudioError> {
    if let Ok(mut ranges) = device.supported_output_configs() {
        let native = ranges.find(|r| {
            r.channels() == 1
                && r.min_sample_rate() <= SAMPLE_RATE
                && SAMPLE_RATE <= r.max_sample_rate()
        });
        if let Some(range) = native {
            let supported = range.with_sample_rate(SAMPLE_RATE);
            return Ok((supported.config(), supported.sample_format()));
        }
    }
    let fallback = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
    log::debug!("No native {SAMPLE_RATE}Hz mono config, converting to device default");
    Ok((fallback.config(), fallback.sample_format()))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    feed: Arc<SampleFeed>,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                feed.fill(&mut scratch, channels);
                for (dst, &src) in data.iter_mut().zip(&scratch) {
                    *dst = T::from_sample(src);
                }
            },
            |err| {
                log::error!("Audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
}

struct CpalStream {
    stream: Stream,
}

impl OutputStream for CpalStream {
    fn start(&mut self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            log::debug!("Could not pause output stream on close: {e}");
        }
    }
}
