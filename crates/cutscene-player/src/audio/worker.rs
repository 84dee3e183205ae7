use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use super::output::{AudioOutput, SampleFeed};
use super::track::AudioTrack;
use super::volume::{Gain, GainRange};
use super::AudioError;
use crate::resource::{MediaRef, ResourceKind, ResourceLocator};
use crate::timing::{ArmCycle, StartGate, StopFlag};

/// Extra wait past the nominal end of the track, so the device plays out
/// its last buffer before the stream is dropped.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// How far past the nominal end of the track a device may lag before the
/// worker gives up on it.
const STALL_SLACK: Duration = Duration::from_secs(1);

/// Control surface for one audio worker, shared with the session and the
/// video worker.
#[derive(Debug)]
pub struct AudioControl {
    gate: StartGate,
    halt: StopFlag,
    gain: Gain,
    range: GainRange,
    volume: AtomicU8,
}

impl AudioControl {
    pub fn new(range: GainRange, volume: u8) -> Self {
        let volume = volume.min(100);
        Self {
            gate: StartGate::new(),
            halt: StopFlag::new(),
            gain: Gain::new(range.amplitude(volume)),
            range,
            volume: AtomicU8::new(volume),
        }
    }

    /// Release the worker blocked on the start gate. Only the first call
    /// per arm cycle has any effect; returns whether this call opened it.
    pub fn start_playback(&self) -> bool {
        let opened = self.gate.signal();
        if opened {
            log::debug!("Audio start signalled");
        }
        opened
    }

    /// Silence and close the device, then re-arm the gate so a worker
    /// still waiting on it gives up.
    pub fn stop_playback(&self) {
        self.halt.stop();
        self.gate.rearm();
    }

    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        self.volume.store(volume, Ordering::Relaxed);
        self.gain.set(self.range.amplitude(volume));
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn gain(&self) -> &Gain {
        &self.gain
    }

    pub fn gain_range(&self) -> GainRange {
        self.range
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_stopped()
    }

    /// Whether the gate has been opened in the current arm cycle.
    pub fn has_started(&self) -> bool {
        self.gate.is_open()
    }

    pub fn cycle(&self) -> ArmCycle {
        self.gate.cycle()
    }
}

/// How an audio worker ended.
#[derive(Debug)]
pub enum AudioOutcome {
    /// Every prepared sample was handed to the device.
    Played,
    /// Stopped before the track finished, or before it ever started.
    Stopped,
    /// Audio could not be prepared or played; video carried on without it.
    Disabled(AudioError),
}

impl AudioOutcome {
    pub fn is_played(&self) -> bool {
        matches!(self, AudioOutcome::Played)
    }
}

pub(crate) struct AudioJob {
    pub locator: Arc<dyn ResourceLocator>,
    pub media: MediaRef,
    pub filter_strength: usize,
    pub skip_samples: usize,
    pub output: Arc<dyn AudioOutput>,
    pub control: Arc<AudioControl>,
    pub cycle: ArmCycle,
}

/// Body of the audio worker thread.
pub(crate) fn run_audio(job: AudioJob) -> AudioOutcome {
    match play_track(&job) {
        Ok(outcome) => outcome,
        Err(err) => {
            log::warn!("Audio disabled for {}: {err}", job.media);
            AudioOutcome::Disabled(err)
        }
    }
}

fn play_track(job: &AudioJob) -> Result<AudioOutcome, AudioError> {
    let reader = job
        .locator
        .open(&job.media.language, &job.media.path, ResourceKind::Audio)?
        .ok_or_else(|| AudioError::NotFound(job.media.to_string()))?;

    let track = AudioTrack::load(reader, job.filter_strength)?;
    log::debug!(
        "Audio track {}: {} samples ({:.2}s), filter {}, skipping {}",
        job.media,
        track.len(),
        track.duration().as_secs_f64(),
        job.filter_strength,
        job.skip_samples
    );
    let samples = track.into_tail(job.skip_samples);

    let control = &job.control;
    if control.is_halted() {
        return Ok(AudioOutcome::Stopped);
    }

    let feed = Arc::new(SampleFeed::new(samples, Arc::clone(control)));
    let mut stream = job.output.open(Arc::clone(&feed))?;

    if control.gate.wait(job.cycle).is_err() || control.is_halted() {
        log::debug!("Audio stopped before the start signal");
        return Ok(AudioOutcome::Stopped);
    }
    stream.start()?;

    let give_up = Instant::now() + feed.remaining() + STALL_SLACK;
    while !feed.is_drained() {
        let now = Instant::now();
        if now >= give_up {
            log::warn!(
                "Audio device stalled at sample {} of {}, giving up",
                feed.position(),
                feed.len()
            );
            return Ok(AudioOutcome::Stopped);
        }
        if !control.halt.sleep_until((now + feed.remaining() + DRAIN_POLL).min(give_up)) {
            return Ok(AudioOutcome::Stopped);
        }
    }
    if !control.halt.sleep_for(DRAIN_POLL) {
        return Ok(AudioOutcome::Stopped);
    }
    Ok(AudioOutcome::Played)
}
