pub mod output;
pub mod track;
pub mod volume;
pub(crate) mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::io;

use thiserror::Error;

pub use output::{AudioOutput, CpalOutput, OutputStream, SampleFeed};
pub use track::AudioTrack;
pub use volume::{Gain, GainRange};
pub use worker::{AudioControl, AudioOutcome};

/// Playback rate of every cutscene audio track (mono).
pub const SAMPLE_RATE: u32 = 22_050;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio resource not found: {0}")]
    NotFound(String),
    #[error("I/O error reading audio: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported audio format: {0}")]
    Format(String),
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio stream error: {0}")]
    Stream(String),
}
