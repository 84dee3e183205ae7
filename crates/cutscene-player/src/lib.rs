//! Synchronized playback of palette-animation cutscenes.
//!
//! A [`PlaybackSession`] decodes a container stream on a video worker thread
//! and plays the matching audio track on an audio worker thread. The two
//! meet once, at the first presented frame, through a start gate; after that
//! each runs on its own clock.
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use cutscene_player::{
//!     ChannelPresenter, CpalOutput, DirectoryLocator, MediaRef, PlaybackRequest,
//!     PlaybackSession,
//! };
//!
//! let (presenter, frames) = ChannelPresenter::new();
//! let mut session = PlaybackSession::new(
//!     Arc::new(DirectoryLocator::new("data")),
//!     Arc::new(CpalOutput),
//!     Arc::new(Mutex::new(presenter)),
//! );
//! let intro = MediaRef::new("en", "intro/start");
//! session
//!     .play(PlaybackRequest::new(intro.clone()).with_audio(intro))
//!     .unwrap();
//! while let Ok(frame) = frames.recv() {
//!     println!("frame {}", frame.index);
//! }
//! ```

pub mod audio;
pub mod resource;
pub mod session;
pub mod settings;
pub mod subtitles;
pub mod timing;
pub mod video;

pub use audio::{AudioControl, AudioError, AudioOutcome, AudioOutput, CpalOutput, GainRange};
pub use resource::{DirectoryLocator, MediaRef, MemoryLocator, ResourceKind, ResourceLocator};
pub use session::{
    PlaybackError, PlaybackRequest, PlaybackSession, SessionReport, SessionState,
};
pub use settings::PlayerSettings;
pub use subtitles::{SubtitleEntry, SubtitleIndex};
pub use video::{
    format_position, ChannelPresenter, DecodeError, Frame, Presenter, StreamHeader, VideoOutcome,
};
