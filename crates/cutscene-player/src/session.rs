//! One playback at a time: a video worker, an optional audio worker, and a
//! completion report once both are done.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::audio::worker::{run_audio, AudioJob};
use crate::audio::{AudioControl, AudioOutcome, AudioOutput, SAMPLE_RATE};
use crate::resource::{MediaRef, MediaStream, ResourceKind, ResourceLocator};
use crate::subtitles::SubtitleIndex;
use crate::timing::{CancellableReader, StopFlag};
use crate::video::container::{open_stream, ContainerReader, DecodeError, StreamHeader};
use crate::video::worker::{run_video, VideoJob};
use crate::video::{Presenter, VideoOutcome};

pub const DEFAULT_VOLUME: u8 = 100;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("{kind} resource not found: {language}/{path}")]
    NotFound {
        kind: ResourceKind,
        language: String,
        path: String,
    },
    #[error("I/O error opening media: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Playing,
    Stopping,
}

/// What to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub video: MediaRef,
    pub audio: Option<MediaRef>,
    pub subtitle: Option<MediaRef>,
    /// First frame to present; earlier frames are decoded silently.
    pub resume_frame: u32,
    /// Moving-average window applied to the audio track.
    pub filter_strength: usize,
}

impl PlaybackRequest {
    pub fn new(video: MediaRef) -> Self {
        Self {
            video,
            audio: None,
            subtitle: None,
            resume_frame: 0,
            filter_strength: 0,
        }
    }

    pub fn with_audio(mut self, audio: MediaRef) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_subtitle(mut self, subtitle: MediaRef) -> Self {
        self.subtitle = Some(subtitle);
        self
    }

    pub fn resume_at(mut self, frame: u32) -> Self {
        self.resume_frame = frame;
        self
    }

    pub fn with_filter(mut self, strength: usize) -> Self {
        self.filter_strength = strength;
        self
    }
}

/// Immutable per-session facts, captured once the header is read.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub generation: u64,
    pub header: StreamHeader,
    pub resume_frame: u32,
}

/// Delivered once per session, after both workers have returned.
#[derive(Debug)]
pub struct SessionReport {
    pub generation: u64,
    pub video: VideoOutcome,
    /// `None` when the request carried no audio.
    pub audio: Option<AudioOutcome>,
}

type CompletionHandler = Arc<dyn Fn(SessionReport) + Send + Sync>;

struct Shared {
    state: Mutex<SessionState>,
    handler: Mutex<Option<CompletionHandler>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts outstanding workers; the last one to arrive reports.
struct CompletionLatch {
    generation: u64,
    pending: AtomicUsize,
    video: Mutex<Option<VideoOutcome>>,
    audio: Mutex<Option<AudioOutcome>>,
    shared: Arc<Shared>,
}

impl CompletionLatch {
    fn new(generation: u64, workers: usize, shared: Arc<Shared>) -> Self {
        Self {
            generation,
            pending: AtomicUsize::new(workers),
            video: Mutex::new(None),
            audio: Mutex::new(None),
            shared,
        }
    }

    fn video_done(&self, outcome: VideoOutcome) {
        *self.video.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        if !self.arrive() {
            // Audio is still draining after the last frame.
            let mut state = self.shared.state();
            if *state == SessionState::Playing {
                *state = SessionState::Stopping;
            }
        }
    }

    fn audio_done(&self, outcome: AudioOutcome) {
        *self.audio.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.arrive();
    }

    /// Returns `true` for the last arrival, which completes the session.
    fn arrive(&self) -> bool {
        if self.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return false;
        }
        self.complete();
        true
    }

    fn complete(&self) {
        let video = self.video.lock().unwrap_or_else(PoisonError::into_inner).take();
        let audio = self.audio.lock().unwrap_or_else(PoisonError::into_inner).take();
        *self.shared.state() = SessionState::Idle;

        let Some(video) = video else {
            log::error!("Session {} ended without a video outcome", self.generation);
            return;
        };
        log::info!(
            "Session {} ended: {} frames presented, video {}, audio {}",
            self.generation,
            video.frames_presented(),
            video_label(&video),
            audio.as_ref().map_or("none", audio_label)
        );

        let handler = self
            .shared
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(SessionReport {
                generation: self.generation,
                video,
                audio,
            });
        }
    }
}

fn video_label(outcome: &VideoOutcome) -> &'static str {
    match outcome {
        VideoOutcome::Finished { .. } => "finished",
        VideoOutcome::Cancelled { .. } => "cancelled",
        VideoOutcome::Failed { .. } => "failed",
    }
}

fn audio_label(outcome: &AudioOutcome) -> &'static str {
    match outcome {
        AudioOutcome::Played => "played",
        AudioOutcome::Stopped => "stopped",
        AudioOutcome::Disabled(_) => "disabled",
    }
}

struct ActiveSession {
    stop: StopFlag,
    audio: Option<Arc<AudioControl>>,
    video_thread: Option<JoinHandle<()>>,
    audio_thread: Option<JoinHandle<()>>,
}

/// Plays one clip at a time and reports each playback once it ends.
///
/// All commands come from a single control thread. `play` and `stop` return
/// as soon as the workers are dispatched. Joining happens in `wait`, which
/// drop and a `play` over a running session both call.
pub struct PlaybackSession {
    locator: Arc<dyn ResourceLocator>,
    output: Arc<dyn AudioOutput>,
    presenter: Arc<Mutex<dyn Presenter>>,
    shared: Arc<Shared>,
    volume: u8,
    generation: u64,
    active: Option<ActiveSession>,
}

impl PlaybackSession {
    pub fn new(
        locator: Arc<dyn ResourceLocator>,
        output: Arc<dyn AudioOutput>,
        presenter: Arc<Mutex<dyn Presenter>>,
    ) -> Self {
        Self {
            locator,
            output,
            presenter,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::Idle),
                handler: Mutex::new(None),
            }),
            volume: DEFAULT_VOLUME,
            generation: 0,
            active: None,
        }
    }

    /// Called from a worker thread once per finished playback.
    pub fn set_completion_handler<F>(&self, handler: F)
    where
        F: Fn(SessionReport) + Send + Sync + 'static,
    {
        *self
            .shared
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Set the volume (`0..=100`) for the current and later playbacks.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        if let Some(audio) = self.active.as_ref().and_then(|a| a.audio.as_ref()) {
            audio.set_volume(self.volume);
        }
    }

    /// Start a playback, first stopping and joining any previous one.
    ///
    /// The container header is read here, so a missing or malformed video
    /// fails synchronously and no report is delivered for it. Returns the
    /// generation number carried by the eventual [`SessionReport`].
    pub fn play(&mut self, request: PlaybackRequest) -> Result<u64, PlaybackError> {
        if self.active.is_some() {
            self.stop();
            self.wait();
        }

        self.generation += 1;
        let generation = self.generation;
        *self.shared.state() = SessionState::Starting;

        match self.launch(generation, &request) {
            Ok(active) => {
                self.active = Some(active);
                let mut state = self.shared.state();
                if *state == SessionState::Starting {
                    *state = SessionState::Playing;
                }
                Ok(generation)
            }
            Err(err) => {
                *self.shared.state() = SessionState::Idle;
                log::warn!("Cannot play {}: {err}", request.video);
                Err(err)
            }
        }
    }

    /// Ask both workers to stop. Returns without waiting for them.
    pub fn stop(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        {
            let mut state = self.shared.state();
            if matches!(*state, SessionState::Starting | SessionState::Playing) {
                *state = SessionState::Stopping;
            }
        }
        active.stop.stop();
        if let Some(audio) = &active.audio {
            audio.stop_playback();
        }
    }

    /// Block until the current workers have exited.
    pub fn wait(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        for (name, handle) in [
            ("video", active.video_thread.take()),
            ("audio", active.audio_thread.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    log::warn!("Cutscene {name} worker panicked");
                }
            }
        }
        let mut state = self.shared.state();
        if *state != SessionState::Idle {
            log::warn!("Workers exited without completing the session");
            *state = SessionState::Idle;
        }
    }

    fn launch(&self, generation: u64, request: &PlaybackRequest) -> Result<ActiveSession, PlaybackError> {
        let stop = StopFlag::new();

        let raw = self.open(&request.video, ResourceKind::Video)?;
        let stream: MediaStream = open_stream(raw)?;
        let reader = ContainerReader::new(CancellableReader::new(stream, stop.clone()))?;
        let header = *reader.header();
        let context = Arc::new(SessionContext {
            generation,
            header,
            resume_frame: request.resume_frame,
        });

        let subtitles = request.subtitle.as_ref().and_then(|media| self.load_subtitles(media));

        let audio = request.audio.as_ref().map(|media| {
            let control = Arc::new(AudioControl::new(self.output.gain_range(), self.volume));
            let job = AudioJob {
                locator: Arc::clone(&self.locator),
                media: media.clone(),
                filter_strength: request.filter_strength,
                skip_samples: header.audio_skip_samples(request.resume_frame, SAMPLE_RATE),
                output: Arc::clone(&self.output),
                cycle: control.cycle(),
                control: Arc::clone(&control),
            };
            (control, job)
        });

        let workers = if audio.is_some() { 2 } else { 1 };
        let latch = Arc::new(CompletionLatch::new(generation, workers, Arc::clone(&self.shared)));

        log::info!(
            "Playing {} ({}x{}, {} frames @ {:.3} fps) from frame {}, {:.1}s to go",
            request.video,
            header.width,
            header.height,
            header.frame_count,
            header.fps(),
            request.resume_frame,
            header.playback_duration(request.resume_frame).as_secs_f64()
        );

        let (control, audio_thread) = match audio {
            Some((control, job)) => {
                let latch = Arc::clone(&latch);
                let handle = thread::Builder::new()
                    .name("cutscene-audio".into())
                    .spawn(move || latch.audio_done(run_audio(job)))
                    .map_err(PlaybackError::Spawn)?;
                (Some(control), Some(handle))
            }
            None => (None, None),
        };

        let job = VideoJob {
            reader,
            context,
            presenter: Arc::clone(&self.presenter),
            subtitles,
            stop: stop.clone(),
            audio: control.clone(),
        };
        let spawned = thread::Builder::new()
            .name("cutscene-video".into())
            .spawn(move || latch.video_done(run_video(job)));

        let video_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(control) = &control {
                    control.stop_playback();
                }
                if let Some(handle) = audio_thread {
                    let _ = handle.join();
                }
                return Err(PlaybackError::Spawn(e));
            }
        };

        Ok(ActiveSession {
            stop,
            audio: control,
            video_thread: Some(video_thread),
            audio_thread,
        })
    }

    fn open(&self, media: &MediaRef, kind: ResourceKind) -> Result<MediaStream, PlaybackError> {
        self.locator
            .open(&media.language, &media.path, kind)?
            .ok_or_else(|| PlaybackError::NotFound {
                kind,
                language: media.language.clone(),
                path: media.path.clone(),
            })
    }

    fn load_subtitles(&self, media: &MediaRef) -> Option<SubtitleIndex> {
        let stream = match self.open(media, ResourceKind::Subtitle) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Playing without subtitles: {e}");
                return None;
            }
        };
        match SubtitleIndex::load(stream) {
            Ok(index) => {
                log::debug!("Loaded {} subtitle entries from {media}", index.len());
                Some(index)
            }
            Err(e) => {
                log::warn!("Failed to read subtitles {media}: {e}");
                None
            }
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}
