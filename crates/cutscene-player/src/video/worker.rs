use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::container::{Chunk, ContainerReader, DecodeError, StreamHeader};
use super::image::{FrameBuffer, Palette};
use super::presenter::{Frame, Presenter};
use crate::audio::AudioControl;
use crate::resource::MediaStream;
use crate::session::SessionContext;
use crate::subtitles::SubtitleIndex;
use crate::timing::{CancellableReader, PacingClock, StopFlag};

pub(crate) type VideoReader = ContainerReader<CancellableReader<MediaStream>>;

/// How the video worker ended.
#[derive(Debug)]
pub enum VideoOutcome {
    /// Reached `X` or end of stream.
    Finished { frames_presented: u64 },
    /// A stop request ended playback early.
    Cancelled { frames_presented: u64 },
    /// The stream was malformed or unreadable.
    Failed {
        frames_presented: u64,
        error: DecodeError,
    },
}

impl VideoOutcome {
    pub fn frames_presented(&self) -> u64 {
        match self {
            VideoOutcome::Finished { frames_presented }
            | VideoOutcome::Cancelled { frames_presented }
            | VideoOutcome::Failed {
                frames_presented, ..
            } => *frames_presented,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, VideoOutcome::Finished { .. })
    }
}

pub(crate) struct VideoJob {
    pub reader: VideoReader,
    pub context: Arc<SessionContext>,
    pub presenter: Arc<Mutex<dyn Presenter>>,
    pub subtitles: Option<SubtitleIndex>,
    pub stop: StopFlag,
    pub audio: Option<Arc<AudioControl>>,
}

/// Body of the video worker thread.
pub(crate) fn run_video(job: VideoJob) -> VideoOutcome {
    let VideoJob {
        mut reader,
        context,
        presenter,
        subtitles,
        stop,
        audio,
    } = job;

    lock(&presenter).begin(&context.header);
    let outcome = decode_loop(
        &mut reader,
        &context,
        &presenter,
        subtitles.as_ref(),
        &stop,
        audio.as_deref(),
    );
    lock(&presenter).finish();

    if let Some(audio) = audio.as_deref() {
        // At a natural end the prepared audio plays out on its own.
        let keep_playing = outcome.is_finished() && audio.has_started();
        if !keep_playing {
            audio.stop_playback();
        }
    }

    match &outcome {
        VideoOutcome::Finished { frames_presented } => {
            log::debug!("Video finished after {frames_presented} frames");
        }
        VideoOutcome::Cancelled { frames_presented } => {
            log::debug!("Video cancelled after {frames_presented} frames");
        }
        VideoOutcome::Failed {
            frames_presented,
            error,
        } => {
            log::error!("Video failed after {frames_presented} frames: {error}");
        }
    }
    outcome
}

fn decode_loop(
    reader: &mut VideoReader,
    context: &SessionContext,
    presenter: &Mutex<dyn Presenter>,
    subtitles: Option<&SubtitleIndex>,
    stop: &StopFlag,
    audio: Option<&AudioControl>,
) -> VideoOutcome {
    let header: StreamHeader = context.header;
    let mut palette = Palette::new();
    let mut buffer = FrameBuffer::new(header.width, header.height);
    let mut clock: Option<PacingClock> = None;
    let mut index: u32 = 0;
    let mut presented: u64 = 0;

    loop {
        if stop.is_stopped() {
            return VideoOutcome::Cancelled {
                frames_presented: presented,
            };
        }

        let indices = match reader.next_chunk() {
            Ok(Chunk::Palette(rgb)) => {
                palette.apply(rgb);
                continue;
            }
            Ok(Chunk::Image(indices)) => indices,
            Ok(Chunk::End) => {
                return VideoOutcome::Finished {
                    frames_presented: presented,
                };
            }
            Err(DecodeError::Cancelled) => {
                return VideoOutcome::Cancelled {
                    frames_presented: presented,
                };
            }
            Err(_) if stop.is_stopped() => {
                return VideoOutcome::Cancelled {
                    frames_presented: presented,
                };
            }
            Err(error) => {
                return VideoOutcome::Failed {
                    frames_presented: presented,
                    error,
                };
            }
        };

        buffer.compose(indices, &palette);
        let frame_index = index;
        index = index.saturating_add(1);
        if frame_index < context.resume_frame {
            log::trace!("Decoded frame {frame_index} ahead of resume point");
            continue;
        }

        let clock = clock.get_or_insert_with(|| {
            if let Some(audio) = audio {
                audio.start_playback();
            }
            PacingClock::start(header.fps_millihz, Instant::now())
        });

        let timestamp = header.frame_time(frame_index);
        let subtitle = subtitles.and_then(|subs| {
            let millis = u64::try_from(timestamp.as_millis()).unwrap_or(u64::MAX);
            subs.text_at(millis).map(str::to_owned)
        });
        lock(presenter).present(Frame {
            index: frame_index,
            timestamp,
            width: header.width,
            height: header.height,
            pixels: buffer.snapshot(),
            subtitle,
        });
        presented += 1;

        let deadline = clock.advance();
        if !stop.sleep_until(deadline) {
            return VideoOutcome::Cancelled {
                frames_presented: presented,
            };
        }
    }
}

fn lock<'a>(presenter: &'a Mutex<dyn Presenter + 'static>) -> MutexGuard<'a, dyn Presenter + 'static> {
    presenter.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::GainRange;
    use crate::video::container::ContainerWriter;
    use crate::video::image::UNSET;
    use std::io::Cursor;
    use std::thread;
    use std::time::Duration;

    const RED: u32 = 0xFFFF_0000;
    const BLUE: u32 = 0xFF00_00FF;

    /// Records presented frames and whether audio had been released by then.
    #[derive(Default)]
    struct Recorder {
        began: usize,
        finished: usize,
        frames: Vec<(Frame, Instant)>,
        audio: Option<Arc<AudioControl>>,
        audio_started: Vec<bool>,
    }

    impl Presenter for Recorder {
        fn begin(&mut self, _header: &StreamHeader) {
            self.began += 1;
        }

        fn present(&mut self, frame: Frame) {
            if let Some(audio) = &self.audio {
                self.audio_started.push(audio.has_started());
            }
            self.frames.push((frame, Instant::now()));
        }

        fn finish(&mut self) {
            self.finished += 1;
        }
    }

    fn header(frames: u32, fps_millihz: u32) -> StreamHeader {
        StreamHeader {
            width: 2,
            height: 1,
            frame_count: frames,
            fps_millihz,
        }
    }

    /// Frame 0 paints pixel 0 red, frame 1 paints pixel 1 blue, the rest
    /// reference only unset slots.
    fn clip(frames: u32, fps_millihz: u32) -> Vec<u8> {
        let mut w = ContainerWriter::new(Vec::new(), header(frames, fps_millihz)).unwrap();
        w.palette(&[[0xFF, 0, 0], [0, 0, 0xFF]]).unwrap();
        for i in 0..frames {
            match i {
                0 => w.image(&[0, 9]).unwrap(),
                1 => w.image(&[9, 1]).unwrap(),
                _ => w.image(&[9, 9]).unwrap(),
            }
        }
        w.finish().unwrap()
    }

    fn job(
        bytes: Vec<u8>,
        resume_frame: u32,
        stop: &StopFlag,
        presenter: Arc<Mutex<Recorder>>,
        audio: Option<Arc<AudioControl>>,
    ) -> VideoJob {
        let stream: MediaStream = Box::new(Cursor::new(bytes));
        let reader = ContainerReader::new(CancellableReader::new(stream, stop.clone())).unwrap();
        VideoJob {
            context: Arc::new(SessionContext {
                generation: 1,
                header: *reader.header(),
                resume_frame,
            }),
            reader,
            presenter,
            subtitles: None,
            stop: stop.clone(),
            audio,
        }
    }

    #[test]
    fn presents_every_frame_with_delta_state() {
        let stop = StopFlag::new();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let outcome = run_video(job(clip(4, 200_000), 0, &stop, Arc::clone(&recorder), None));

        assert!(matches!(outcome, VideoOutcome::Finished { frames_presented: 4 }));
        let rec = recorder.lock().unwrap();
        assert_eq!((rec.began, rec.finished), (1, 1));
        let pixels: Vec<_> = rec.frames.iter().map(|(f, _)| f.pixels.clone()).collect();
        assert_eq!(pixels[0], vec![RED, UNSET]);
        assert_eq!(pixels[1], vec![RED, BLUE]);
        assert_eq!(pixels[3], vec![RED, BLUE]);
        assert_eq!(rec.frames[2].0.timestamp, Duration::from_millis(10));
    }

    #[test]
    fn frames_before_resume_are_decoded_but_not_presented() {
        let stop = StopFlag::new();
        let audio = Arc::new(AudioControl::new(GainRange::SOFTWARE, 100));
        let recorder = Arc::new(Mutex::new(Recorder {
            audio: Some(Arc::clone(&audio)),
            ..Recorder::default()
        }));
        let started = Instant::now();
        let outcome = run_video(job(
            clip(5, 20_000),
            2,
            &stop,
            Arc::clone(&recorder),
            Some(Arc::clone(&audio)),
        ));

        assert_eq!(outcome.frames_presented(), 3);
        let rec = recorder.lock().unwrap();
        let indices: Vec<u32> = rec.frames.iter().map(|(f, _)| f.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        // State from the skipped frames carries into the first shown one.
        assert_eq!(rec.frames[0].0.pixels, vec![RED, BLUE]);
        // Audio is released no later than the first presented frame.
        assert_eq!(rec.audio_started, vec![true, true, true]);
        // Skipped frames cost no pacing delay: 3 frames at 20 fps, not 5.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(140), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(240), "{elapsed:?}");
        // A natural end leaves the audio draining.
        assert!(!audio.is_halted());
    }

    #[test]
    fn pacing_holds_nominal_rate() {
        let stop = StopFlag::new();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        run_video(job(clip(6, 25_000), 0, &stop, Arc::clone(&recorder), None));

        let rec = recorder.lock().unwrap();
        let first = rec.frames[0].1;
        for (n, (_, at)) in rec.frames.iter().enumerate() {
            let expected = Duration::from_millis(40 * n as u64);
            let actual = at.duration_since(first);
            assert!(actual + Duration::from_millis(5) >= expected, "frame {n} early: {actual:?}");
            assert!(actual < expected + Duration::from_millis(35), "frame {n} late: {actual:?}");
        }
    }

    #[test]
    fn resume_past_end_stops_unstarted_audio() {
        let stop = StopFlag::new();
        let audio = Arc::new(AudioControl::new(GainRange::SOFTWARE, 100));
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let outcome = run_video(job(clip(3, 1_000), 10, &stop, recorder, Some(Arc::clone(&audio))));

        assert!(matches!(outcome, VideoOutcome::Finished { frames_presented: 0 }));
        assert!(audio.is_halted());
    }

    #[test]
    fn truncated_stream_fails_and_stops_audio() {
        let stop = StopFlag::new();
        let audio = Arc::new(AudioControl::new(GainRange::SOFTWARE, 100));
        let mut bytes = clip(3, 100_000);
        // Drop the end tag and the last pixel of frame 2.
        bytes.truncate(bytes.len() - 2);
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let outcome = run_video(job(bytes, 0, &stop, Arc::clone(&recorder), Some(Arc::clone(&audio))));

        match outcome {
            VideoOutcome::Failed {
                frames_presented,
                error,
            } => {
                assert_eq!(frames_presented, 2);
                assert!(matches!(error, DecodeError::Truncated { .. }), "{error}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(audio.is_halted());
        assert_eq!(recorder.lock().unwrap().finished, 1);
    }

    #[test]
    fn stop_wakes_a_sleeping_worker() {
        let stop = StopFlag::new();
        let audio = Arc::new(AudioControl::new(GainRange::SOFTWARE, 100));
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        // One frame per second, long enough that only a wake-up ends it quickly.
        let job = job(clip(10, 1_000), 0, &stop, Arc::clone(&recorder), Some(Arc::clone(&audio)));
        let worker = thread::spawn(move || run_video(job));

        thread::sleep(Duration::from_millis(100));
        let stopped = Instant::now();
        stop.stop();
        let outcome = worker.join().unwrap();

        assert!(matches!(outcome, VideoOutcome::Cancelled { frames_presented: 1 }));
        assert!(stopped.elapsed() < Duration::from_millis(500));
        assert!(audio.is_halted());
    }

    #[test]
    fn subtitles_follow_frame_time() {
        let stop = StopFlag::new();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let mut job = job(clip(6, 100_000), 0, &stop, Arc::clone(&recorder), None);
        job.subtitles = Some(SubtitleIndex::parse("0.010-0.030 hello\n0.050 bye\n"));
        run_video(job);

        let rec = recorder.lock().unwrap();
        let subs: Vec<Option<&str>> = rec
            .frames
            .iter()
            .map(|(f, _)| f.subtitle.as_deref())
            .collect();
        assert_eq!(
            subs,
            vec![None, Some("hello"), Some("hello"), None, None, Some("bye")]
        );
    }
}
