//! In-process output devices for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::output::{AudioOutput, OutputStream, SampleFeed};
use super::AudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeMode {
    /// Consumes every sample as soon as the stream starts.
    Drain,
    /// Starts but never pulls a sample.
    Stall,
    /// Fails to open.
    Unavailable,
}

#[derive(Debug)]
pub(crate) struct FakeOutput {
    mode: FakeMode,
    record: Arc<Record>,
}

#[derive(Debug, Default)]
struct Record {
    starts: AtomicUsize,
    played: AtomicUsize,
    started_at: Mutex<Option<Instant>>,
}

impl FakeOutput {
    pub(crate) fn new(mode: FakeMode) -> Self {
        Self {
            mode,
            record: Arc::default(),
        }
    }

    pub(crate) fn starts(&self) -> usize {
        self.record.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn samples_played(&self) -> usize {
        self.record.played.load(Ordering::SeqCst)
    }

    pub(crate) fn started_at(&self) -> Option<Instant> {
        *self.record.started_at.lock().unwrap()
    }
}

impl AudioOutput for FakeOutput {
    fn open(&self, feed: Arc<SampleFeed>) -> Result<Box<dyn OutputStream>, AudioError> {
        if self.mode == FakeMode::Unavailable {
            return Err(AudioError::DeviceUnavailable("fake device unplugged".into()));
        }
        Ok(Box::new(FakeStream {
            feed,
            mode: self.mode,
            record: Arc::clone(&self.record),
        }))
    }
}

struct FakeStream {
    feed: Arc<SampleFeed>,
    mode: FakeMode,
    record: Arc<Record>,
}

impl OutputStream for FakeStream {
    fn start(&mut self) -> Result<(), AudioError> {
        *self.record.started_at.lock().unwrap() = Some(Instant::now());
        self.record.starts.fetch_add(1, Ordering::SeqCst);
        if self.mode == FakeMode::Drain {
            let mut buf = [0.0f32; 256];
            while !self.feed.is_drained() {
                let before = self.feed.position();
                self.feed.fill(&mut buf, 1);
                if self.feed.position() == before {
                    break;
                }
            }
            self.record
                .played
                .store(self.feed.position().min(self.feed.len()), Ordering::SeqCst);
        }
        Ok(())
    }
}
