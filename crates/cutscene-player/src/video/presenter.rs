use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::container::StreamHeader;

/// A composed frame handed to the presentation layer.
///
/// The pixel buffer is an owned snapshot; the decoder keeps composing into
/// its own buffer while the presenter holds this one.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u32,
    /// Nominal presentation time measured from frame zero.
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    /// ARGB, row-major.
    pub pixels: Vec<u32>,
    /// Subtitle text active at `timestamp`, if any.
    pub subtitle: Option<String>,
}

/// Receives frames from the video worker thread.
pub trait Presenter: Send {
    /// Called once per session after the header is known.
    fn begin(&mut self, _header: &StreamHeader) {}

    fn present(&mut self, frame: Frame);

    /// Called once when the video worker exits, whatever the reason.
    fn finish(&mut self) {}
}

/// Forwards frames to another thread through a single-slot channel.
///
/// If the consumer has not taken the previous frame it is replaced by the
/// new one, so a slow UI never stalls pacing and always ends on the latest
/// image.
pub struct ChannelPresenter {
    tx: Sender<Frame>,
    pending: Receiver<Frame>,
    dropped: u64,
}

impl ChannelPresenter {
    pub fn new() -> (Self, Receiver<Frame>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let presenter = Self {
            tx,
            pending: rx.clone(),
            dropped: 0,
        };
        (presenter, rx)
    }

    /// Frames replaced before the consumer took them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Presenter for ChannelPresenter {
    fn present(&mut self, mut frame: Frame) {
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(stale) = self.pending.try_recv() {
                        self.dropped += 1;
                        log::trace!("Presenter busy, replaced frame {}", stale.index);
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("Frame receiver gone");
                    return;
                }
            }
        }
    }
}

/// Position label: `"<frame> | mm:ss.mmm"`.
pub fn format_position(frame: u32, fps_millihz: u32) -> String {
    let millis = u64::from(frame) * 1_000_000 / u64::from(fps_millihz.max(1));
    let secs = millis / 1000;
    format!(
        "{frame} | {:02}:{:02}.{:03}",
        secs / 60,
        secs % 60,
        millis % 1000
    )
}
