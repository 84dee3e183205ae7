use std::time::{Duration, Instant};

const NANOS_PER_SECOND_MILLI: u128 = 1_000_000_000_000;

/// Offset of frame `frames` from frame zero at `fps_millihz` milli-Hertz.
///
/// Computed in whole nanoseconds from the frame count, so no rounding error
/// carries from one frame to the next.
pub fn frame_offset(fps_millihz: u32, frames: u64) -> Duration {
    if fps_millihz == 0 {
        return Duration::ZERO;
    }
    let nanos = u128::from(frames) * NANOS_PER_SECOND_MILLI / u128::from(fps_millihz);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Wall-clock pacing for presented frames.
///
/// Anchored once at the first presented frame; every later deadline is
/// `anchor + n * interval`, independent of how late earlier frames were.
#[derive(Debug, Clone)]
pub struct PacingClock {
    fps_millihz: u32,
    anchor: Instant,
    ticks: u64,
}

impl PacingClock {
    pub fn start(fps_millihz: u32, now: Instant) -> Self {
        Self {
            fps_millihz,
            anchor: now,
            ticks: 0,
        }
    }

    /// Advance by one frame interval and return the new target time.
    pub fn advance(&mut self) -> Instant {
        self.ticks += 1;
        self.deadline(self.ticks)
    }

    pub fn deadline(&self, ticks: u64) -> Instant {
        self.anchor + frame_offset(self.fps_millihz, ticks)
    }
}
