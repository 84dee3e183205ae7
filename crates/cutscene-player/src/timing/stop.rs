use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared cancellation flag with an interruptible sleep.
///
/// Cloning yields another handle to the same flag. Once stopped it stays
/// stopped; every session allocates a fresh one.
#[derive(Clone, Default)]
pub struct StopFlag {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    stopped: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every sleeper.
    pub fn stop(&self) {
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Sleep until `deadline`. Returns `false` if the flag was raised first.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        let mut guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            guard = self
                .inner
                .cond
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn sleep_for(&self, duration: Duration) -> bool {
        self.sleep_until(Instant::now() + duration)
    }
}

impl std::fmt::Debug for StopFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopFlag")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Marker carried inside the `io::Error` returned once a read is cancelled.
#[derive(Debug, thiserror::Error)]
#[error("read cancelled by stop request")]
pub struct ReadCancelled;

/// Reader that fails every read once its stop flag is raised.
pub struct CancellableReader<R> {
    inner: R,
    stop: StopFlag,
}

impl<R> CancellableReader<R> {
    pub fn new(inner: R, stop: StopFlag) -> Self {
        Self { inner, stop }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.stop.is_stopped() {
            return Err(io::Error::other(ReadCancelled));
        }
        self.inner.read(buf)
    }
}

/// Whether `err` came from a [`CancellableReader`] after a stop request.
pub fn is_cancelled(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<ReadCancelled>())
}
