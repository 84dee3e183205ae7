use std::sync::{Condvar, Mutex, PoisonError};

/// Identifies one arm cycle of a [`StartGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmCycle(u64);

/// Returned by [`StartGate::wait`] when the gate was re-armed before it opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("start gate re-armed while waiting")]
pub struct GateInterrupted;

#[derive(Debug)]
struct GateState {
    cycle: u64,
    open: bool,
}

/// One-shot cross-thread start signal, re-armable between sessions.
///
/// A waiter waits on the cycle it was armed for. `signal` opens the current
/// cycle; repeated signals are no-ops. `rearm` starts a fresh cycle and
/// releases waiters of the old one with [`GateInterrupted`], including
/// waiters that only begin waiting after the re-arm.
#[derive(Debug)]
pub struct StartGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState { cycle: 0, open: false }),
            cond: Condvar::new(),
        }
    }

    pub fn cycle(&self) -> ArmCycle {
        ArmCycle(self.lock().cycle)
    }

    /// Open the gate. Returns `true` only for the call that opened it.
    pub fn signal(&self) -> bool {
        let mut state = self.lock();
        if state.open {
            return false;
        }
        state.open = true;
        self.cond.notify_all();
        true
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Close the gate and begin a new arm cycle.
    pub fn rearm(&self) -> ArmCycle {
        let mut state = self.lock();
        state.cycle += 1;
        state.open = false;
        self.cond.notify_all();
        ArmCycle(state.cycle)
    }

    /// Block until the gate opens within `cycle`.
    pub fn wait(&self, cycle: ArmCycle) -> Result<(), GateInterrupted> {
        let mut state = self.lock();
        loop {
            if state.cycle != cycle.0 {
                return Err(GateInterrupted);
            }
            if state.open {
                return Ok(());
            }
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}
