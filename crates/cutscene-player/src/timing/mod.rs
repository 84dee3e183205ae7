pub mod clock;
pub mod gate;
pub mod stop;

pub use clock::{frame_offset, PacingClock};
pub use gate::{ArmCycle, GateInterrupted, StartGate};
pub use stop::{CancellableReader, StopFlag};
