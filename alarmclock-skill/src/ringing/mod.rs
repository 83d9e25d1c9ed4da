mod controller;
mod state;
mod timer;

pub use controller::RingController;
pub use state::RingPhase;
pub use timer::{TimerEvent, TimerHandle, TimerKind, Timers};
