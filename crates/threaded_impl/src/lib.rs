//! Thread-based implementation of the debounced presence-to-light control
//! loop. Each slot of delayed work owns one timer thread.

pub mod control_loop;
pub mod controller;
pub mod debouncer;
pub mod session;
pub mod timer;

pub use control_loop::ControlLoop;
pub use controller::ActuatorController;
pub use debouncer::Debouncer;
pub use session::run_session;
pub use timer::TimerSlot;
