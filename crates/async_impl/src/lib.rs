//! Tokio implementation of the debounced presence-to-light control loop.

pub mod control_loop;
pub mod controller;
pub mod debouncer;
pub mod session;
pub mod slot;

pub use control_loop::ControlLoop;
pub use controller::ActuatorController;
pub use debouncer::Debouncer;
pub use session::run_session;
pub use slot::DeferredSlot;
