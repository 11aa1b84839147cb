pub mod config;
pub mod report;
pub mod run_state;
pub mod stop_signal;
pub mod types;

pub use run_state::{Monitor, RunState, RunStatus, StatusStore};
pub use stop_signal::StopSignal;
