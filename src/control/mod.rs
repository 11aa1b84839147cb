pub mod http;
pub mod supervisor;

pub use http::{router, ControlState};
pub use supervisor::{
    default_run_binary, ProcessSupervisor, RunMode, RunSupervisor, StartOutcome, StopOutcome,
    SupervisorConfig,
};
