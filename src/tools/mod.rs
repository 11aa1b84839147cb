pub mod apply_flow;
pub mod apply_run;
pub mod login;
pub mod search_run;

pub use apply_flow::{run_flow, FlowState, FlowSummary};
pub use apply_run::run_apply_batch;
pub use login::ensure_logged_in;
pub use search_run::run_sweep;
