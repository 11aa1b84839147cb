pub mod browser_manager;
pub mod extractor;
pub mod page;
pub mod prober;
pub mod scan;

pub use page::{CdpPage, PageDriver, PageError};
pub use prober::{probe, Goal, ProbeOutcome};
