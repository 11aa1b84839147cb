pub mod brain;
pub mod control;
pub mod core;
pub mod features;
pub mod nlp;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use core::types::*;
pub use core::{config, report, run_state, stop_signal, types};

// --- Short module paths ---
pub use features::{antibot, session_store};
pub use scraping::{browser_manager, extractor, prober, scan};
pub use tools::{apply_flow, apply_run, login, search_run};
