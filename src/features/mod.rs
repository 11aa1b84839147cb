pub mod antibot;
pub mod session_store;

pub use antibot::{Pacing, RequestDelay};
