pub mod board;
pub mod config;
pub mod errors;
pub mod logging;

pub use board::coordinator::{CommandOutcome, Coordinator, CoreSettings};
pub use errors::{BoardError, DenyReason};
