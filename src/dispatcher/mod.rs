//! Message dispatch module.
//!
//! Turns incoming messages into bounded, concurrent conversion jobs
//! and keeps statistics about them.

mod plan;
mod runner;
mod stats;

pub use plan::{ConversionPlan, ConversionStep, UNSUPPORTED_TEXT, error_text, input_file_name};
pub use runner::{DispatchMessage, Dispatcher};
pub use stats::{DispatchStats, format_uptime};
