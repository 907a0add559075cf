//! Display formatting helpers.

pub mod format;

pub use format::{format_countdown, format_due_distance};
