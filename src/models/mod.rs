//! Data models for Eclipse tasks.

pub mod task;

pub use task::{filter_and_sort, NewTask, Task, TaskSort};
