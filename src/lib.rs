// tasklist - To-do task store with derived views and key-value persistence

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod persist;
pub mod record;
pub mod stats;
pub mod store;

// Re-export main types for convenience
pub use backend::{FileBackend, KeyValueBackend, MemoryBackend, SqliteBackend};
pub use error::StoreError;
pub use filter::{StatusFilter, ViewFilter};
pub use models::{Priority, Subtask, Task, Theme};
pub use stats::Counts;
pub use store::{Feedback, StoreEvent, TaskStore, View};
