//! Agent side of pulsemon: a bounded worker pool that runs report tasks,
//! and the reporter that publishes the local metric collection.

pub mod config;
pub mod pool;
pub mod reporter;
pub mod task;
