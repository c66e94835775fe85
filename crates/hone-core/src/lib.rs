//! Hone Core
//!
//! Job definitions, run-state signals, configuration, and the ports shared by
//! the scheduler, the cache layer and the execution backends. This crate has
//! minimal dependencies and defines the vocabulary used across the workspace.

pub mod cache;
pub mod config;
pub mod error;
pub mod ids;
pub mod job;
pub mod ports;
pub mod signal;

pub use error::{Error, Result};
pub use ids::JobId;
pub use job::{Job, RunState, ServiceLifecycle};
pub use ports::{CacheStore, JobHandler, handler_fn};
pub use signal::Signal;
