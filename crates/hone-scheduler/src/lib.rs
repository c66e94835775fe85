//! Dependency-aware job scheduling for Hone.

pub mod dag;
pub mod logging;
pub mod scheduler;

pub use dag::{DagBuilder, JobGraph, JobNode};
pub use logging::LogJob;
pub use scheduler::{Scheduler, ServiceRelease};
