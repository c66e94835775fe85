//! Job execution backends for Hone.
//!
//! [`EngineHandler`] is the job handler at the bottom of the decorator chain:
//! it picks the [`Executor`] for each job's engine and runs the job there.

pub mod container;
pub mod engine;
pub mod executor;
pub mod shell;

pub use container::ContainerRunner;
pub use engine::EngineHandler;
pub use executor::{Executor, RunnerConfig};
pub use shell::ShellRunner;
