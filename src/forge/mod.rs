//! Repository acquisition, build, and registration pipeline.

pub mod acquire;
pub mod ecosystem;
pub mod process;
pub mod register;

pub use acquire::{AcquireRequest, CloneBuildReport, ProjectHandle, clone_and_build, derive_name};
pub use ecosystem::Ecosystem;
pub use process::{BuildLog, CommandSpec, run_checked, run_logged};
pub use register::{RegisterReport, RegisterRequest, register_server};
