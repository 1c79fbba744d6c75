//! Worker process bridge for headless-rl
//!
//! This crate provides:
//! - Line-delimited JSON wire protocol (commands out, typed replies in)
//! - Background pipe readers and the stderr diagnostic tail
//! - Launcher resolution for the worker toolchain
//! - `ProcessSupervisor`, the owner of one worker process

pub mod launch;
pub mod pipe;
pub mod protocol;
pub mod supervisor;

pub use launch::{LaunchSpec, Launcher, TsxLauncher};
pub use pipe::{DiagnosticTail, STDERR_TAIL_LINES};
pub use protocol::{Command, Response, StepReply, decode, encode};
pub use supervisor::ProcessSupervisor;
