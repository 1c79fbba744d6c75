//! # headless-rl-core
//!
//! Core types and traits for driving a headless simulation worker as an RL
//! environment.
//!
//! This crate provides the foundational types used by the bridge and its callers:
//! - Error taxonomy
//! - Fixed-shape observation and action-mask buffers
//! - Discrete action space
//! - Worker snapshots
//! - The `Environment` trait and episode states

pub mod action;
pub mod environment;
pub mod error;
pub mod observation;
pub mod snapshot;

pub use action::ActionSpace;
pub use environment::{Environment, EpisodeState};
pub use error::{BridgeError, Result};
pub use observation::{ActionMask, Dims, Observation, ResetResult, StepInfo, StepResult};
pub use snapshot::Snapshot;
