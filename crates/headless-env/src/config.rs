//! Environment configuration

use headless_rl_core::Dims;
use std::time::Duration;

/// Configuration for a headless environment
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    /// Game mode sent in `hello` (default: "single")
    pub mode: String,
    /// Sub-mode sent in `hello` (default: "normal")
    pub single_mode: String,
    /// Seat controlled by the agent (default: 0)
    pub seat: u32,
    /// Seed used when `reset` is called without one
    pub seed: u64,
    /// Observation and action-mask lengths
    pub dims: Dims,
    /// Wait for the first reply after spawning; covers interpreter cold start
    pub hello_timeout: Duration,
    /// Wait for a step reply
    pub step_timeout: Duration,
    /// Wait for a snapshot reply
    pub snapshot_timeout: Duration,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            mode: "single".into(),
            single_mode: "normal".into(),
            seat: 0,
            seed: 0,
            dims: Dims::default(),
            hello_timeout: Duration::from_secs(40),
            step_timeout: Duration::from_secs(40),
            snapshot_timeout: Duration::from_secs(10),
        }
    }
}
