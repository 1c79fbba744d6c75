//! Synchronous facade for callers without an async runtime

use crate::config::EnvConfig;
use crate::env::HeadlessEnv;
use headless_bridge::Launcher;
use headless_rl_core::{
    ActionMask, BridgeError, Dims, Environment, EpisodeState, ResetResult, Result, Snapshot,
    StepResult,
};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Blocking wrapper around [`HeadlessEnv`].
///
/// Owns a small multi-thread runtime so the pipe readers keep draining the
/// worker between calls. Must not be called from inside an async context.
pub struct BlockingEnv {
    /// Taken only on drop
    runtime: Option<Runtime>,
    env: HeadlessEnv,
}

impl BlockingEnv {
    pub fn new(launcher: impl Launcher + 'static, config: EnvConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("headless-env")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::SpawnFailed(format!("runtime: {}", e)))?;
        Ok(Self {
            runtime: Some(runtime),
            env: HeadlessEnv::new(launcher, config),
        })
    }

    pub fn reset(&mut self, seed: Option<u64>) -> Result<ResetResult> {
        let runtime = self.runtime.as_ref().ok_or(BridgeError::NotRunning)?;
        runtime.block_on(self.env.reset(seed))
    }

    pub fn step(&mut self, action: i64) -> Result<StepResult> {
        let runtime = self.runtime.as_ref().ok_or(BridgeError::NotRunning)?;
        runtime.block_on(self.env.step(action))
    }

    pub fn snapshot(&mut self) -> Result<Snapshot> {
        let runtime = self.runtime.as_ref().ok_or(BridgeError::NotRunning)?;
        runtime.block_on(self.env.snapshot())
    }

    pub fn close(&mut self) {
        if let Some(runtime) = &self.runtime {
            runtime.block_on(self.env.close());
        }
    }

    pub fn action_mask(&self) -> ActionMask {
        self.env.action_mask()
    }

    pub fn state(&self) -> EpisodeState {
        self.env.state()
    }

    pub fn dims(&self) -> Dims {
        self.env.dims()
    }

    pub fn inner(&self) -> &HeadlessEnv {
        &self.env
    }
}

impl Drop for BlockingEnv {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        if Handle::try_current().is_ok() {
            // Blocking is not allowed here. The worker still goes down with
            // the env through its kill-on-drop child handle.
            debug!("BlockingEnv dropped inside an async context, skipping close");
            runtime.shutdown_background();
        } else {
            runtime.block_on(self.env.close());
        }
    }
}
