//! Episode controller over a headless worker process

use crate::config::EnvConfig;
use async_trait::async_trait;
use headless_bridge::{
    Command, LaunchSpec, Launcher, ProcessSupervisor, Response, StepReply, TsxLauncher,
};
use headless_rl_core::{
    ActionMask, ActionSpace, BridgeError, Dims, Environment, EpisodeState, Observation,
    ResetResult, Result, Snapshot, StepInfo, StepResult,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One episode per worker process, driven through reset/step/snapshot/close.
///
/// Not reentrant: a single caller drives an instance. Independent instances
/// each own their own worker and can run side by side.
pub struct HeadlessEnv {
    launcher: Box<dyn Launcher>,
    config: EnvConfig,
    action_space: ActionSpace,
    supervisor: ProcessSupervisor,
    state: EpisodeState,
    last_mask: ActionMask,
    episode_seed: u64,
}

impl HeadlessEnv {
    /// Create an environment that starts workers through `launcher`
    pub fn new(launcher: impl Launcher + 'static, config: EnvConfig) -> Self {
        Self {
            launcher: Box::new(launcher),
            action_space: ActionSpace::discrete(config.dims.action_dim),
            last_mask: ActionMask::none(config.dims.action_dim),
            episode_seed: config.seed,
            supervisor: ProcessSupervisor::new(),
            state: EpisodeState::Closed,
            config,
        }
    }

    /// Create an environment running the TypeScript worker of a checkout
    pub fn for_repo(repo_root: impl AsRef<Path>, debug: bool, config: EnvConfig) -> Self {
        Self::new(TsxLauncher::new(repo_root).with_debug(debug), config)
    }

    /// Create an environment running a fixed command
    pub fn with_command(spec: LaunchSpec, config: EnvConfig) -> Self {
        Self::new(spec, config)
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn action_space(&self) -> ActionSpace {
        self.action_space
    }

    /// Seed of the current (or last) episode, after any reset retry
    pub fn episode_seed(&self) -> u64 {
        self.episode_seed
    }

    /// OS process id of the current worker
    pub fn worker_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Whether the current worker process is still alive
    pub fn worker_alive(&mut self) -> bool {
        self.supervisor.is_alive()
    }

    /// Most recent stderr lines of the current worker
    pub fn stderr_tail(&self) -> Vec<String> {
        self.supervisor.stderr_tail()
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            action_mask: self.last_mask.clone(),
        }
    }

    fn set_state(&mut self, state: EpisodeState) {
        if self.state != state {
            debug!("Episode state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// After a failure, fall back to `Closed` if the worker is gone
    fn sync_state(&mut self) {
        if !self.supervisor.is_running() {
            self.set_state(EpisodeState::Closed);
        }
    }

    /// Fix reply shapes and remember the mask
    fn apply(&mut self, reply: StepReply) -> (Observation, f64, bool) {
        let dims = self.config.dims;
        if reply.obs.len() != dims.obs_dim || reply.mask.len() != dims.action_dim {
            warn!(
                "Normalizing reply shapes: obs {} -> {}, mask {} -> {}",
                reply.obs.len(),
                dims.obs_dim,
                reply.mask.len(),
                dims.action_dim
            );
        }
        let observation = Observation::normalized(reply.obs, dims.obs_dim);
        self.last_mask = ActionMask::normalized(reply.mask, dims.action_dim);
        (observation, reply.reward, reply.done)
    }

    async fn receive_step(&mut self, timeout: Duration) -> Result<StepReply> {
        match self.supervisor.receive(timeout).await? {
            Response::Step(reply) => Ok(reply),
            Response::Snapshot(snapshot) => Err(BridgeError::ProtocolError {
                line: serde_json::json!({ "snapshot": snapshot }).to_string(),
                stderr_tail: self.supervisor.stderr_tail().join("\n"),
            }),
        }
    }

    /// Spawn a worker for `self.episode_seed` and complete the handshake
    async fn start_episode(&mut self) -> Result<(Observation, bool)> {
        self.set_state(EpisodeState::Starting);
        self.supervisor.start(self.launcher.as_ref()).await?;

        let hello = Command::Hello {
            seed: self.episode_seed,
            mode: self.config.mode.clone(),
            single_mode: self.config.single_mode.clone(),
            seat: self.config.seat,
        };
        self.supervisor.send(&hello).await?;

        let reply = self.receive_step(self.config.hello_timeout).await?;
        let (observation, _, done) = self.apply(reply);
        Ok((observation, done))
    }

    async fn reset_inner(&mut self, seed: Option<u64>) -> Result<ResetResult> {
        self.close().await;
        self.episode_seed = seed.unwrap_or(self.config.seed);

        let (mut observation, done) = self.start_episode().await?;
        if done {
            // An initial state that is already terminal is unusable; retry once
            // with the next seed and keep whatever that gives
            let next = self.episode_seed.wrapping_add(1);
            warn!(
                "Worker reported a terminal initial state for seed {}, retrying with seed {}",
                self.episode_seed, next
            );
            self.close().await;
            self.episode_seed = next;
            (observation, _) = self.start_episode().await?;
        }

        self.set_state(EpisodeState::Running);
        info!(seed = self.episode_seed, pid = ?self.worker_pid(), "Episode started");
        Ok(ResetResult {
            observation,
            info: self.info(),
        })
    }

    async fn step_inner(&mut self, action: i64) -> Result<StepResult> {
        if !self.state.accepts_commands() || !self.supervisor.is_running() {
            return Err(BridgeError::NotRunning);
        }
        let action = self.action_space.validate(action)?;

        self.supervisor.send(&Command::Step { action }).await?;
        let reply = self.receive_step(self.config.step_timeout).await?;
        let (observation, reward, done) = self.apply(reply);

        if done {
            self.set_state(EpisodeState::Terminated);
            info!(seed = self.episode_seed, "Episode terminated");
            self.close().await;
        }

        Ok(StepResult {
            observation,
            reward,
            terminated: done,
            truncated: false,
            info: self.info(),
        })
    }

    async fn snapshot_inner(&mut self) -> Result<Snapshot> {
        if !self.state.accepts_commands() || !self.supervisor.is_running() {
            return Err(BridgeError::NotRunning);
        }

        self.supervisor.send(&Command::Snapshot).await?;
        let line = self
            .supervisor
            .recv_line(self.config.snapshot_timeout)
            .await?;
        match self.supervisor.decode_line(&line) {
            Ok(Response::Snapshot(snapshot)) => Ok(snapshot),
            Ok(Response::Step(_)) => Err(BridgeError::SnapshotUnavailable(line)),
            // Valid JSON without a snapshot mapping, e.g. a bare array
            Err(BridgeError::ProtocolError { .. })
                if serde_json::from_str::<serde_json::Value>(&line).is_ok() =>
            {
                Err(BridgeError::SnapshotUnavailable(line))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Environment for HeadlessEnv {
    async fn reset(&mut self, seed: Option<u64>) -> Result<ResetResult> {
        let result = self.reset_inner(seed).await;
        if result.is_err() {
            self.sync_state();
        }
        result
    }

    async fn step(&mut self, action: i64) -> Result<StepResult> {
        let result = self.step_inner(action).await;
        if result.is_err() {
            self.sync_state();
        }
        result
    }

    async fn snapshot(&mut self) -> Result<Snapshot> {
        let result = self.snapshot_inner().await;
        if result.is_err() {
            self.sync_state();
        }
        result
    }

    async fn close(&mut self) {
        self.supervisor.kill().await;
        self.set_state(EpisodeState::Closed);
    }

    fn action_mask(&self) -> ActionMask {
        self.last_mask.clone()
    }

    fn state(&self) -> EpisodeState {
        self.state
    }

    fn dims(&self) -> Dims {
        self.config.dims
    }
}
