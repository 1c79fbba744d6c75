//! Environment trait and episode lifecycle

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::observation::{ActionMask, Dims, ResetResult, StepResult};
use crate::snapshot::Snapshot;

/// Lifecycle of one episode (one worker process)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EpisodeState {
    /// No worker running
    Closed,
    /// Worker spawned, handshake in progress
    Starting,
    /// Handshake done, accepting steps
    Running,
    /// Worker reported the episode as done
    Terminated,
}

impl EpisodeState {
    /// Whether commands may be sent in this state
    pub fn accepts_commands(&self) -> bool {
        !matches!(self, EpisodeState::Closed)
    }
}

/// A controllable reset/step environment.
///
/// Implementations are not reentrant: one caller drives one environment.
#[async_trait]
pub trait Environment: Send {
    /// Start a fresh episode, killing any running one first
    async fn reset(&mut self, seed: Option<u64>) -> Result<ResetResult>;

    /// Execute an action and advance the episode
    async fn step(&mut self, action: i64) -> Result<StepResult>;

    /// Read the structured state of the running episode
    async fn snapshot(&mut self) -> Result<Snapshot>;

    /// Tear down the episode. Never fails and is safe to repeat.
    async fn close(&mut self);

    /// Copy of the last known action mask
    fn action_mask(&self) -> ActionMask;

    /// Current lifecycle state
    fn state(&self) -> EpisodeState;

    /// Declared buffer shapes
    fn dims(&self) -> Dims;
}
