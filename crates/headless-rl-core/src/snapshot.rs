//! Worker state snapshots

use serde::{Deserialize, Serialize};

/// Structured worker state returned by the `snapshot` command.
///
/// The contents belong to the worker; the bridge only exposes a few read-only
/// accessors for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(serde_json::Map<String, serde_json::Value>);

impl Snapshot {
    pub fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(fields)
    }

    /// Raw field lookup
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Current game event, if the worker reports one
    pub fn event(&self) -> Option<&serde_json::Value> {
        self.0.get("event")
    }

    /// Id of the seat controlled by the agent
    pub fn me_player_id(&self) -> Option<&serde_json::Value> {
        self.0.get("mePlayerId")
    }

    /// Number of entries in `players` (0 when absent)
    pub fn player_count(&self) -> usize {
        self.0
            .get("players")
            .and_then(|p| p.as_array())
            .map_or(0, |p| p.len())
    }

    pub fn into_inner(self) -> serde_json::Map<String, serde_json::Value> {
        self.0
    }
}
