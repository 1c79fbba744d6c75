//! Discrete action space

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Discrete action space of `n` slots, `0..n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum ActionSpace {
    Discrete { n: usize },
}

impl ActionSpace {
    pub fn discrete(n: usize) -> Self {
        ActionSpace::Discrete { n }
    }

    /// Number of action slots
    pub fn len(&self) -> usize {
        match self {
            ActionSpace::Discrete { n } => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that `action` names a slot of this space
    pub fn validate(&self, action: i64) -> Result<usize> {
        let n = self.len();
        usize::try_from(action)
            .ok()
            .filter(|a| *a < n)
            .ok_or(BridgeError::InvalidAction {
                action,
                action_dim: n,
            })
    }

    /// Fallback action when the mask has no legal slot
    pub fn last(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }
}
