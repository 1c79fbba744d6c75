//! Fixed-shape observation and action-mask buffers
//!
//! Workers are free to send vectors of any length. Everything that leaves this
//! module has exactly the declared length: short input is zero-padded, long
//! input is truncated.

use serde::{Deserialize, Serialize};

/// Default observation length of the paired worker
pub const DEFAULT_OBS_DIM: usize = 8 * 5 + 20 * 3 + 2;

/// Default number of discrete action slots of the paired worker
pub const DEFAULT_ACTION_DIM: usize = 20 + 8 + 30 + 2;

/// Declared buffer shapes, fixed for the lifetime of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dims {
    pub obs_dim: usize,
    pub action_dim: usize,
}

impl Default for Dims {
    fn default() -> Self {
        Self {
            obs_dim: DEFAULT_OBS_DIM,
            action_dim: DEFAULT_ACTION_DIM,
        }
    }
}

/// Observation vector of exactly `obs_dim` values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation(Vec<f32>);

impl Observation {
    /// Build an observation of length `dim` from raw worker values
    pub fn normalized(raw: Vec<f32>, dim: usize) -> Self {
        Self(fit_to_len(raw, dim))
    }

    /// All-zero observation
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

/// Legality mask of exactly `action_dim` slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMask(Vec<bool>);

impl ActionMask {
    /// Build a mask of length `dim` from raw worker values
    pub fn normalized(raw: Vec<bool>, dim: usize) -> Self {
        Self(fit_to_len(raw, dim))
    }

    /// Mask with every slot illegal
    pub fn none(dim: usize) -> Self {
        Self(vec![false; dim])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Whether `action` is currently legal
    pub fn is_legal(&self, action: usize) -> bool {
        self.0.get(action).copied().unwrap_or(false)
    }

    /// Indices of legal actions, ascending
    pub fn legal_actions(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, legal)| legal.then_some(i))
            .collect()
    }
}

/// Extra information returned next to an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub action_mask: ActionMask,
}

/// Result of a reset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResult {
    pub observation: Observation,
    pub info: StepInfo,
}

/// Result of a simulation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Agent observation after the action
    pub observation: Observation,

    /// Scalar reward signal
    pub reward: f64,

    /// Episode terminated by the worker
    pub terminated: bool,

    /// Episode truncated (never set by the bridge itself)
    pub truncated: bool,

    pub info: StepInfo,
}

impl StepResult {
    /// Episode is over either way
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Coerce `values` to exactly `len` elements.
///
/// Equal length passes through untouched. Otherwise the first
/// `min(values.len(), len)` elements are kept and the rest is
/// `T::default()`.
pub fn fit_to_len<T: Default + Clone>(mut values: Vec<T>, len: usize) -> Vec<T> {
    if values.len() != len {
        values.resize(len, T::default());
    }
    values
}

/// Flatten a JSON number tree into values, depth-first.
///
/// A bare scalar is a one-element vector. Leaves go through [`as_number`];
/// those without a numeric reading (`null`, objects, non-numeric strings)
/// become NaN.
pub fn flatten_numeric(value: &serde_json::Value) -> Vec<f32> {
    fn walk(value: &serde_json::Value, out: &mut Vec<f32>) {
        match value {
            serde_json::Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            leaf => out.push(as_number(leaf).map_or(f32::NAN, |v| v as f32)),
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

/// Numeric reading of a scalar: numbers as-is, booleans as 0/1, numeric
/// strings parsed
pub fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Flatten a JSON tree into per-leaf truthiness, depth-first
pub fn flatten_truthy(value: &serde_json::Value) -> Vec<bool> {
    fn walk(value: &serde_json::Value, out: &mut Vec<bool>) {
        match value {
            serde_json::Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            other => out.push(is_truthy(other)),
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

/// Truthiness of a single JSON value
pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
    }
}
