//! Wire protocol for Rust <-> worker communication
//!
//! One JSON object per line over the worker's stdin/stdout, UTF-8,
//! newline-terminated. Commands are internally tagged by `cmd`:
//! `{"cmd": "step", "action": 3}`.

use headless_rl_core::observation::{as_number, flatten_numeric, flatten_truthy, is_truthy};
use headless_rl_core::{BridgeError, Result, Snapshot};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Commands sent from the bridge to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Start an episode
    Hello {
        seed: u64,
        mode: String,
        single_mode: String,
        seat: u32,
    },

    /// Execute an action
    Step { action: usize },

    /// Request the structured state
    Snapshot,
}

/// Replies decoded from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Reply to `hello` or `step`
    Step(StepReply),
    /// Reply to `snapshot`
    Snapshot(Snapshot),
}

/// Observation payload of a `hello` or `step` reply.
///
/// Every field is optional on the wire and every field value is accepted:
/// `obs` and `mask` are flattened when nested, unreadable `obs` leaves are
/// NaN and an unreadable `reward` is 0. Lengths are not checked here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StepReply {
    #[serde(default, deserialize_with = "numeric_tree")]
    pub obs: Vec<f32>,
    #[serde(default, deserialize_with = "truthy_tree")]
    pub mask: Vec<bool>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub reward: f64,
    #[serde(default, deserialize_with = "truthy")]
    pub done: bool,
}

fn numeric_tree<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f32>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    Ok(flatten_numeric(&value))
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(as_number(&value).unwrap_or_else(|| {
        debug!("Unreadable reward {}, using 0", value);
        0.0
    }))
}

fn truthy_tree<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<bool>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(flatten_truthy(&value))
}

fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(is_truthy(&value))
}

/// Serialize a command to a single line of JSON (without the newline)
pub fn encode(command: &Command) -> Result<String> {
    Ok(serde_json::to_string(command)?)
}

/// Decode one line from the worker.
///
/// A line holding a `snapshot` mapping is a [`Response::Snapshot`]; any other
/// JSON object is a [`Response::Step`]. A line that is not JSON, or is JSON
/// but not an object, is a protocol error carrying the raw line.
pub fn decode(line: &str) -> Result<Response> {
    let protocol_error = || BridgeError::ProtocolError {
        line: line.to_string(),
        stderr_tail: String::new(),
    };

    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        debug!("Failed to parse worker line: {}", e);
        protocol_error()
    })?;

    let serde_json::Value::Object(mut fields) = value else {
        debug!("Worker line is not a JSON object");
        return Err(protocol_error());
    };

    match fields.remove("snapshot") {
        Some(serde_json::Value::Object(snapshot)) => {
            return Ok(Response::Snapshot(Snapshot::new(snapshot)));
        }
        Some(other) => {
            fields.insert("snapshot".into(), other);
        }
        None => {}
    }

    StepReply::deserialize(serde_json::Value::Object(fields))
        .map(Response::Step)
        .map_err(|e| {
            debug!("Malformed step reply: {}", e);
            protocol_error()
        })
}

/// First 200 characters of a line, for wire logging
pub fn preview(line: &str) -> String {
    line.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_format() {
        let line = encode(&Command::Hello {
            seed: 123,
            mode: "single".into(),
            single_mode: "normal".into(),
            seat: 0,
        })
        .unwrap();
        assert_eq!(
            line,
            r#"{"cmd":"hello","seed":123,"mode":"single","single_mode":"normal","seat":0}"#
        );
    }

    #[test]
    fn test_step_and_snapshot_format() {
        assert_eq!(
            encode(&Command::Step { action: 7 }).unwrap(),
            r#"{"cmd":"step","action":7}"#
        );
        assert_eq!(encode(&Command::Snapshot).unwrap(), r#"{"cmd":"snapshot"}"#);
    }

    #[test]
    fn test_encoded_line_has_no_raw_newline() {
        let line = encode(&Command::Hello {
            seed: 1,
            mode: "multi\nline".into(),
            single_mode: "标准".into(),
            seat: 2,
        })
        .unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("标准"));
    }

    #[test]
    fn test_decode_step_reply() {
        let response =
            decode(r#"{"obs":[1,2,3],"mask":[true,false],"reward":0.5,"done":false}"#).unwrap();
        match response {
            Response::Step(reply) => {
                assert_eq!(reply.obs, vec![1.0, 2.0, 3.0]);
                assert_eq!(reply.mask, vec![true, false]);
                assert_eq!(reply.reward, 0.5);
                assert!(!reply.done);
            }
            other => panic!("Expected step reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_defaults_missing_fields() {
        match decode(r#"{"done":true}"#).unwrap() {
            Response::Step(reply) => {
                assert!(reply.obs.is_empty());
                assert!(reply.mask.is_empty());
                assert_eq!(reply.reward, 0.0);
                assert!(reply.done);
            }
            other => panic!("Expected step reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_coerces_mask_and_done() {
        match decode(r#"{"obs":[[1],[2]],"mask":[1,0,"yes"],"done":1,"event":"x"}"#).unwrap() {
            Response::Step(reply) => {
                assert_eq!(reply.obs, vec![1.0, 2.0]);
                assert_eq!(reply.mask, vec![true, false, true]);
                assert!(reply.done);
            }
            other => panic!("Expected step reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_null_observation_leaves_as_nan() {
        match decode(r#"{"obs":[1,null,2],"mask":[true],"reward":0,"done":false}"#).unwrap() {
            Response::Step(reply) => {
                assert_eq!(reply.obs.len(), 3);
                assert_eq!(reply.obs[0], 1.0);
                assert!(reply.obs[1].is_nan());
                assert_eq!(reply.obs[2], 2.0);
                assert_eq!(reply.mask, vec![true]);
            }
            other => panic!("Expected step reply, got {:?}", other),
        }

        match decode(r#"{"obs":null}"#).unwrap() {
            Response::Step(reply) => assert!(reply.obs.is_empty()),
            other => panic!("Expected step reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_coerces_reward() {
        let reward = |line: &str| match decode(line).unwrap() {
            Response::Step(reply) => reply.reward,
            other => panic!("Expected step reply, got {:?}", other),
        };
        assert_eq!(reward(r#"{"obs":[1],"reward":true}"#), 1.0);
        assert_eq!(reward(r#"{"reward":false}"#), 0.0);
        assert_eq!(reward(r#"{"reward":"1.5"}"#), 1.5);
        assert_eq!(reward(r#"{"reward":"n/a"}"#), 0.0);
        assert_eq!(reward(r#"{"reward":null}"#), 0.0);
    }

    #[test]
    fn test_decode_snapshot_reply() {
        match decode(r#"{"snapshot":{"event":"phaseUse","players":[{}]}}"#).unwrap() {
            Response::Snapshot(snapshot) => {
                assert_eq!(snapshot.event().unwrap(), "phaseUse");
                assert_eq!(snapshot.player_count(), 1);
            }
            other => panic!("Expected snapshot reply, got {:?}", other),
        }

        // A non-mapping snapshot field is not a snapshot
        assert!(matches!(
            decode(r#"{"snapshot":"pending"}"#).unwrap(),
            Response::Step(_)
        ));
        assert!(matches!(
            decode(r#"{"snapshot":null,"reward":"n/a","obs":["x"]}"#).unwrap(),
            Response::Step(_)
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        for line in ["", "not json", "{\"obs\":[1,", "[1,2,3]", "42"] {
            match decode(line) {
                Err(BridgeError::ProtocolError { line: raw, .. }) => assert_eq!(raw, line),
                other => panic!("Expected protocol error for {:?}, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).len(), 200);
        assert_eq!(preview("short"), "short");
    }
}
