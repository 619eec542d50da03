use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::models::universe::{key_seconds, time_key, TimeKey};

/// Raw parameter value as it arrives from the planning layer or a saved file.
/// Typed against the fixture's schema by the compiler.
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
#[ts(export, export_to = "actions.ts")]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// One high-level lighting intent scoped to a fixture and a time window.
/// This is the durable record: an Actions Sheet saves as a list of these.
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[ts(export, export_to = "actions.ts")]
pub struct ActionModel {
    pub fixture_id: String,
    pub action_type: String,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

impl ActionModel {
    pub fn new(fixture_id: &str, action_type: &str, start_time: f64, duration: f64) -> Self {
        Self {
            fixture_id: fixture_id.to_string(),
            action_type: action_type.to_string(),
            start_time,
            duration,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration.max(0.0)
    }

    pub fn key(&self) -> ActionKey {
        ActionKey {
            fixture_id: self.fixture_id.clone(),
            action_type: self.action_type.clone(),
            start: time_key(self.start_time),
        }
    }
}

/// Earliest start to latest end over `actions`, ignoring non-finite times.
pub fn span_of(actions: &[ActionModel]) -> Option<(f64, f64)> {
    actions
        .iter()
        .filter(|a| a.start_time.is_finite() && a.duration.is_finite())
        .fold(None, |acc, a| {
            let (start, end) = (a.start_time, a.end_time());
            Some(match acc {
                None => (start, end),
                Some((s, e)) => (s.min(start), e.max(end)),
            })
        })
}

/// Identity of a sheet entry; two entries may never share one.
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[ts(export, export_to = "actions.ts")]
pub struct ActionKey {
    pub fixture_id: String,
    pub action_type: String,
    /// Start time in microseconds
    #[ts(type = "number")]
    pub start: TimeKey,
}

impl ActionKey {
    pub fn new(fixture_id: &str, action_type: &str, start_time: f64) -> Self {
        Self {
            fixture_id: fixture_id.to_string(),
            action_type: action_type.to_string(),
            start: time_key(start_time),
        }
    }

    pub fn start_seconds(&self) -> f64 {
        key_seconds(self.start)
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{:.3}s",
            self.fixture_id,
            self.action_type,
            self.start_seconds()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_deserialize_by_shape() {
        let json = r#"{
            "fixture_id": "par1",
            "action_type": "strobe",
            "start_time": 1.5,
            "duration": 2.0,
            "parameters": {"rate": 10, "invert": false, "target": "dimmer"}
        }"#;
        let action: ActionModel = serde_json::from_str(json).unwrap();
        assert_eq!(action.parameters["rate"], ParamValue::Number(10.0));
        assert_eq!(action.parameters["invert"], ParamValue::Bool(false));
        assert_eq!(action.parameters["target"].as_str(), Some("dimmer"));
    }

    #[test]
    fn missing_parameters_default_to_empty() {
        let json = r#"{"fixture_id":"a","action_type":"flash","start_time":0,"duration":1}"#;
        let action: ActionModel = serde_json::from_str(json).unwrap();
        assert!(action.parameters.is_empty());
    }

    #[test]
    fn keys_compare_on_microsecond_start() {
        let a = ActionModel::new("par1", "flash", 0.1 + 0.2, 1.0);
        let b = ActionModel::new("par1", "flash", 0.3, 2.0);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "par1/flash@0.300s");
    }
}
