use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Alert state of a monitoring rule.
///
/// Exactly one state is active per rule at any time. Transitions are decided
/// by the dispatcher from the current cycle's evidence; a notifier never
/// mutates state. `Paused` is held outside the evaluation path — a paused
/// rule is not scheduled at all.
///
/// # Examples
///
/// ```
/// use klaxon_common::types::AlertState;
///
/// let state: AlertState = "alerting".parse().unwrap();
/// assert_eq!(state, AlertState::Alerting);
/// assert_eq!(state.to_string(), "alerting");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Ok,
    Alerting,
    NoData,
    Paused,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Ok => write!(f, "ok"),
            AlertState::Alerting => write!(f, "alerting"),
            AlertState::NoData => write!(f, "no_data"),
            AlertState::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(AlertState::Ok),
            "alerting" => Ok(AlertState::Alerting),
            "no_data" => Ok(AlertState::NoData),
            "paused" => Ok(AlertState::Paused),
            _ => Err(format!("unknown alert state: {s}")),
        }
    }
}

/// A configured monitoring rule.
///
/// Owned and persisted outside the evaluation core; the dispatcher mutates
/// only `state` after each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub org_id: i64,
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub name: String,
    /// Operator-authored message included in notification payloads.
    pub message: String,
    /// Opaque condition/query descriptor, interpreted by the condition
    /// evaluator against the rule's backend.
    pub query: String,
    pub data_source_id: i64,
    pub state: AlertState,
    /// Ids of the notifier instances attached to this rule, in dispatch order.
    pub notifications: Vec<i64>,
}

/// A series/value that satisfied the rule condition during one cycle.
/// Insertion order is evaluation order and is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMatch {
    pub metric: String,
    pub value: f64,
    pub tags: HashMap<String, String>,
}

/// One entry of the per-cycle diagnostic trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultLogEntry {
    pub message: String,
    pub data: Value,
}

/// Dashboard metadata returned by the metadata lookup collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

/// Data source metadata returned by the metadata lookup collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub database: String,
}

/// Persisted configuration for one notifier instance.
///
/// `settings` is a type-erased bag; the notifier type's factory owns the
/// typed extraction and validation of the fields it requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    /// Notifier type key as registered in the notifier registry
    /// (e.g. `"webhook"`, `"dingtalk"`).
    pub kind: String,
    pub is_default: bool,
    /// Minimum seconds between consecutive sends from this instance,
    /// applied in addition to the state-transition check.
    pub cooldown_secs: Option<u64>,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
