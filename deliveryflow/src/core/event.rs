//! Pipeline lifecycle events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An event emitted while a run progresses.
///
/// Events are consumed by event sinks for logging and monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The event type (e.g., "stage.started", "pipeline.stopped").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl PipelineEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: BTreeMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the payload as a JSON object.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut map: serde_json::Map<String, serde_json::Value> =
            self.data.clone().into_iter().collect();
        map.insert("timestamp".to_string(), serde_json::json!(self.timestamp));
        serde_json::Value::Object(map)
    }

    /// Creates a "pipeline.started" event.
    #[must_use]
    pub fn pipeline_started(pipeline: &str, run_id: &str, commit: &str) -> Self {
        Self::new("pipeline.started")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("commit", serde_json::json!(commit))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn stage_started(run_id: &str, stage: &str) -> Self {
        Self::new("stage.started")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(stage))
    }

    /// Creates a "stage.succeeded" event.
    #[must_use]
    pub fn stage_succeeded(run_id: &str, stage: &str, duration_ms: f64) -> Self {
        Self::new("stage.succeeded")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(stage))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(run_id: &str, stage: &str, action: &str, reason: &str) -> Self {
        Self::new("stage.failed")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("reason", serde_json::json!(reason))
    }

    /// Creates an "action.started" event.
    #[must_use]
    pub fn action_started(run_id: &str, stage: &str, action: &str, run_order: u32) -> Self {
        Self::new("action.started")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("run_order", serde_json::json!(run_order))
    }

    /// Creates an "action.succeeded" or "action.failed" event.
    #[must_use]
    pub fn action_finished(
        run_id: &str,
        stage: &str,
        action: &str,
        status: crate::core::ActionStatus,
        error: Option<&str>,
    ) -> Self {
        let event_type = if status.is_success() {
            "action.succeeded"
        } else {
            "action.failed"
        };
        let event = Self::new(event_type)
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("status", serde_json::json!(status.to_string()));
        match error {
            Some(err) => event.add_data("error", serde_json::json!(err)),
            None => event,
        }
    }

    /// Creates an "approval.requested" event.
    #[must_use]
    pub fn approval_requested(run_id: &str, stage: &str, action: &str, timeout_secs: u64) -> Self {
        Self::new("approval.requested")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("timeout_secs", serde_json::json!(timeout_secs))
    }

    /// Creates a "pipeline.completed" event.
    #[must_use]
    pub fn pipeline_completed(pipeline: &str, run_id: &str, duration_ms: f64) -> Self {
        Self::new("pipeline.completed")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "pipeline.stopped" event.
    #[must_use]
    pub fn pipeline_stopped(pipeline: &str, run_id: &str, stage: &str, reason: &str) -> Self {
        Self::new("pipeline.stopped")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stage", serde_json::json!(stage))
            .add_data("reason", serde_json::json!(reason))
    }
}
