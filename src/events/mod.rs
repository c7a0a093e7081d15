//! Execution events
//!
//! Stages report progress as [`ExperimentEvent`]s on an [`EventBus`]:
//!
//! ```text
//! Executor → EventBus → [LoggingObserver, ...]
//! ```
//!
//! Every per-item event carries the storage key of the item it is about, which
//! identifies the condition (kind, generator, predictor, sample) uniquely.

pub mod bus;
pub mod observers;

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Events emitted while a stage runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ExperimentEvent {
    /// A stage began with `total` items queued
    StageStarted {
        stage: String,
        total: usize,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// A record was written
    ResultSaved {
        stage: String,
        key: String,
        latency_ms: u64,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// A record already existed and was left untouched
    ResultSkipped {
        stage: String,
        key: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// One condition failed; the stage carries on with the next
    ConditionFailed {
        stage: String,
        key: String,
        error: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// A stage finished
    StageCompleted {
        stage: String,
        saved: usize,
        skipped: usize,
        failed: usize,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },
}

impl ExperimentEvent {
    pub fn stage_started(stage: &str, total: usize) -> Self {
        Self::StageStarted {
            stage: stage.to_string(),
            total,
            timestamp: SystemTime::now(),
        }
    }

    pub fn result_saved(stage: &str, key: &str, latency_ms: u64) -> Self {
        Self::ResultSaved {
            stage: stage.to_string(),
            key: key.to_string(),
            latency_ms,
            timestamp: SystemTime::now(),
        }
    }

    pub fn result_skipped(stage: &str, key: &str) -> Self {
        Self::ResultSkipped {
            stage: stage.to_string(),
            key: key.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn condition_failed(stage: &str, key: &str, error: impl std::fmt::Display) -> Self {
        Self::ConditionFailed {
            stage: stage.to_string(),
            key: key.to_string(),
            error: error.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn stage_completed(stage: &str, saved: usize, skipped: usize, failed: usize) -> Self {
        Self::StageCompleted {
            stage: stage.to_string(),
            saved,
            skipped,
            failed,
            timestamp: SystemTime::now(),
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "StageStarted",
            Self::ResultSaved { .. } => "ResultSaved",
            Self::ResultSkipped { .. } => "ResultSkipped",
            Self::ConditionFailed { .. } => "ConditionFailed",
            Self::StageCompleted { .. } => "StageCompleted",
        }
    }

    pub fn stage(&self) -> &str {
        match self {
            Self::StageStarted { stage, .. }
            | Self::ResultSaved { stage, .. }
            | Self::ResultSkipped { stage, .. }
            | Self::ConditionFailed { stage, .. }
            | Self::StageCompleted { stage, .. } => stage,
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::StageStarted { timestamp, .. }
            | Self::ResultSaved { timestamp, .. }
            | Self::ResultSkipped { timestamp, .. }
            | Self::ConditionFailed { timestamp, .. }
            | Self::StageCompleted { timestamp, .. } => *timestamp,
        }
    }
}

/// Milliseconds since the Unix epoch
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

pub use bus::EventBus;
pub use observers::LoggingObserver;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_failed_carries_identity() {
        let event = ExperimentEvent::condition_failed(
            "study2",
            "within_model/GPT_OSS_20B/GPT_OSS_20B/abc.json",
            "Request timed out",
        );
        match &event {
            ExperimentEvent::ConditionFailed { stage, key, error, .. } => {
                assert_eq!(stage, "study2");
                assert!(key.starts_with("within_model/"));
                assert_eq!(error, "Request timed out");
            }
            _ => panic!("Wrong event type"),
        }
        assert_eq!(event.stage(), "study2");
    }

    #[test]
    fn test_event_has_timestamp() {
        let before = SystemTime::now();
        let event = ExperimentEvent::stage_started("study1", 10);
        let after = SystemTime::now();
        assert!(event.timestamp() >= before);
        assert!(event.timestamp() <= after);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ExperimentEvent::stage_completed("experiment_d", 4, 2, 1);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"StageCompleted""#));
        assert!(json.contains(r#""saved":4"#));
        assert!(json.contains(r#""failed":1"#));
    }

    #[test]
    fn test_event_deserializes_from_json() {
        let json = r#"{
            "type": "ResultSkipped",
            "stage": "study2",
            "key": "blind/A/B/c.json",
            "timestamp": 1704067200000
        }"#;
        let event: ExperimentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "ResultSkipped");
        assert_eq!(event.stage(), "study2");
    }
}
