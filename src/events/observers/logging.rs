//! Logs experiment events through `tracing`
//!
//! - INFO: stage start and completion, saved records
//! - WARN: failed conditions (carrying the condition's key)
//! - DEBUG: records skipped because they already exist

use crate::events::{EventBus, ExperimentEvent};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct LoggingObserver {
    receiver: broadcast::Receiver<ExperimentEvent>,
}

impl LoggingObserver {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            receiver: bus.subscribe(),
        }
    }

    /// Log events until every bus handle is dropped
    ///
    /// ```rust,ignore
    /// let handle = tokio::spawn(LoggingObserver::new(&bus).run());
    /// ```
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => Self::log_event(&event),
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventBus closed, logging observer stopping");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Logging observer lagged, skipped {} events", count);
                }
            }
        }
    }

    pub fn log_event(event: &ExperimentEvent) {
        match event {
            ExperimentEvent::StageStarted { stage, total, .. } => {
                info!(stage = %stage, total = total, "Stage started");
            }
            ExperimentEvent::ResultSaved {
                stage,
                key,
                latency_ms,
                ..
            } => {
                info!(stage = %stage, key = %key, latency_ms = latency_ms, "Saved");
            }
            ExperimentEvent::ResultSkipped { stage, key, .. } => {
                debug!(stage = %stage, key = %key, "Already exists, skipping");
            }
            ExperimentEvent::ConditionFailed {
                stage, key, error, ..
            } => {
                warn!(stage = %stage, key = %key, error = %error, "Condition failed");
            }
            ExperimentEvent::StageCompleted {
                stage,
                saved,
                skipped,
                failed,
                ..
            } => {
                info!(
                    stage = %stage,
                    saved = saved,
                    skipped = skipped,
                    failed = failed,
                    "Stage completed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_log_all_event_types() {
        let events = vec![
            ExperimentEvent::stage_started("study2", 3),
            ExperimentEvent::result_saved("study2", "a.json", 5),
            ExperimentEvent::result_skipped("study2", "b.json"),
            ExperimentEvent::condition_failed("study2", "c.json", "bad json"),
            ExperimentEvent::stage_completed("study2", 1, 1, 1),
        ];
        for event in events {
            LoggingObserver::log_event(&event);
        }
    }

    #[tokio::test]
    async fn test_observer_stops_when_bus_dropped() {
        let bus = EventBus::new(16);
        let observer = LoggingObserver::new(&bus);
        bus.emit(ExperimentEvent::stage_started("study1", 1));
        bus.emit(ExperimentEvent::stage_completed("study1", 1, 0, 0));
        drop(bus);

        tokio::time::timeout(Duration::from_secs(2), observer.run())
            .await
            .expect("observer should stop once the bus is gone");
    }

    #[tokio::test]
    async fn test_spawned_observer_drains_events() {
        let bus = EventBus::new(16);
        let handle = tokio::spawn(LoggingObserver::new(&bus).run());

        bus.emit(ExperimentEvent::result_saved("experiment_a", "x.json", 1));
        drop(bus);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Timeout")
            .expect("observer task should complete");
    }
}
