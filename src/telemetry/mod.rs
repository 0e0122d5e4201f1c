//! Engine telemetry collector.
//!
//! The collector multiplexes ladder attempts, session lifecycle and error
//! events into a bounded history plus an async broadcast stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::config::TelemetryConfig;
use crate::error::{AudioError, ErrorCode};

pub mod events;

pub use events::{LifecyclePhase, MetricEvent, StopReason};

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.channel_capacity, config.history_capacity)
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if self.history_capacity == 0 {
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            } else {
                if history.len() == self.history_capacity {
                    history.pop_front();
                    self.dropped_history.fetch_add(1, Ordering::Relaxed);
                }
                history.push_back(event.clone());
            }
        }

        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        self.publish(MetricEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_error(&self, err: &AudioError, context: impl Into<String>) {
        self.publish(MetricEvent::Error {
            code: err.code(),
            context: context.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    /// Stream of events published after this call; lagged items are skipped.
    pub fn stream(&self) -> impl Stream<Item = MetricEvent> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| item.ok())
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(v: f32) -> MetricEvent {
        MetricEvent::VolumeChanged { volume: v }
    }

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(volume(0.1));
        collector.publish(volume(0.2));
        collector.publish(MetricEvent::MonitoringStopped {
            reason: StopReason::Requested,
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert!(
            matches!(snapshot.recent[0], MetricEvent::VolumeChanged { volume } if (volume - 0.1).abs() < f32::EPSILON)
        );
        assert!(matches!(
            snapshot.recent[2],
            MetricEvent::MonitoringStopped { .. }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        collector.publish(volume(0.1));
        collector.publish(volume(0.2));
        collector.publish(volume(0.3));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert!(
            matches!(snapshot.recent[0], MetricEvent::VolumeChanged { volume } if (volume - 0.2).abs() < f32::EPSILON)
        );
    }

    #[test]
    fn subscribers_receive_published_events() {
        let collector = TelemetryCollector::new(8, 8);
        let mut rx = collector.subscribe();

        collector.record_lifecycle(LifecyclePhase::PermissionsDenied);
        collector.record_error(&AudioError::PermissionDenied, "start");

        assert!(matches!(
            rx.try_recv(),
            Ok(MetricEvent::Lifecycle {
                phase: LifecyclePhase::PermissionsDenied,
                ..
            })
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(MetricEvent::Error { code: 1002, .. })
        ));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(MetricEvent::MonitoringStopped {
            reason: StopReason::StreamFault,
        })
        .unwrap();
        assert_eq!(json["type"], "monitoring_stopped");
        assert_eq!(json["payload"]["reason"], "stream_fault");
    }
}
