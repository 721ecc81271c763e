//! Real-time fan-out of new samples and anomalies to connected observers.

use crate::analysis::{Anomaly, Sample};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// An event pushed to live subscribers (the WebSocket route, primarily).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    NewSample(Sample),
    NewAnomaly(Anomaly),
}

/// Broadcast-channel fan-out. Publishing is fire-and-forget: no subscribers
/// and lagged subscribers are both fine.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Event>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // Err just means nobody is listening right now.
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(subscribers = delivered, "Event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample() -> Sample {
        Sample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            value_ms: 100.0,
            status_code: 200,
            success: true,
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let n = Notifier::new(8);
        n.publish(Event::NewSample(sample()));
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let n = Notifier::new(8);
        let mut rx_a = n.subscribe();
        let mut rx_b = n.subscribe();

        let s = sample();
        n.publish(Event::NewSample(s.clone()));

        match rx_a.recv().await.unwrap() {
            Event::NewSample(got) => assert_eq!(got.id, s.id),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(rx_b.recv().await.unwrap(), Event::NewSample(_)));
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(Event::NewSample(sample())).unwrap();
        assert_eq!(json["event"], "new-sample");
        assert!(json["data"]["valueMs"].is_number());
    }
}
