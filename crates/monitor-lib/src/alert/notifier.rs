//! WebSocket alert fan-out
//!
//! A single bounded broadcast channel carries serialized alert payloads
//! to every connected subscriber. Sending never blocks and never fails:
//! a subscriber that cannot keep up has its oldest pending messages
//! overwritten and learns about the gap through a lag marker on its
//! receiver.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::models::AlertPayload;

/// Client-to-server liveness probe accepted on the alert socket
pub const PING: &str = "ping";

/// Reply sent for every liveness probe
pub const PONG: &str = "pong";

/// Default per-subscriber buffer capacity
pub const DEFAULT_NOTIFIER_CAPACITY: usize = 256;

/// Broadcasts serialized alerts to all connected subscribers
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Arc<str>>,
}

impl Notifier {
    /// Create a notifier whose subscribers each buffer up to `capacity`
    /// undelivered alerts before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new subscriber. Registration is O(1) and dropping the
    /// receiver is all it takes to deregister.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    /// Current number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Serialize an alert once and queue it for every subscriber.
    ///
    /// Returns the number of subscribers the payload was queued for.
    /// Zero subscribers is not an error.
    pub fn broadcast(&self, payload: &AlertPayload) -> usize {
        let serialized: Arc<str> = match serde_json::to_string(payload) {
            Ok(s) => s.into(),
            Err(err) => {
                warn!(
                    event = "alert_serialize_failed",
                    alert_id = payload.id,
                    error = %err,
                    "Dropping unserializable alert payload"
                );
                return 0;
            }
        };

        self.tx.send(serialized).unwrap_or(0)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFIER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertSeverity, AlertType};
    use chrono::Utc;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};
    use tokio_test::assert_ok;

    fn payload(id: i64) -> AlertPayload {
        AlertPayload {
            id,
            device_id: 1,
            device_code: "INV-001".to_string(),
            alert_type: AlertType::NegativeDelta,
            severity: AlertSeverity::Warning,
            message: format!("alert {}", id),
            details: serde_json::json!({"delta": -1.0}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_serialized_alert() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        assert_eq!(notifier.broadcast(&payload(42)), 1);

        let raw = tokio_test::assert_ok!(rx.recv().await);
        let decoded: AlertPayload = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.id, 42);
        assert_eq!(decoded.device_code, "INV-001");
        assert_eq!(decoded.alert_type, AlertType::NegativeDelta);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_dropped() {
        let notifier = Notifier::new(8);
        assert_eq!(notifier.broadcast(&payload(1)), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_keeps_most_recent() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();

        // Ten alerts into a buffer of four without draining: the six
        // oldest are overwritten, the sender never blocks.
        for i in 0..10 {
            notifier.broadcast(&payload(i));
        }

        match rx.recv().await {
            Err(RecvError::Lagged(missed)) => assert_eq!(missed, 6),
            other => panic!("expected lag marker, got {:?}", other),
        }

        let mut received = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            let decoded: AlertPayload = serde_json::from_str(&raw).unwrap();
            received.push(decoded.id);
        }
        assert_eq!(received, vec![6, 7, 8, 9]);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_alerts_delivered_in_generation_order() {
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();

        for i in 0..5 {
            notifier.broadcast(&payload(i));
        }

        for expected in 0..5 {
            let raw = rx.recv().await.unwrap();
            let decoded: AlertPayload = serde_json::from_str(&raw).unwrap();
            assert_eq!(decoded.id, expected);
        }
    }

    #[tokio::test]
    async fn test_subscriber_count_follows_drops() {
        let notifier = Notifier::new(8);
        assert_eq!(notifier.subscriber_count(), 0);

        let rx1 = notifier.subscribe();
        let rx2 = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(notifier.subscriber_count(), 1);
        drop(rx2);
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
