//! Side effects of lifecycle actions, published after the primary write and handled off the
//! request path.
//!
//! Delivery is at-most-once: a failed publish, store write or push is logged and dropped.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::db::prelude::{BusinessId, Notification};

pub mod dispatch;
pub mod push;

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// A booking was created; bumps the business usage counters.
    BookingRecorded {
        business_id: BusinessId,
        at: DateTime<Utc>,
    },
    /// Persist and push a message to a customer's linked account.
    Notify(Notification),
}

impl OutboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::BookingRecorded { .. } => "booking_recorded",
            OutboundEvent::Notify(_) => "notify",
        }
    }
}

/// Producer half of the outbound queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: UnboundedSender<OutboundEvent>,
}

impl EventQueue {
    pub fn new() -> (Self, UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never fails the caller; a closed queue only costs the event.
    pub fn publish(&self, event: OutboundEvent) {
        let kind = event.kind();
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(kind, error = %e, "outbound queue closed, dropping event");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_publish_after_close_is_silent() {
        let (queue, rx) = EventQueue::new();
        drop(rx);

        // must not panic or surface an error
        queue.publish(OutboundEvent::BookingRecorded {
            business_id: BusinessId::new(),
            at: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_publish_preserves_order() {
        let (queue, mut rx) = EventQueue::new();
        let (first, second) = (BusinessId::new(), BusinessId::new());
        let at = Utc::now();

        queue.publish(OutboundEvent::BookingRecorded { business_id: first, at });
        queue.publish(OutboundEvent::BookingRecorded { business_id: second, at });

        assert_eq!(
            rx.recv().await,
            Some(OutboundEvent::BookingRecorded { business_id: first, at })
        );
        assert_eq!(
            rx.recv().await,
            Some(OutboundEvent::BookingRecorded { business_id: second, at })
        );
    }
}
