use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::db::prelude::Store;
use crate::events::OutboundEvent;
use crate::events::push::PushTransport;

/// Drains the outbound queue until every [`EventQueue`](crate::events::EventQueue) handle is
/// dropped.
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn PushTransport>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn PushTransport>) -> Self {
        Self { store, transport }
    }

    pub fn spawn(self, rx: UnboundedReceiver<OutboundEvent>) -> JoinHandle<()> {
        tokio::task::spawn(async move { self.run(rx).await })
    }

    pub async fn run(self, mut rx: UnboundedReceiver<OutboundEvent>) {
        tracing::info!("outbound dispatcher started");
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }

        tracing::info!("outbound queue closed, dispatcher exiting");
    }

    #[instrument(skip(self, event), fields(kind = event.kind()))]
    pub async fn handle(&self, event: OutboundEvent) {
        match event {
            OutboundEvent::BookingRecorded { business_id, at } => {
                if let Err(e) = self.store.record_booking_usage(business_id, at).await {
                    tracing::error!(%business_id, error = ?e, "failed to update usage counters");
                }
            }

            OutboundEvent::Notify(notification) => {
                if let Err(e) = self.store.insert_notification(&notification).await {
                    tracing::error!(id = %notification.id, error = ?e, "failed to persist notification");
                    return;
                }

                if let Err(e) = self.transport.deliver(&notification).await {
                    tracing::warn!(id = %notification.id, error = ?e, "push delivery failed");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Mutex;

    use super::*;
    use crate::db::prelude::{
        Business, BusinessId, BusinessUsage, MemoryStore, Notification, NotificationKind, TenantId,
        UserId,
    };
    use crate::db::repositories::memory::SeedData;
    use crate::events::EventQueue;
    use crate::events::push::PushError;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingTransport {
        pub delivered: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn deliver(&self, notification: &Notification) -> Result<(), PushError> {
            self.delivered.lock().await.push(notification.clone());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingTransport;

    #[async_trait]
    impl PushTransport for FailingTransport {
        async fn deliver(&self, _: &Notification) -> Result<(), PushError> {
            Err(PushError::Rejected(http::StatusCode::BAD_GATEWAY))
        }
    }

    fn notification() -> Notification {
        Notification::new(
            TenantId::new(),
            UserId::new(),
            NotificationKind::AppointmentConfirmed,
            "see you at 14:00".into(),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_notify_persists_then_pushes() {
        let store = MemoryStore::new();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(Arc::new(store.clone()), transport.clone());

        let n = notification();
        dispatcher.handle(OutboundEvent::Notify(n.clone())).await;

        assert_eq!(store.notifications().await, vec![n.clone()]);
        assert_eq!(*transport.delivered.lock().await, vec![n]);
    }

    #[tokio::test]
    async fn test_push_failure_is_swallowed() {
        let store = MemoryStore::new();
        let dispatcher = Dispatcher::new(Arc::new(store.clone()), Arc::new(FailingTransport));

        dispatcher.handle(OutboundEvent::Notify(notification())).await;
        assert_eq!(store.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_usage_events_until_closed() {
        let store = MemoryStore::new();
        let business_id = BusinessId::new();
        let start = Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap();
        store
            .seed(SeedData {
                businesses: vec![Business {
                    id: business_id,
                    tenant_id: TenantId::new(),
                    name: "Fade Factory".into(),
                    plan: "free".into(),
                    usage: BusinessUsage::new(start),
                }],
                ..Default::default()
            })
            .await;

        let (queue, rx) = EventQueue::new();
        let handle = Dispatcher::new(
            Arc::new(store.clone()),
            Arc::new(RecordingTransport::default()),
        )
        .spawn(rx);

        queue.publish(OutboundEvent::BookingRecorded { business_id, at: start });
        queue.publish(OutboundEvent::BookingRecorded {
            business_id,
            at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        });
        // unknown business is logged and skipped
        queue.publish(OutboundEvent::BookingRecorded {
            business_id: BusinessId::new(),
            at: start,
        });
        drop(queue);
        handle.await.unwrap();

        let usage = store.get_business(business_id).await.unwrap().unwrap().usage;
        assert_eq!(usage.total_appointments, 2);
        assert_eq!(usage.appointments_this_month, 1);
    }
}
