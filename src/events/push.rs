use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::db::prelude::{AppointmentId, Notification, NotificationKind, UserId};

#[derive(Debug, Error)]
pub enum PushError {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error("push gateway responded with {0}")]
    Rejected(http::StatusCode),
}

/// Hands a persisted notification to whatever delivers it to devices.
#[async_trait]
pub trait PushTransport: Send + Sync + std::fmt::Debug {
    async fn deliver(&self, notification: &Notification) -> Result<(), PushError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload<'a> {
    recipient: UserId,
    kind: NotificationKind,
    title: &'a str,
    body: &'a str,
    appointment_id: Option<AppointmentId>,
}

impl<'a> From<&'a Notification> for PushPayload<'a> {
    fn from(n: &'a Notification) -> Self {
        Self {
            recipient: n.recipient,
            kind: n.kind,
            title: &n.title,
            body: &n.body,
            appointment_id: n.appointment_id,
        }
    }
}

/// POSTs each notification as JSON to an HTTP push gateway.
#[derive(Debug, Clone)]
pub struct WebPushGateway {
    client: reqwest::Client,
    url: String,
}

impl WebPushGateway {
    pub fn new(url: impl Into<String>) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushTransport for WebPushGateway {
    async fn deliver(&self, notification: &Notification) -> Result<(), PushError> {
        let res = self
            .client
            .post(&self.url)
            .json(&PushPayload::from(notification))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(PushError::Rejected(status));
        }

        Ok(())
    }
}

/// Used when no gateway is configured.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl PushTransport for LogTransport {
    async fn deliver(&self, notification: &Notification) -> Result<(), PushError> {
        tracing::info!(
            recipient = %notification.recipient,
            kind = ?notification.kind,
            title = %notification.title,
            "push delivery skipped, no gateway configured"
        );

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db::prelude::TenantId;

    #[test]
    fn test_payload_shape() {
        let n = Notification::new(
            TenantId::new(),
            UserId::new(),
            NotificationKind::BarberChanged,
            "Omar will now take your 14:00 appointment".into(),
            None,
            Utc::now(),
        );

        let value = serde_json::to_value(PushPayload::from(&n)).unwrap();
        assert_eq!(value["kind"], "barber_changed");
        assert_eq!(value["title"], "Your barber has changed");
        assert!(value["appointmentId"].is_null());
        assert_eq!(value["recipient"], n.recipient.to_string());
    }
}
