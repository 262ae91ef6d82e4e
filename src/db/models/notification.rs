use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{AppointmentId, NotificationId, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentConfirmed,
    EmployeeConfirmed,
    BarberChanged,
    PointsActivated,
}

/// A message for a customer's linked account, persisted before it is handed to the push
/// transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub tenant_id: TenantId,
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub appointment_id: Option<AppointmentId>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        tenant_id: TenantId,
        recipient: UserId,
        kind: NotificationKind,
        body: String,
        appointment_id: Option<AppointmentId>,
        now: DateTime<Utc>,
    ) -> Self {
        let title = match kind {
            NotificationKind::AppointmentConfirmed => "Appointment confirmed",
            NotificationKind::EmployeeConfirmed => "Your barber is ready",
            NotificationKind::BarberChanged => "Your barber has changed",
            NotificationKind::PointsActivated => "Points activated",
        };

        Self {
            id: NotificationId::new(),
            tenant_id,
            recipient,
            kind,
            title: title.to_owned(),
            body,
            appointment_id,
            created_at: now,
        }
    }
}
