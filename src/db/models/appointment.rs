use core::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::{
    AppointmentId, BusinessId, CustomerId, EmployeeId, ServiceId, TenantContext, TenantId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "appointment_status", rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    AppointmentConfirmed,
    /// Kept for records written by older clients; the engine moves straight to
    /// `FullyConfirmed` once staff confirm.
    EmployeeConfirmed,
    FullyConfirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::AppointmentConfirmed => "appointment_confirmed",
            Self::EmployeeConfirmed => "employee_confirmed",
            Self::FullyConfirmed => "fully_confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "booking_source", rename_all = "snake_case")]
pub enum BookingSource {
    Public,
    Staff,
}

/// Confirmation actions that can be refused for the current status, named as on the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ConfirmAppointment,
    ConfirmEmployee,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::ConfirmAppointment => "confirm-appointment",
            Action::ConfirmEmployee => "confirm-employee",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub confirmed: bool,
    pub at: Option<DateTime<Utc>>,
    pub by: Option<String>,
}

impl Confirmation {
    fn stamp(by: &str, at: DateTime<Utc>) -> Self {
        Self {
            confirmed: true,
            at: Some(at),
            by: Some(by.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmations {
    pub appointment_confirmed: Confirmation,
    pub employee_confirmed: Confirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub completed_by: String,
    pub completed_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_by: String,
    pub cancelled_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub score: u8,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingKind {
    Customer,
    Employee,
}

/// The staff member a slot is held against. Conflicts are only detected between appointments
/// that resolve to the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaffKey {
    Employee(EmployeeId),
    Named(String),
    Unassigned,
}

impl StaffKey {
    pub fn resolve(employee_id: Option<EmployeeId>, staff_name: Option<&str>) -> Self {
        match (employee_id, staff_name.map(str::trim)) {
            (Some(id), _) => Self::Employee(id),
            (None, Some(name)) if !name.is_empty() => Self::Named(name.to_lowercase()),
            _ => Self::Unassigned,
        }
    }
}

impl fmt::Display for StaffKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaffKey::Employee(id) => write!(f, "employee:{id}"),
            StaffKey::Named(name) => write!(f, "name:{name}"),
            StaffKey::Unassigned => f.write_str("unassigned"),
        }
    }
}

/// A booked appointment.
///
/// `customer_name`, `customer_phone`, `service_name` and `employee_name` are snapshots taken
/// when the appointment was booked (or, for the employee, when it was last reassigned). They
/// are deliberately not refreshed from the customer, service or employee records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub tenant_id: TenantId,
    pub business_id: BusinessId,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_phone: String,
    pub service_id: Option<ServiceId>,
    pub service_name: String,
    pub employee_id: Option<EmployeeId>,
    pub employee_name: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub duration: i32,
    pub notes: Option<String>,
    pub source: BookingSource,
    pub status: AppointmentStatus,
    #[sqlx(json)]
    pub confirmations: Confirmations,
    #[sqlx(json)]
    pub completion: Option<Completion>,
    #[sqlx(json)]
    pub cancellation: Option<Cancellation>,
    #[sqlx(json)]
    pub customer_rating: Option<Rating>,
    #[sqlx(json)]
    pub employee_rating: Option<Rating>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type TransitionResult = core::result::Result<(), TransitionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("appointment is already {0} and cannot be changed")]
    Terminal(AppointmentStatus),

    #[error("cannot {action} an appointment that is {from}")]
    NotAllowed {
        from: AppointmentStatus,
        action: Action,
    },

    #[error("the appointment must be confirmed before the employee can confirm it")]
    AppointmentNotConfirmed,

    #[error("only completed appointments can be rated")]
    NotCompleted,
}

impl Appointment {
    pub fn context(&self) -> TenantContext {
        TenantContext::new(self.tenant_id, self.business_id)
    }

    pub fn staff_key(&self) -> StaffKey {
        StaffKey::resolve(self.employee_id, self.employee_name.as_deref())
    }

    fn guard_terminal(&self) -> TransitionResult {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }

        Ok(())
    }

    pub fn confirm_appointment(&mut self, by: &str, now: DateTime<Utc>) -> TransitionResult {
        self.guard_terminal()?;
        match self.status {
            AppointmentStatus::Pending | AppointmentStatus::Confirmed => {
                self.confirmations.appointment_confirmed = Confirmation::stamp(by, now);
                self.status = AppointmentStatus::AppointmentConfirmed;
                self.updated_at = now;
                Ok(())
            }
            from => Err(TransitionError::NotAllowed {
                from,
                action: Action::ConfirmAppointment,
            }),
        }
    }

    pub fn confirm_employee(&mut self, by: &str, now: DateTime<Utc>) -> TransitionResult {
        self.guard_terminal()?;
        if !self.confirmations.appointment_confirmed.confirmed {
            return Err(TransitionError::AppointmentNotConfirmed);
        }

        if self.confirmations.employee_confirmed.confirmed {
            return Err(TransitionError::NotAllowed {
                from: self.status,
                action: Action::ConfirmEmployee,
            });
        }

        self.confirmations.employee_confirmed = Confirmation::stamp(by, now);
        self.status = AppointmentStatus::FullyConfirmed;
        self.updated_at = now;
        Ok(())
    }

    /// Reassigns the appointment and restarts the confirmation sequence.
    pub fn change_barber(
        &mut self,
        employee_id: Option<EmployeeId>,
        employee_name: String,
        now: DateTime<Utc>,
    ) -> TransitionResult {
        self.guard_terminal()?;
        self.employee_id = employee_id;
        self.employee_name = Some(employee_name);
        self.confirmations = Confirmations::default();
        self.status = AppointmentStatus::Confirmed;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, by: &str, reason: Option<String>, now: DateTime<Utc>) -> TransitionResult {
        self.guard_terminal()?;
        self.status = AppointmentStatus::Cancelled;
        self.cancellation = Some(Cancellation {
            cancelled_by: by.to_owned(),
            cancelled_at: now,
            reason,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, completion: Completion) -> TransitionResult {
        self.guard_terminal()?;
        self.status = AppointmentStatus::Completed;
        self.updated_at = completion.completed_at;
        self.completion = Some(completion);
        Ok(())
    }

    pub fn rate(&mut self, kind: RatingKind, rating: Rating) -> TransitionResult {
        if self.status != AppointmentStatus::Completed {
            return Err(TransitionError::NotCompleted);
        }

        self.updated_at = rating.at;
        match kind {
            RatingKind::Customer => self.customer_rating = Some(rating),
            RatingKind::Employee => self.employee_rating = Some(rating),
        }

        Ok(())
    }
}
