use core::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::db::StoreResult;
use crate::db::prelude::{
    Appointment, AppointmentId, AppointmentStatus, Business, BusinessId, Customer, CustomerId,
    Employee, EmployeeId, Notification, Reward, RewardId, StaffKey, TenantContext, User, UserId,
};

pub mod memory;
pub mod pg;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentFilter {
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, appt: &Appointment) -> bool {
        self.date.is_none_or(|d| appt.date == d) && self.status.is_none_or(|s| appt.status == s)
    }
}

/// Persistence seam for the booking engine.
///
/// Every method that takes a [`TenantContext`] only sees records of that tenant. Writes that
/// touch both an appointment and its customer are committed together.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    async fn get_business(&self, id: BusinessId) -> StoreResult<Option<Business>>;

    /// Read-modify-write of the business usage counters; see
    /// [`BusinessUsage::record_booking`](crate::db::prelude::BusinessUsage::record_booking).
    async fn record_booking_usage(&self, id: BusinessId, at: DateTime<Utc>) -> StoreResult<()>;

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Option<Employee>>;

    /// Whether a non-cancelled appointment already holds `(date, time, staff)` for the tenant.
    async fn slot_taken(
        &self,
        ctx: &TenantContext,
        date: NaiveDate,
        time: &str,
        staff: &StaffKey,
    ) -> StoreResult<bool>;

    /// Times of every non-cancelled appointment on `date`, regardless of staff.
    async fn booked_times(&self, ctx: &TenantContext, date: NaiveDate) -> StoreResult<Vec<String>>;

    async fn get_appointment(
        &self,
        ctx: &TenantContext,
        id: AppointmentId,
    ) -> StoreResult<Option<Appointment>>;

    /// Unscoped lookup for the public rating endpoints, which carry no tenant.
    async fn find_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>>;

    async fn list_appointments(
        &self,
        ctx: &TenantContext,
        filter: &AppointmentFilter,
    ) -> StoreResult<Vec<Appointment>>;

    /// Inserts a new appointment and upserts the customer it was booked for.
    async fn insert_appointment(&self, appt: &Appointment, customer: &Customer) -> StoreResult<()>;

    async fn update_appointment(
        &self,
        appt: &Appointment,
        customer: Option<&Customer>,
    ) -> StoreResult<()>;

    async fn get_customer(&self, ctx: &TenantContext, id: CustomerId) -> StoreResult<Option<Customer>>;

    async fn find_customer_by_phone(
        &self,
        ctx: &TenantContext,
        phone: &str,
    ) -> StoreResult<Option<Customer>>;

    async fn count_completed(&self, ctx: &TenantContext, customer: CustomerId) -> StoreResult<i64>;

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()>;

    async fn list_rewards(&self, ctx: &TenantContext) -> StoreResult<Vec<Reward>>;
    async fn get_reward(&self, ctx: &TenantContext, id: RewardId) -> StoreResult<Option<Reward>>;

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
}
