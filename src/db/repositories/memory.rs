use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::db::prelude::{
    Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, Business, BusinessId,
    Customer, CustomerId, Employee, EmployeeId, Notification, Reward, RewardId, StaffKey, Store,
    TenantContext, User, UserId,
};
use crate::db::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    businesses: HashMap<BusinessId, Business>,
    users: HashMap<UserId, User>,
    employees: HashMap<EmployeeId, Employee>,
    customers: HashMap<CustomerId, Customer>,
    appointments: HashMap<AppointmentId, Appointment>,
    rewards: HashMap<RewardId, Reward>,
    notifications: Vec<Notification>,
}

/// Directory records a memory-backed server starts with.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedData {
    pub businesses: Vec<Business>,
    pub users: Vec<User>,
    pub employees: Vec<Employee>,
    pub rewards: Vec<Reward>,
}

/// Process-local [`Store`] for development and tests. One lock guards all tables, so
/// every write is atomic with respect to every read.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_seed_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let raw = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| StoreError::SeedError(e.to_string()))?;
        let seed: SeedData =
            serde_json::from_slice(&raw).map_err(|e| StoreError::SeedError(e.to_string()))?;

        let store = Self::new();
        store.seed(seed).await;

        Ok(store)
    }

    pub async fn seed(&self, seed: SeedData) {
        let mut tables = self.tables.write().await;
        tracing::info!(
            businesses = seed.businesses.len(),
            users = seed.users.len(),
            employees = seed.employees.len(),
            rewards = seed.rewards.len(),
            "seeding memory store"
        );

        tables
            .businesses
            .extend(seed.businesses.into_iter().map(|b| (b.id, b)));
        tables.users.extend(seed.users.into_iter().map(|u| (u.id, u)));
        tables
            .employees
            .extend(seed.employees.into_iter().map(|e| (e.id, e)));
        tables
            .rewards
            .extend(seed.rewards.into_iter().map(|r| (r.id, r)));
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.tables.read().await.notifications.clone()
    }
}

fn holds_slot(appt: &Appointment, ctx: &TenantContext, date: NaiveDate, time: &str) -> bool {
    appt.tenant_id == ctx.tenant_id
        && appt.date == date
        && appt.time == time
        && appt.status != AppointmentStatus::Cancelled
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_business(&self, id: BusinessId) -> StoreResult<Option<Business>> {
        Ok(self.tables.read().await.businesses.get(&id).cloned())
    }

    #[instrument(skip(self))]
    async fn record_booking_usage(&self, id: BusinessId, at: DateTime<Utc>) -> StoreResult<()> {
        match self.tables.write().await.businesses.get_mut(&id) {
            Some(business) => business.usage.record_booking(at),
            None => tracing::warn!(business_id = %id, "usage update for unknown business"),
        }

        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Option<Employee>> {
        Ok(self.tables.read().await.employees.get(&id).cloned())
    }

    async fn slot_taken(
        &self,
        ctx: &TenantContext,
        date: NaiveDate,
        time: &str,
        staff: &StaffKey,
    ) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .appointments
            .values()
            .any(|a| holds_slot(a, ctx, date, time) && a.staff_key() == *staff))
    }

    async fn booked_times(&self, ctx: &TenantContext, date: NaiveDate) -> StoreResult<Vec<String>> {
        let tables = self.tables.read().await;
        let mut times = tables
            .appointments
            .values()
            .filter(|a| {
                a.tenant_id == ctx.tenant_id
                    && a.date == date
                    && a.status != AppointmentStatus::Cancelled
            })
            .map(|a| a.time.clone())
            .collect::<Vec<_>>();

        times.sort();
        times.dedup();
        Ok(times)
    }

    async fn get_appointment(
        &self,
        ctx: &TenantContext,
        id: AppointmentId,
    ) -> StoreResult<Option<Appointment>> {
        Ok(self
            .tables
            .read()
            .await
            .appointments
            .get(&id)
            .filter(|a| a.tenant_id == ctx.tenant_id)
            .cloned())
    }

    async fn find_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn list_appointments(
        &self,
        ctx: &TenantContext,
        filter: &AppointmentFilter,
    ) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut found = tables
            .appointments
            .values()
            .filter(|a| a.tenant_id == ctx.tenant_id && filter.matches(a))
            .cloned()
            .collect::<Vec<_>>();

        found.sort_by(|a, b| (a.date, &a.time).cmp(&(b.date, &b.time)));
        Ok(found)
    }

    #[instrument(skip(self, appt, customer), fields(appointment_id = %appt.id))]
    async fn insert_appointment(&self, appt: &Appointment, customer: &Customer) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.customers.insert(customer.id, customer.clone());
        tables.appointments.insert(appt.id, appt.clone());

        Ok(())
    }

    #[instrument(skip(self, appt, customer), fields(appointment_id = %appt.id))]
    async fn update_appointment(
        &self,
        appt: &Appointment,
        customer: Option<&Customer>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.appointments.insert(appt.id, appt.clone());
        if let Some(customer) = customer {
            tables.customers.insert(customer.id, customer.clone());
        }

        Ok(())
    }

    async fn get_customer(&self, ctx: &TenantContext, id: CustomerId) -> StoreResult<Option<Customer>> {
        Ok(self
            .tables
            .read()
            .await
            .customers
            .get(&id)
            .filter(|c| c.tenant_id == ctx.tenant_id)
            .cloned())
    }

    async fn find_customer_by_phone(
        &self,
        ctx: &TenantContext,
        phone: &str,
    ) -> StoreResult<Option<Customer>> {
        Ok(self
            .tables
            .read()
            .await
            .customers
            .values()
            .find(|c| c.tenant_id == ctx.tenant_id && c.phone == phone)
            .cloned())
    }

    async fn count_completed(&self, ctx: &TenantContext, customer: CustomerId) -> StoreResult<i64> {
        let count = self
            .tables
            .read()
            .await
            .appointments
            .values()
            .filter(|a| {
                a.tenant_id == ctx.tenant_id
                    && a.customer_id == customer
                    && a.status == AppointmentStatus::Completed
            })
            .count();

        Ok(count as i64)
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .customers
            .insert(customer.id, customer.clone());

        Ok(())
    }

    async fn list_rewards(&self, ctx: &TenantContext) -> StoreResult<Vec<Reward>> {
        let tables = self.tables.read().await;
        let mut rewards = tables
            .rewards
            .values()
            .filter(|r| r.tenant_id == ctx.tenant_id && r.business_id == ctx.business_id && r.active)
            .cloned()
            .collect::<Vec<_>>();

        rewards.sort_by_key(|r| r.points_cost);
        Ok(rewards)
    }

    async fn get_reward(&self, ctx: &TenantContext, id: RewardId) -> StoreResult<Option<Reward>> {
        Ok(self
            .tables
            .read()
            .await
            .rewards
            .get(&id)
            .filter(|r| r.tenant_id == ctx.tenant_id)
            .cloned())
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .notifications
            .push(notification.clone());

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::models::appointment::test::sample;

    #[tokio::test]
    async fn test_slot_taken_ignores_cancelled_and_other_staff() {
        let store = MemoryStore::new();
        let appt = sample(AppointmentStatus::Pending);
        let ctx = appt.context();
        let customer = crate::db::models::customer::test::sample();
        store.insert_appointment(&appt, &customer).await.unwrap();

        let omar = StaffKey::Named("omar".into());
        assert!(store
            .slot_taken(&ctx, appt.date, "14:00", &StaffKey::Unassigned)
            .await
            .unwrap());
        assert!(!store.slot_taken(&ctx, appt.date, "14:00", &omar).await.unwrap());
        assert!(!store
            .slot_taken(&ctx, appt.date, "14:30", &StaffKey::Unassigned)
            .await
            .unwrap());

        let other_tenant = TenantContext::new(crate::db::models::TenantId::new(), ctx.business_id);
        assert!(!store
            .slot_taken(&other_tenant, appt.date, "14:00", &StaffKey::Unassigned)
            .await
            .unwrap());

        let mut cancelled = appt.clone();
        cancelled.status = AppointmentStatus::Cancelled;
        store.update_appointment(&cancelled, None).await.unwrap();
        assert!(!store
            .slot_taken(&ctx, appt.date, "14:00", &StaffKey::Unassigned)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_seed_from_json() {
        let business_id = BusinessId::new();
        let tenant_id = crate::db::models::TenantId::new();
        let raw = serde_json::json!({
            "businesses": [{
                "id": business_id,
                "tenantId": tenant_id,
                "name": "Fade Factory",
                "plan": "pro",
                "usage": {
                    "totalAppointments": 3,
                    "appointmentsThisMonth": 1,
                    "lastResetDate": "2026-01-01T00:00:00Z"
                }
            }]
        });

        let seed: SeedData = serde_json::from_value(raw).unwrap();
        let store = MemoryStore::new();
        store.seed(seed).await;

        let business = store.get_business(business_id).await.unwrap().unwrap();
        assert_eq!(business.usage.total_appointments, 3);
        assert_eq!(business.context().tenant_id, tenant_id);
    }
}
