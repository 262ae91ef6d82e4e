use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Result as SqlxResult, Transaction};
use tracing::instrument;

use crate::db::StoreResult;
use crate::db::prelude::{
    Appointment, AppointmentFilter, AppointmentId, Business, BusinessId,
    Customer, CustomerId, Employee, EmployeeId, Notification, Reward, RewardId, StaffKey, Store,
    TenantContext, User, UserId,
};

mod sql_fragment {
    pub const APPOINTMENT_FIELDS: &str = r#"
        id,
        tenant_id,
        business_id,
        customer_id,
        customer_name,
        customer_phone,
        service_id,
        service_name,
        employee_id,
        employee_name,
        date,
        time,
        duration,
        notes,
        source,
        status,
        confirmations,
        completion,
        cancellation,
        customer_rating,
        employee_rating,
        created_at,
        updated_at
    "#;

    pub const CUSTOMER_FIELDS: &str = r#"
        id,
        tenant_id,
        business_id,
        user_id,
        name,
        phone,
        loyalty_points,
        pending_points,
        loyalty_tier,
        points_history,
        pending_rewards,
        created_at,
        updated_at
    "#;

    pub const BUSINESS_FIELDS: &str = r#"
        id,
        tenant_id,
        name,
        plan,
        total_appointments,
        appointments_this_month,
        last_reset_date
    "#;
}

use sql_fragment::{APPOINTMENT_FIELDS, BUSINESS_FIELDS, CUSTOMER_FIELDS};

/// A transaction that has to be committed explicitly; dropping it rolls back.
pub struct Tx {
    inner: Option<Transaction<'static, Postgres>>,
}

impl Tx {
    #[instrument(skip(pool))]
    pub async fn begin(pool: &'static PgPool) -> SqlxResult<Self> {
        let inner = pool.begin().await?;
        Ok(Self { inner: Some(inner) })
    }

    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> SqlxResult<()> {
        match self.inner.take() {
            Some(tx) => tx.commit().await,
            None => Err(sqlx::Error::Protocol("Transaction already completed".into())),
        }
    }

    fn inner_mut(&mut self) -> SqlxResult<&mut Transaction<'static, Postgres>> {
        self.inner
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("Transaction already completed".into()))
    }

    #[instrument(skip(self, item), fields(customer_id = %item.id))]
    pub async fn upsert_customer(&mut self, item: &Customer) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer (
                id,
                tenant_id,
                business_id,
                user_id,
                name,
                phone,
                loyalty_points,
                pending_points,
                loyalty_tier,
                points_history,
                pending_rewards,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id)
            DO UPDATE SET
                user_id = $4,
                name = $5,
                loyalty_points = $7,
                pending_points = $8,
                loyalty_tier = $9,
                points_history = $10,
                pending_rewards = $11,
                updated_at = $13
            "#,
        )
        .bind(item.id)
        .bind(item.tenant_id)
        .bind(item.business_id)
        .bind(item.user_id)
        .bind(&item.name)
        .bind(&item.phone)
        .bind(item.loyalty_points)
        .bind(item.pending_points)
        .bind(item.loyalty_tier)
        .bind(Json(&item.points_history))
        .bind(Json(&item.pending_rewards))
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, item), fields(appointment_id = %item.id))]
    pub async fn insert_appointment(&mut self, item: &Appointment) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO appointment (
                id,
                tenant_id,
                business_id,
                customer_id,
                customer_name,
                customer_phone,
                service_id,
                service_name,
                employee_id,
                employee_name,
                staff_key,
                date,
                time,
                duration,
                notes,
                source,
                status,
                confirmations,
                completion,
                cancellation,
                customer_rating,
                employee_rating,
                created_at,
                updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            "#,
        )
        .bind(item.id)
        .bind(item.tenant_id)
        .bind(item.business_id)
        .bind(item.customer_id)
        .bind(&item.customer_name)
        .bind(&item.customer_phone)
        .bind(item.service_id)
        .bind(&item.service_name)
        .bind(item.employee_id)
        .bind(&item.employee_name)
        .bind(item.staff_key().to_string())
        .bind(item.date)
        .bind(&item.time)
        .bind(item.duration)
        .bind(&item.notes)
        .bind(item.source)
        .bind(item.status)
        .bind(Json(&item.confirmations))
        .bind(Json(&item.completion))
        .bind(Json(&item.cancellation))
        .bind(Json(&item.customer_rating))
        .bind(Json(&item.employee_rating))
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }

    /// Writes back every mutable column of an appointment. Identity and booking-time
    /// snapshots other than the assigned employee never change after insert.
    #[instrument(skip(self, item), fields(appointment_id = %item.id, status = %item.status))]
    pub async fn update_appointment(&mut self, item: &Appointment) -> SqlxResult<()> {
        sqlx::query(
            r#"
            UPDATE appointment
            SET
                employee_id = $2,
                employee_name = $3,
                staff_key = $4,
                status = $5,
                confirmations = $6,
                completion = $7,
                cancellation = $8,
                customer_rating = $9,
                employee_rating = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(item.employee_id)
        .bind(&item.employee_name)
        .bind(item.staff_key().to_string())
        .bind(item.status)
        .bind(Json(&item.confirmations))
        .bind(Json(&item.completion))
        .bind(Json(&item.cancellation))
        .bind(Json(&item.customer_rating))
        .bind(Json(&item.employee_rating))
        .bind(item.updated_at)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: &'static PgPool,
}

impl PgStore {
    pub fn new(pool: &'static PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn get_business(&self, id: BusinessId) -> StoreResult<Option<Business>> {
        Ok(sqlx::query_as::<_, Business>(&format!(
            "SELECT {BUSINESS_FIELDS} FROM business WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn record_booking_usage(&self, id: BusinessId, at: DateTime<Utc>) -> StoreResult<()> {
        let Some(mut business) = self.get_business(id).await? else {
            tracing::warn!(business_id = %id, "usage update for unknown business");
            return Ok(());
        };

        business.usage.record_booking(at);

        sqlx::query(
            r#"
            UPDATE business
            SET
                total_appointments = $2,
                appointments_this_month = $3,
                last_reset_date = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(business.usage.total_appointments)
        .bind(business.usage.appointments_this_month)
        .bind(business.usage.last_reset_date)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, tenant_id, business_id, name, role FROM app_user WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Option<Employee>> {
        Ok(sqlx::query_as::<_, Employee>(
            "SELECT id, tenant_id, business_id, name, active FROM employee WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn slot_taken(
        &self,
        ctx: &TenantContext,
        date: NaiveDate,
        time: &str,
        staff: &StaffKey,
    ) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM appointment
                WHERE tenant_id = $1
                    AND date = $2
                    AND time = $3
                    AND staff_key = $4
                    AND status <> 'cancelled'
            )
            "#,
        )
        .bind(ctx.tenant_id)
        .bind(date)
        .bind(time)
        .bind(staff.to_string())
        .fetch_one(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn booked_times(&self, ctx: &TenantContext, date: NaiveDate) -> StoreResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT time FROM appointment
            WHERE tenant_id = $1 AND date = $2 AND status <> 'cancelled'
            "#,
        )
        .bind(ctx.tenant_id)
        .bind(date)
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn get_appointment(
        &self,
        ctx: &TenantContext,
        id: AppointmentId,
    ) -> StoreResult<Option<Appointment>> {
        Ok(sqlx::query_as::<_, Appointment>(&format!(
            "SELECT {APPOINTMENT_FIELDS} FROM appointment WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(ctx.tenant_id)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn find_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>> {
        Ok(sqlx::query_as::<_, Appointment>(&format!(
            "SELECT {APPOINTMENT_FIELDS} FROM appointment WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn list_appointments(
        &self,
        ctx: &TenantContext,
        filter: &AppointmentFilter,
    ) -> StoreResult<Vec<Appointment>> {
        Ok(sqlx::query_as::<_, Appointment>(&format!(
            r#"
            SELECT {APPOINTMENT_FIELDS} FROM appointment
            WHERE tenant_id = $1
                AND ($2::date IS NULL OR date = $2)
                AND ($3::appointment_status IS NULL OR status = $3)
            ORDER BY date ASC, time ASC
            "#
        ))
        .bind(ctx.tenant_id)
        .bind(filter.date)
        .bind(filter.status)
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self, appt, customer), fields(appointment_id = %appt.id))]
    async fn insert_appointment(&self, appt: &Appointment, customer: &Customer) -> StoreResult<()> {
        let mut tx = Tx::begin(self.pool).await?;
        tx.upsert_customer(customer).await?;
        tx.insert_appointment(appt).await?;
        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self, appt, customer), fields(appointment_id = %appt.id))]
    async fn update_appointment(
        &self,
        appt: &Appointment,
        customer: Option<&Customer>,
    ) -> StoreResult<()> {
        let mut tx = Tx::begin(self.pool).await?;
        tx.update_appointment(appt).await?;
        if let Some(customer) = customer {
            tx.upsert_customer(customer).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_customer(&self, ctx: &TenantContext, id: CustomerId) -> StoreResult<Option<Customer>> {
        Ok(sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_FIELDS} FROM customer WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(ctx.tenant_id)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn find_customer_by_phone(
        &self,
        ctx: &TenantContext,
        phone: &str,
    ) -> StoreResult<Option<Customer>> {
        Ok(sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_FIELDS} FROM customer WHERE tenant_id = $1 AND phone = $2"
        ))
        .bind(ctx.tenant_id)
        .bind(phone)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn count_completed(&self, ctx: &TenantContext, customer: CustomerId) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM appointment
            WHERE tenant_id = $1 AND customer_id = $2 AND status = 'completed'
            "#,
        )
        .bind(ctx.tenant_id)
        .bind(customer)
        .fetch_one(self.pool)
        .await?)
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id))]
    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut tx = Tx::begin(self.pool).await?;
        tx.upsert_customer(customer).await?;
        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_rewards(&self, ctx: &TenantContext) -> StoreResult<Vec<Reward>> {
        Ok(sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, tenant_id, business_id, name, points_cost, active FROM reward
            WHERE tenant_id = $1 AND business_id = $2 AND active
            ORDER BY points_cost ASC
            "#,
        )
        .bind(ctx.tenant_id)
        .bind(ctx.business_id)
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn get_reward(&self, ctx: &TenantContext, id: RewardId) -> StoreResult<Option<Reward>> {
        Ok(sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, tenant_id, business_id, name, points_cost, active FROM reward
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(ctx.tenant_id)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self, notification), fields(notification_id = %notification.id))]
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification (
                id,
                tenant_id,
                recipient,
                kind,
                title,
                body,
                appointment_id,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.tenant_id)
        .bind(notification.recipient)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.appointment_id)
        .bind(notification.created_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

