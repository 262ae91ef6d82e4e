//! The appointment lifecycle: booking, the two confirmations, reassignment, cancellation and
//! completion, plus the loyalty reads and writes that hang off them.
//!
//! Every operation is scoped by an explicit [`TenantContext`], taken either from the
//! authenticated [`Actor`] or from the business named on a public request. Side effects go
//! through the [`EventQueue`] after the primary write and never fail the operation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::prelude::{
    Actor, Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, BookingSource,
    Business, BusinessId, Completion, Confirmations, Customer, CustomerId, LedgerError,
    Notification, NotificationKind, Rating, RatingKind, Reward, StaffKey, Store, StoreError,
    TenantContext, TransitionError,
};
use crate::events::{EventQueue, OutboundEvent};

pub mod request;
pub mod slots;

use request::{
    BookingRequest, CancelRequest, ChangeBarberRequest, CompleteRequest, ListQuery, NewBooking,
    RatingRequest, RedeemRequest, RewardQuery, SlotQuery, parse_date, parse_score, required,
};
use slots::Slot;

pub type BookingResult<T> = core::result::Result<T, BookingError>;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("the {time} slot on {date} is already booked")]
    SlotTaken { date: NaiveDate, time: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("staff access required")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedAppointment {
    pub appointment: Appointment,
    /// Points moved from pending to confirmed; zero when the appointment funded no grant.
    pub points_activated: i64,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    store: Arc<dyn Store>,
    events: EventQueue,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn Store>, events: EventQueue) -> Self {
        Self { store, events }
    }

    #[instrument(skip(self, req))]
    pub async fn book_public(&self, req: BookingRequest) -> BookingResult<Appointment> {
        let business_id = req
            .business_id
            .ok_or_else(|| BookingError::Validation("businessId is required".into()))?;
        let business = self.business(business_id).await?;

        let booking = req.validate()?;
        self.book(business.context(), booking, BookingSource::Public)
            .await
    }

    #[instrument(skip(self, actor, req), fields(actor = %actor.label()))]
    pub async fn book_staff(&self, actor: &Actor, req: BookingRequest) -> BookingResult<Appointment> {
        let ctx = staff_context(actor)?;
        let booking = req.validate()?;

        self.book(ctx, booking, BookingSource::Staff).await
    }

    async fn book(
        &self,
        ctx: TenantContext,
        booking: NewBooking,
        source: BookingSource,
    ) -> BookingResult<Appointment> {
        let now = Utc::now();

        let employee_name = match booking.employee_id {
            Some(id) => {
                let employee = self
                    .store
                    .get_employee(id)
                    .await?
                    .filter(|e| e.tenant_id == ctx.tenant_id)
                    .ok_or(BookingError::NotFound("employee"))?;
                booking.employee_name.or(Some(employee.name))
            }
            None => booking.employee_name,
        };

        // check-then-insert; two concurrent requests can both pass
        let staff = StaffKey::resolve(booking.employee_id, employee_name.as_deref());
        if self
            .store
            .slot_taken(&ctx, booking.date, &booking.time, &staff)
            .await?
        {
            tracing::debug!(%staff, date = %booking.date, time = %booking.time, "slot conflict");
            return Err(BookingError::SlotTaken {
                date: booking.date,
                time: booking.time,
            });
        }

        let mut customer = match self
            .store
            .find_customer_by_phone(&ctx, &booking.customer_phone)
            .await?
        {
            Some(existing) => existing,
            None => Customer::new(
                ctx,
                booking.customer_name.clone(),
                booking.customer_phone.clone(),
                now,
            ),
        };

        let appt = Appointment {
            id: AppointmentId::new(),
            tenant_id: ctx.tenant_id,
            business_id: ctx.business_id,
            customer_id: customer.id,
            customer_name: booking.customer_name,
            customer_phone: booking.customer_phone,
            service_id: booking.service_id,
            service_name: booking.service_name,
            employee_id: booking.employee_id,
            employee_name,
            date: booking.date,
            time: booking.time,
            duration: booking.duration,
            notes: booking.notes,
            source,
            status: match source {
                BookingSource::Public => AppointmentStatus::Pending,
                BookingSource::Staff => AppointmentStatus::Confirmed,
            },
            confirmations: Confirmations::default(),
            completion: None,
            cancellation: None,
            customer_rating: None,
            employee_rating: None,
            created_at: now,
            updated_at: now,
        };

        if source == BookingSource::Public {
            let completed = self.store.count_completed(&ctx, customer.id).await?;
            let points = Customer::booking_grant(completed);
            customer.grant_pending(
                appt.id,
                points,
                format!("Booking: {} on {}", appt.service_name, appt.date),
                now,
            )?;
        }

        self.store.insert_appointment(&appt, &customer).await?;
        tracing::info!(appointment_id = %appt.id, ?source, "appointment booked");

        self.events.publish(OutboundEvent::BookingRecorded {
            business_id: ctx.business_id,
            at: now,
        });

        Ok(appt)
    }

    #[instrument(skip(self))]
    pub async fn available_slots(&self, query: SlotQuery) -> BookingResult<Vec<Slot>> {
        let business_id = query
            .business_id
            .ok_or_else(|| BookingError::Validation("businessId is required".into()))?;
        let date = parse_date(&required(query.date, "date")?)?;
        let business = self.business(business_id).await?;

        let booked = self.store.booked_times(&business.context(), date).await?;
        Ok(slots::mark_booked(&booked))
    }

    pub async fn get(&self, actor: &Actor, id: AppointmentId) -> BookingResult<Appointment> {
        let ctx = staff_context(actor)?;
        self.appointment(&ctx, id).await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.label()))]
    pub async fn list(&self, actor: &Actor, query: ListQuery) -> BookingResult<Vec<Appointment>> {
        let ctx = staff_context(actor)?;
        let filter = AppointmentFilter {
            date: query.date.as_deref().map(parse_date).transpose()?,
            status: query.status,
        };

        Ok(self.store.list_appointments(&ctx, &filter).await?)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.label()))]
    pub async fn confirm_appointment(
        &self,
        actor: &Actor,
        id: AppointmentId,
    ) -> BookingResult<Appointment> {
        let ctx = staff_context(actor)?;
        let mut appt = self.appointment(&ctx, id).await?;

        appt.confirm_appointment(&actor.label(), Utc::now())?;
        self.store.update_appointment(&appt, None).await?;

        let body = format!(
            "Your {} appointment on {} at {} is confirmed",
            appt.service_name, appt.date, appt.time
        );
        self.notify_customer(&appt, NotificationKind::AppointmentConfirmed, body)
            .await;

        Ok(appt)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.label()))]
    pub async fn confirm_employee(
        &self,
        actor: &Actor,
        id: AppointmentId,
    ) -> BookingResult<Appointment> {
        let ctx = staff_context(actor)?;
        let mut appt = self.appointment(&ctx, id).await?;

        appt.confirm_employee(&actor.label(), Utc::now())?;
        self.store.update_appointment(&appt, None).await?;

        let body = format!(
            "{} has confirmed your appointment on {} at {}",
            appt.employee_name.as_deref().unwrap_or("Your barber"),
            appt.date,
            appt.time
        );
        self.notify_customer(&appt, NotificationKind::EmployeeConfirmed, body)
            .await;

        Ok(appt)
    }

    #[instrument(skip(self, actor, req), fields(actor = %actor.label()))]
    pub async fn change_barber(
        &self,
        actor: &Actor,
        id: AppointmentId,
        req: ChangeBarberRequest,
    ) -> BookingResult<Appointment> {
        let ctx = staff_context(actor)?;
        let mut appt = self.appointment(&ctx, id).await?;

        let name = match req.employee_id {
            Some(employee_id) => {
                let employee = self
                    .store
                    .get_employee(employee_id)
                    .await?
                    .filter(|e| e.tenant_id == ctx.tenant_id)
                    .ok_or(BookingError::NotFound("employee"))?;

                match req.employee_name.filter(|n| !n.trim().is_empty()) {
                    Some(name) => name,
                    None => employee.name,
                }
            }
            None => required(req.employee_name, "employeeName")?,
        };

        // the appointment itself holds the current key, so only a different one is checked
        let staff = StaffKey::resolve(req.employee_id, Some(name.as_str()));
        if staff != appt.staff_key()
            && self
                .store
                .slot_taken(&ctx, appt.date, &appt.time, &staff)
                .await?
        {
            tracing::debug!(%staff, date = %appt.date, time = %appt.time, "reassignment conflict");
            return Err(BookingError::SlotTaken {
                date: appt.date,
                time: appt.time,
            });
        }

        appt.change_barber(req.employee_id, name.clone(), Utc::now())?;
        self.store.update_appointment(&appt, None).await?;

        let body = format!(
            "{name} will now take your appointment on {} at {}",
            appt.date, appt.time
        );
        self.notify_customer(&appt, NotificationKind::BarberChanged, body)
            .await;

        Ok(appt)
    }

    /// Cancels the appointment. The customer's ledger is left as it is: a pending grant stays
    /// pending.
    #[instrument(skip(self, actor, req), fields(actor = %actor.label()))]
    pub async fn cancel(
        &self,
        actor: &Actor,
        id: AppointmentId,
        req: CancelRequest,
    ) -> BookingResult<Appointment> {
        let ctx = staff_context(actor)?;
        let mut appt = self.appointment(&ctx, id).await?;

        appt.cancel(&actor.label(), req.reason, Utc::now())?;
        self.store.update_appointment(&appt, None).await?;

        Ok(appt)
    }

    /// Completes the appointment and activates the pending grant it funded, if any. The
    /// appointment and customer are written together.
    #[instrument(skip(self, actor, req), fields(actor = %actor.label()))]
    pub async fn complete(
        &self,
        actor: &Actor,
        id: AppointmentId,
        req: CompleteRequest,
    ) -> BookingResult<CompletedAppointment> {
        let ctx = staff_context(actor)?;
        let mut appt = self.appointment(&ctx, id).await?;
        let now = Utc::now();

        let rating = req.rating.map(parse_score).transpose()?;
        appt.complete(Completion {
            completed_by: actor.label(),
            completed_at: now,
            notes: req.notes,
            rating,
        })?;

        let mut customer = self.store.get_customer(&ctx, appt.customer_id).await?;
        let activated = customer
            .as_mut()
            .and_then(|c| c.activate_pending(appt.id, now));

        let Some(points) = activated else {
            self.store.update_appointment(&appt, None).await?;
            return Ok(CompletedAppointment {
                appointment: appt,
                points_activated: 0,
            });
        };

        self.store
            .update_appointment(&appt, customer.as_ref())
            .await?;
        tracing::info!(appointment_id = %appt.id, points, "pending points activated");

        if let Some(customer) = &customer {
            let body = format!(
                "{points} points are now available. Your balance is {}",
                customer.loyalty_points
            );
            self.notify(customer, &appt, NotificationKind::PointsActivated, body, now);
        }

        Ok(CompletedAppointment {
            appointment: appt,
            points_activated: points,
        })
    }

    /// Attaches post-visit feedback. Public, so the appointment is looked up by id alone.
    #[instrument(skip(self, req))]
    pub async fn rate(
        &self,
        id: AppointmentId,
        kind: RatingKind,
        req: RatingRequest,
    ) -> BookingResult<Appointment> {
        let score = req
            .score
            .ok_or_else(|| BookingError::Validation("score is required".into()))?;

        let mut appt = self
            .store
            .find_appointment(id)
            .await?
            .ok_or(BookingError::NotFound("appointment"))?;

        appt.rate(
            kind,
            Rating {
                score: parse_score(score)?,
                comment: req.comment.filter(|c| !c.trim().is_empty()),
                at: Utc::now(),
            },
        )?;
        self.store.update_appointment(&appt, None).await?;

        Ok(appt)
    }

    pub async fn customer_loyalty(&self, actor: &Actor, id: CustomerId) -> BookingResult<Customer> {
        let ctx = staff_context(actor)?;
        self.customer(&ctx, id).await
    }

    #[instrument(skip(self, actor, req), fields(actor = %actor.label()))]
    pub async fn redeem(
        &self,
        actor: &Actor,
        id: CustomerId,
        req: RedeemRequest,
    ) -> BookingResult<Customer> {
        let ctx = staff_context(actor)?;
        let reward_id = req
            .reward_id
            .ok_or_else(|| BookingError::Validation("rewardId is required".into()))?;

        let reward = self
            .store
            .get_reward(&ctx, reward_id)
            .await?
            .filter(|r| r.active)
            .ok_or(BookingError::NotFound("reward"))?;

        let mut customer = self.customer(&ctx, id).await?;
        customer.redeem(&reward, Utc::now())?;
        self.store.save_customer(&customer).await?;

        tracing::info!(customer_id = %customer.id, reward = %reward.name, "reward redeemed");
        Ok(customer)
    }

    pub async fn list_rewards(&self, query: RewardQuery) -> BookingResult<Vec<Reward>> {
        let business_id = query
            .business_id
            .ok_or_else(|| BookingError::Validation("businessId is required".into()))?;
        let business = self.business(business_id).await?;

        Ok(self.store.list_rewards(&business.context()).await?)
    }

    async fn business(&self, id: BusinessId) -> BookingResult<Business> {
        self.store
            .get_business(id)
            .await?
            .ok_or(BookingError::NotFound("business"))
    }

    async fn appointment(&self, ctx: &TenantContext, id: AppointmentId) -> BookingResult<Appointment> {
        self.store
            .get_appointment(ctx, id)
            .await?
            .ok_or(BookingError::NotFound("appointment"))
    }

    async fn customer(&self, ctx: &TenantContext, id: CustomerId) -> BookingResult<Customer> {
        self.store
            .get_customer(ctx, id)
            .await?
            .ok_or(BookingError::NotFound("customer"))
    }

    /// Best effort: lookup failures and customers without a linked account are logged only.
    async fn notify_customer(&self, appt: &Appointment, kind: NotificationKind, body: String) {
        match self.store.get_customer(&appt.context(), appt.customer_id).await {
            Ok(Some(customer)) => self.notify(&customer, appt, kind, body, Utc::now()),
            Ok(None) => tracing::warn!(customer_id = %appt.customer_id, "customer missing, notification skipped"),
            Err(e) => tracing::error!(error = ?e, "customer lookup failed, notification skipped"),
        }
    }

    fn notify(
        &self,
        customer: &Customer,
        appt: &Appointment,
        kind: NotificationKind,
        body: String,
        now: DateTime<Utc>,
    ) {
        let Some(recipient) = customer.user_id else {
            tracing::debug!(customer_id = %customer.id, ?kind, "no linked account, notification skipped");
            return;
        };

        self.events.publish(OutboundEvent::Notify(Notification::new(
            appt.tenant_id,
            recipient,
            kind,
            body,
            Some(appt.id),
            now,
        )));
    }
}

fn staff_context(actor: &Actor) -> BookingResult<TenantContext> {
    if !actor.is_staff() {
        return Err(BookingError::Forbidden);
    }

    Ok(actor.context())
}
