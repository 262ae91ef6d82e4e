use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json};
use http::StatusCode;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::api::server::{ApiJson, ApiPath, ApiQuery, ApiResponse, AppState, JsonResult, RouteError};
use crate::booking::CompletedAppointment;
use crate::booking::request::{
    BookingRequest, CancelRequest, ChangeBarberRequest, CompleteRequest, ListQuery, RatingRequest,
    RedeemRequest, RewardQuery, SlotQuery,
};
use crate::booking::slots::Slot;
use crate::db::prelude::{Actor, Appointment, AppointmentId, Customer, CustomerId, RatingKind, Reward};

type Created<T> = core::result::Result<(StatusCode, Json<ApiResponse<T>>), RouteError>;

/// Some PATCH actions take an optional body; an empty one means "no fields".
fn optional_body<T>(body: &Bytes) -> Result<T, RouteError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body).map_err(|e| RouteError::BadRequest(format!("invalid request body: {e}")))
}

// ---
//  public
// ---

#[instrument(skip(state, req))]
pub async fn book_public(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<BookingRequest>,
) -> Created<Appointment> {
    let appt = state.lifecycle.book_public(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("appointment booked", appt)),
    ))
}

#[instrument(skip(state))]
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SlotQuery>,
) -> JsonResult<Vec<Slot>> {
    let slots = state.lifecycle.available_slots(query).await?;

    Ok(Json(ApiResponse::ok(slots)))
}

#[instrument(skip(state, req))]
pub async fn rate_customer(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<AppointmentId>,
    ApiJson(req): ApiJson<RatingRequest>,
) -> JsonResult<Appointment> {
    let appt = state.lifecycle.rate(id, RatingKind::Customer, req).await?;

    Ok(Json(ApiResponse::with_message("rating saved", appt)))
}

#[instrument(skip(state, req))]
pub async fn rate_employee(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<AppointmentId>,
    ApiJson(req): ApiJson<RatingRequest>,
) -> JsonResult<Appointment> {
    let appt = state.lifecycle.rate(id, RatingKind::Employee, req).await?;

    Ok(Json(ApiResponse::with_message("rating saved", appt)))
}

#[instrument(skip(state))]
pub async fn list_rewards(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<RewardQuery>,
) -> JsonResult<Vec<Reward>> {
    let rewards = state.lifecycle.list_rewards(query).await?;

    Ok(Json(ApiResponse::ok(rewards)))
}

// ---
//  staff
// ---

#[instrument(skip(state, actor, req))]
pub async fn book_staff(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiJson(req): ApiJson<BookingRequest>,
) -> Created<Appointment> {
    let appt = state.lifecycle.book_staff(&actor, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("appointment booked", appt)),
    ))
}

#[instrument(skip(state, actor))]
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> JsonResult<Vec<Appointment>> {
    let appts = state.lifecycle.list(&actor, query).await?;

    Ok(Json(ApiResponse::ok(appts)))
}

#[instrument(skip(state, actor))]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<AppointmentId>,
) -> JsonResult<Appointment> {
    let appt = state.lifecycle.get(&actor, id).await?;

    Ok(Json(ApiResponse::ok(appt)))
}

#[instrument(skip(state, actor))]
pub async fn confirm_appointment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<AppointmentId>,
) -> JsonResult<Appointment> {
    let appt = state.lifecycle.confirm_appointment(&actor, id).await?;

    Ok(Json(ApiResponse::with_message("appointment confirmed", appt)))
}

#[instrument(skip(state, actor))]
pub async fn confirm_employee(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<AppointmentId>,
) -> JsonResult<Appointment> {
    let appt = state.lifecycle.confirm_employee(&actor, id).await?;

    Ok(Json(ApiResponse::with_message("employee confirmed", appt)))
}

#[instrument(skip(state, actor, req))]
pub async fn change_barber(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<AppointmentId>,
    ApiJson(req): ApiJson<ChangeBarberRequest>,
) -> JsonResult<Appointment> {
    let appt = state.lifecycle.change_barber(&actor, id, req).await?;

    Ok(Json(ApiResponse::with_message("barber changed", appt)))
}

#[instrument(skip(state, actor, body))]
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<AppointmentId>,
    body: Bytes,
) -> JsonResult<Appointment> {
    let req = optional_body::<CancelRequest>(&body)?;
    let appt = state.lifecycle.cancel(&actor, id, req).await?;

    Ok(Json(ApiResponse::with_message("appointment cancelled", appt)))
}

#[instrument(skip(state, actor, body))]
pub async fn complete_appointment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<AppointmentId>,
    body: Bytes,
) -> JsonResult<CompletedAppointment> {
    let req = optional_body::<CompleteRequest>(&body)?;
    let completed = state.lifecycle.complete(&actor, id, req).await?;

    Ok(Json(ApiResponse::with_message("appointment completed", completed)))
}

#[instrument(skip(state, actor))]
pub async fn customer_loyalty(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<CustomerId>,
) -> JsonResult<Customer> {
    let customer = state.lifecycle.customer_loyalty(&actor, id).await?;

    Ok(Json(ApiResponse::ok(customer)))
}

#[instrument(skip(state, actor, req))]
pub async fn redeem_reward(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<CustomerId>,
    ApiJson(req): ApiJson<RedeemRequest>,
) -> JsonResult<Customer> {
    let customer = state.lifecycle.redeem(&actor, id, req).await?;

    Ok(Json(ApiResponse::with_message("reward redeemed", customer)))
}
