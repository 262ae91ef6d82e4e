//! Request bodies accepted by the lifecycle operations, and their validation.
//!
//! Required fields are modelled as `Option` so a missing field produces a readable 400 rather
//! than a deserialization rejection.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::booking::{BookingError, BookingResult};
use crate::constants::DEFAULT_DURATION_MINUTES;
use crate::db::prelude::{BusinessId, EmployeeId, RewardId, ServiceId};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// Only read on the public path; staff bookings use the caller's business.
    pub business_id: Option<BusinessId>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub service_id: Option<ServiceId>,
    pub service_name: Option<String>,
    pub employee_id: Option<EmployeeId>,
    pub employee_name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub duration: Option<i32>,
    pub notes: Option<String>,
}

/// A booking request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
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
}

impl BookingRequest {
    pub fn validate(self) -> BookingResult<NewBooking> {
        let duration = self.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration <= 0 {
            return Err(BookingError::Validation(
                "duration must be a positive number of minutes".into(),
            ));
        }

        Ok(NewBooking {
            customer_name: required(self.customer_name, "customerName")?,
            customer_phone: required(self.customer_phone, "customerPhone")?,
            service_id: self.service_id,
            service_name: required(self.service_name, "serviceName")?,
            employee_id: self.employee_id,
            employee_name: non_blank(self.employee_name),
            date: parse_date(required(self.date, "date")?.as_str())?,
            time: parse_time(required(self.time, "time")?.as_str())?,
            duration,
            notes: non_blank(self.notes),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotQuery {
    pub business_id: Option<BusinessId>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub date: Option<String>,
    pub status: Option<crate::db::prelude::AppointmentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardQuery {
    pub business_id: Option<BusinessId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBarberRequest {
    pub employee_id: Option<EmployeeId>,
    pub employee_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub notes: Option<String>,
    pub rating: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    pub score: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub reward_id: Option<RewardId>,
}

pub fn required(value: Option<String>, field: &str) -> BookingResult<String> {
    non_blank(value).ok_or_else(|| BookingError::Validation(format!("{field} is required")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Accepts `YYYY-MM-DD` only.
pub fn parse_date(raw: &str) -> BookingResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| BookingError::Validation(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

/// Accepts `HH:MM` and returns it zero-padded, so `9:30` and `09:30` name the same slot.
pub fn parse_time(raw: &str) -> BookingResult<String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| BookingError::Validation(format!("invalid time '{raw}', expected HH:MM")))
}

/// Ratings are whole stars from 1 to 5.
pub fn parse_score(score: i64) -> BookingResult<u8> {
    match u8::try_from(score) {
        Ok(s @ 1..=5) => Ok(s),
        _ => Err(BookingError::Validation(format!(
            "rating must be between 1 and 5, got {score}"
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest {
            customer_name: Some("Sami".into()),
            customer_phone: Some("0500000001".into()),
            service_name: Some("Haircut".into()),
            date: Some("2026-03-14".into()),
            time: Some("14:00".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_fills_defaults() {
        let booking = request().validate().unwrap();
        assert_eq!(booking.duration, 30);
        assert_eq!(booking.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(booking.time, "14:00");
        assert!(booking.employee_name.is_none());
    }

    #[test]
    fn test_validate_rejects_missing_and_blank_fields() {
        let missing_phone = BookingRequest {
            customer_phone: None,
            ..request()
        };
        assert!(matches!(
            missing_phone.validate(),
            Err(BookingError::Validation(m)) if m == "customerPhone is required"
        ));

        let blank_name = BookingRequest {
            customer_name: Some("   ".into()),
            ..request()
        };
        assert!(blank_name.validate().is_err());

        let zero_duration = BookingRequest {
            duration: Some(0),
            ..request()
        };
        assert!(zero_duration.validate().is_err());
    }

    #[test]
    fn test_date_and_time_formats() {
        assert!(parse_date("2026-02-30").is_err());
        assert!(parse_date("14/03/2026").is_err());
        assert!(parse_date("2026-03-14").is_ok());

        assert_eq!(parse_time("9:30").unwrap(), "09:30");
        assert_eq!(parse_time("21:00").unwrap(), "21:00");
        assert!(parse_time("24:00").is_err());
        assert!(parse_time("noon").is_err());
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(parse_score(1).unwrap(), 1);
        assert_eq!(parse_score(5).unwrap(), 5);
        for bad in [0, 6, -1, 300] {
            assert!(parse_score(bad).is_err(), "score = {bad}");
        }
    }
}
