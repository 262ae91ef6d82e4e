use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{BusinessId, TenantContext, TenantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: BusinessId,
    pub tenant_id: TenantId,
    pub name: String,
    pub plan: String,
    #[sqlx(flatten)]
    pub usage: BusinessUsage,
}

/// Booking counters. Telemetry only: they are not a ledger and tolerate lost updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BusinessUsage {
    pub total_appointments: i64,
    pub appointments_this_month: i64,
    pub last_reset_date: DateTime<Utc>,
}

impl Business {
    pub fn context(&self) -> TenantContext {
        TenantContext::new(self.tenant_id, self.id)
    }
}

impl BusinessUsage {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_appointments: 0,
            appointments_this_month: 0,
            last_reset_date: now,
        }
    }

    /// Counts one booking made at `now`, restarting the monthly counter when `now` falls in a
    /// different calendar month than the last reset.
    pub fn record_booking(&mut self, now: DateTime<Utc>) {
        self.total_appointments += 1;

        let same_month = self.last_reset_date.year() == now.year()
            && self.last_reset_date.month() == now.month();

        if same_month {
            self.appointments_this_month += 1;
        } else {
            self.appointments_this_month = 1;
            self.last_reset_date = now;
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_usage_within_month() {
        let start = Utc.with_ymd_and_hms(2026, 5, 2, 10, 0, 0).unwrap();
        let mut usage = BusinessUsage::new(start);

        usage.record_booking(start);
        usage.record_booking(Utc.with_ymd_and_hms(2026, 5, 31, 23, 0, 0).unwrap());

        assert_eq!(usage.total_appointments, 2);
        assert_eq!(usage.appointments_this_month, 2);
        assert_eq!(usage.last_reset_date, start);
    }

    #[test]
    fn test_usage_resets_on_new_month_and_year() {
        let mut usage = BusinessUsage {
            total_appointments: 40,
            appointments_this_month: 12,
            last_reset_date: Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap(),
        };

        // same month number, different year
        let next_year = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        usage.record_booking(next_year);

        assert_eq!(usage.total_appointments, 41);
        assert_eq!(usage.appointments_this_month, 1);
        assert_eq!(usage.last_reset_date, next_year);

        usage.record_booking(Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap());
        assert_eq!(usage.appointments_this_month, 1);
        assert_eq!(usage.total_appointments, 42);
    }
}
