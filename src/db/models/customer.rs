use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{FIRST_VISIT_POINTS, GOLD_TIER_POINTS, RETURN_VISIT_POINTS, SILVER_TIER_POINTS};
use crate::db::models::reward::Reward;
use crate::db::models::{AppointmentId, BusinessId, CustomerId, TenantContext, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "loyalty_tier", rename_all = "lowercase")]
pub enum LoyaltyTier {
    Gold,
    Silver,
    Bronze,
}

impl LoyaltyTier {
    pub fn from_points(points: i64) -> Self {
        if points >= GOLD_TIER_POINTS {
            Self::Gold
        } else if points >= SILVER_TIER_POINTS {
            Self::Silver
        } else {
            Self::Bronze
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointsKind {
    Earned,
    Redeemed,
    Expired,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsEntry {
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: PointsKind,
    pub description: String,
    pub date: DateTime<Utc>,
    pub appointment_id: Option<AppointmentId>,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReward {
    pub appointment_id: AppointmentId,
    pub points: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Customer profile and loyalty ledger. Stored and written back as one record so every
/// ledger change lands in a single write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub business_id: BusinessId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub phone: String,
    pub loyalty_points: i64,
    pub pending_points: i64,
    pub loyalty_tier: LoyaltyTier,
    #[sqlx(json)]
    pub points_history: Vec<PointsEntry>,
    #[sqlx(json)]
    pub pending_rewards: Vec<PendingReward>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("appointment {0} has already been granted points")]
    AlreadyGranted(AppointmentId),

    #[error("not enough points: {available} available, {required} required")]
    InsufficientPoints { available: i64, required: i64 },
}

impl Customer {
    pub fn new(ctx: TenantContext, name: String, phone: String, now: DateTime<Utc>) -> Self {
        Self {
            id: CustomerId::new(),
            tenant_id: ctx.tenant_id,
            business_id: ctx.business_id,
            user_id: None,
            name,
            phone,
            loyalty_points: 0,
            pending_points: 0,
            loyalty_tier: LoyaltyTier::Bronze,
            points_history: Vec::new(),
            pending_rewards: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Size of the pending grant for a new booking, given how many of this customer's
    /// appointments have already been completed.
    pub fn booking_grant(completed_visits: i64) -> i64 {
        if completed_visits == 0 {
            FIRST_VISIT_POINTS
        } else {
            RETURN_VISIT_POINTS
        }
    }

    pub fn has_pending_grant(&self, appointment_id: AppointmentId) -> bool {
        self.pending_rewards
            .iter()
            .any(|r| r.appointment_id == appointment_id)
    }

    /// Records a not-yet-usable grant for `appointment_id`. An appointment funds at most one
    /// grant.
    pub fn grant_pending(
        &mut self,
        appointment_id: AppointmentId,
        points: i64,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.has_pending_grant(appointment_id)
            || self
                .points_history
                .iter()
                .any(|e| e.appointment_id == Some(appointment_id))
        {
            return Err(LedgerError::AlreadyGranted(appointment_id));
        }

        self.pending_points += points;
        self.pending_rewards.push(PendingReward {
            appointment_id,
            points,
            description: description.clone(),
            created_at: now,
        });
        self.points_history.push(PointsEntry {
            points,
            kind: PointsKind::Pending,
            description,
            date: now,
            appointment_id: Some(appointment_id),
            status: EntryStatus::Pending,
        });
        self.updated_at = now;

        Ok(())
    }

    /// Moves the pending grant funded by `appointment_id` into the confirmed balance and
    /// returns the number of points activated. Returns `None` (and changes nothing) when the
    /// appointment funded no grant or the grant was already settled.
    pub fn activate_pending(&mut self, appointment_id: AppointmentId, now: DateTime<Utc>) -> Option<i64> {
        let points = self.take_pending(appointment_id)?;

        self.loyalty_points += points;
        self.settle_history(appointment_id, PointsKind::Earned);
        self.loyalty_tier = LoyaltyTier::from_points(self.loyalty_points);
        self.updated_at = now;

        Some(points)
    }

    pub fn redeem(&mut self, reward: &Reward, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.loyalty_points < reward.points_cost {
            return Err(LedgerError::InsufficientPoints {
                available: self.loyalty_points,
                required: reward.points_cost,
            });
        }

        self.loyalty_points -= reward.points_cost;
        self.points_history.push(PointsEntry {
            points: reward.points_cost,
            kind: PointsKind::Redeemed,
            description: format!("Redeemed {}", reward.name),
            date: now,
            appointment_id: None,
            status: EntryStatus::Confirmed,
        });
        self.loyalty_tier = LoyaltyTier::from_points(self.loyalty_points);
        self.updated_at = now;

        Ok(())
    }

    fn take_pending(&mut self, appointment_id: AppointmentId) -> Option<i64> {
        let idx = self
            .pending_rewards
            .iter()
            .position(|r| r.appointment_id == appointment_id)?;

        let reward = self.pending_rewards.remove(idx);
        self.pending_points = (self.pending_points - reward.points).max(0);

        Some(reward.points)
    }

    fn settle_history(&mut self, appointment_id: AppointmentId, kind: PointsKind) {
        if let Some(entry) = self.points_history.iter_mut().find(|e| {
            e.appointment_id == Some(appointment_id) && e.status == EntryStatus::Pending
        }) {
            entry.kind = kind;
            entry.status = EntryStatus::Confirmed;
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::db::models::RewardId;

    pub(crate) fn sample() -> Customer {
        Customer::new(
            TenantContext::new(TenantId::new(), BusinessId::new()),
            "Sami".into(),
            "0500000001".into(),
            Utc::now(),
        )
    }

    #[test]
    fn test_tier_thresholds() {
        let cases = [
            (0, LoyaltyTier::Bronze),
            (199, LoyaltyTier::Bronze),
            (200, LoyaltyTier::Silver),
            (499, LoyaltyTier::Silver),
            (500, LoyaltyTier::Gold),
            (501, LoyaltyTier::Gold),
        ];

        for (points, tier) in cases {
            assert_eq!(LoyaltyTier::from_points(points), tier, "points = {points}");
        }
    }

    #[test]
    fn test_booking_grant_size() {
        assert_eq!(Customer::booking_grant(0), 100);
        assert_eq!(Customer::booking_grant(1), 50);
        assert_eq!(Customer::booking_grant(12), 50);
    }

    #[test]
    fn test_activation_moves_points_once() {
        let mut customer = sample();
        let appt = AppointmentId::new();
        customer
            .grant_pending(appt, 100, "Haircut".into(), Utc::now())
            .unwrap();

        assert_eq!(customer.pending_points, 100);
        assert_eq!(customer.pending_rewards.len(), 1);
        assert_eq!(customer.points_history[0].status, EntryStatus::Pending);

        assert_eq!(customer.activate_pending(appt, Utc::now()), Some(100));
        assert_eq!(customer.loyalty_points, 100);
        assert_eq!(customer.pending_points, 0);
        assert!(customer.pending_rewards.is_empty());
        assert_eq!(customer.points_history.len(), 1);
        assert_eq!(customer.points_history[0].kind, PointsKind::Earned);
        assert_eq!(customer.points_history[0].status, EntryStatus::Confirmed);

        // nothing left to activate
        assert_eq!(customer.activate_pending(appt, Utc::now()), None);
        assert_eq!(customer.loyalty_points, 100);
    }

    #[test]
    fn test_activation_only_touches_matching_grant() {
        let mut customer = sample();
        let (first, second) = (AppointmentId::new(), AppointmentId::new());
        customer.grant_pending(first, 100, "a".into(), Utc::now()).unwrap();
        customer.grant_pending(second, 50, "b".into(), Utc::now()).unwrap();

        assert_eq!(customer.activate_pending(second, Utc::now()), Some(50));
        assert_eq!(customer.loyalty_points, 50);
        assert_eq!(customer.pending_points, 100);
        assert_eq!(customer.pending_rewards[0].appointment_id, first);
        assert_eq!(customer.points_history[0].status, EntryStatus::Pending);
    }

    #[test]
    fn test_pending_points_floor_at_zero() {
        let mut customer = sample();
        let appt = AppointmentId::new();
        customer.grant_pending(appt, 100, "a".into(), Utc::now()).unwrap();
        customer.pending_points = 40;

        assert_eq!(customer.activate_pending(appt, Utc::now()), Some(100));
        assert_eq!(customer.pending_points, 0);
        assert_eq!(customer.loyalty_points, 100);
    }

    #[test]
    fn test_one_grant_per_appointment() {
        let mut customer = sample();
        let appt = AppointmentId::new();
        customer.grant_pending(appt, 100, "a".into(), Utc::now()).unwrap();

        assert_eq!(
            customer.grant_pending(appt, 100, "a".into(), Utc::now()),
            Err(LedgerError::AlreadyGranted(appt))
        );
        assert_eq!(customer.pending_points, 100);

        // a settled grant still blocks a second one
        customer.activate_pending(appt, Utc::now());
        assert!(customer.grant_pending(appt, 50, "a".into(), Utc::now()).is_err());
    }

    #[test]
    fn test_tier_follows_balance() {
        let mut customer = sample();
        for _ in 0..4 {
            let appt = AppointmentId::new();
            customer.grant_pending(appt, 50, "a".into(), Utc::now()).unwrap();
            customer.activate_pending(appt, Utc::now());
        }
        assert_eq!(customer.loyalty_points, 200);
        assert_eq!(customer.loyalty_tier, LoyaltyTier::Silver);

        let reward = Reward {
            id: RewardId::new(),
            tenant_id: customer.tenant_id,
            business_id: customer.business_id,
            name: "Free beard trim".into(),
            points_cost: 150,
            active: true,
        };
        customer.redeem(&reward, Utc::now()).unwrap();
        assert_eq!(customer.loyalty_points, 50);
        assert_eq!(customer.loyalty_tier, LoyaltyTier::Bronze);
        assert_eq!(
            customer.redeem(&reward, Utc::now()),
            Err(LedgerError::InsufficientPoints {
                available: 50,
                required: 150
            })
        );
    }
}
