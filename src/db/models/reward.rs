use serde::{Deserialize, Serialize};

use crate::db::models::{BusinessId, RewardId, TenantId};

/// A catalog item customers can exchange confirmed points for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: RewardId,
    pub tenant_id: TenantId,
    pub business_id: BusinessId,
    pub name: String,
    pub points_cost: i64,
    pub active: bool,
}
