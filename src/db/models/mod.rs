use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod appointment;
pub mod business;
pub mod customer;
pub mod notification;
pub mod reward;
pub mod staff;

macro_rules! record_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
            #[serde(transparent)]
            #[sqlx(transparent)]
            pub struct $name(pub Uuid);

            impl $name {
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl From<Uuid> for $name {
                fn from(value: Uuid) -> Self {
                    Self(value)
                }
            }

            impl core::str::FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Ok(Self(Uuid::parse_str(s)?))
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

record_id!(
    TenantId,
    BusinessId,
    AppointmentId,
    CustomerId,
    EmployeeId,
    UserId,
    ServiceId,
    RewardId,
    NotificationId,
);

/// The scope every lifecycle operation runs under. Built once from the authenticated actor
/// (or from the business named on a public request) and passed explicitly from there on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub business_id: BusinessId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, business_id: BusinessId) -> Self {
        Self {
            tenant_id,
            business_id,
        }
    }
}
