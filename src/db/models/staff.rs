use serde::{Deserialize, Serialize};

use crate::db::models::{BusinessId, EmployeeId, TenantContext, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Customer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub business_id: BusinessId,
    pub name: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub tenant_id: TenantId,
    pub business_id: BusinessId,
    pub name: String,
    pub active: bool,
}

/// Whoever presented a valid bearer token, resolved once at the auth boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    User(User),
    Employee(Employee),
}

impl Actor {
    pub fn context(&self) -> TenantContext {
        match self {
            Actor::User(u) => TenantContext::new(u.tenant_id, u.business_id),
            Actor::Employee(e) => TenantContext::new(e.tenant_id, e.business_id),
        }
    }

    /// Label recorded on confirmations, completions and cancellations.
    pub fn label(&self) -> String {
        match self {
            Actor::User(u) => format!("user:{}", u.id),
            Actor::Employee(e) => format!("employee:{}", e.id),
        }
    }

    pub fn is_staff(&self) -> bool {
        match self {
            Actor::User(u) => matches!(u.role, UserRole::Owner | UserRole::Admin),
            Actor::Employee(e) => e.active,
        }
    }
}
