use std::sync::LazyLock;

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::util::env;
use crate::util::env::Var;
use crate::var;

pub mod models;
pub mod repositories;

pub mod prelude {
    pub use crate::db::db_pool;
    pub use crate::db::{StoreError, StoreResult};

    pub use crate::db::models::appointment::{
        Action, Appointment, AppointmentStatus, BookingSource, Completion, Confirmations, Rating,
        RatingKind, StaffKey, TransitionError,
    };
    pub use crate::db::models::business::{Business, BusinessUsage};
    pub use crate::db::models::customer::{
        Customer, EntryStatus, LedgerError, LoyaltyTier, PendingReward, PointsEntry, PointsKind,
    };
    pub use crate::db::models::notification::{Notification, NotificationKind};
    pub use crate::db::models::reward::Reward;
    pub use crate::db::models::staff::{Actor, Employee, User, UserRole};
    pub use crate::db::models::{
        AppointmentId, BusinessId, CustomerId, EmployeeId, NotificationId, RewardId, ServiceId,
        TenantContext, TenantId, UserId,
    };

    pub use crate::db::repositories::memory::MemoryStore;
    pub use crate::db::repositories::pg::PgStore;
    pub use crate::db::repositories::{AppointmentFilter, Store};
}

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);
pub async fn db_pool() -> StoreResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    async fn new_pool() -> StoreResult<Self> {
        let db_url = var!(Var::DatabaseUrl).await?;
        let pool = sqlx::PgPool::connect(db_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");

        Ok(Self { pool })
    }
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    EnvError(#[from] env::EnvErr),

    #[error("failed to read seed data: {0}")]
    SeedError(String),
}
