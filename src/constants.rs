/// Pending points granted for a booking by a customer with no completed visits.
pub const FIRST_VISIT_POINTS: i64 = 100;
/// Pending points granted for every later booking.
pub const RETURN_VISIT_POINTS: i64 = 50;

pub const GOLD_TIER_POINTS: i64 = 500;
pub const SILVER_TIER_POINTS: i64 = 200;

// Public slot grid, in minutes after midnight. Both ends are bookable.
pub const SLOT_DAY_START: u32 = 9 * 60;
pub const SLOT_DAY_END: u32 = 21 * 60;
pub const SLOT_INTERVAL: u32 = 30;

pub const DEFAULT_DURATION_MINUTES: i32 = 30;

pub const BEARER_PREFIX: &str = "Bearer ";
/// Lifetime of tokens minted by `TokenSigner::issue`.
pub const TOKEN_TTL_SECS: i64 = 12 * 60 * 60;
