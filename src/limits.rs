//! Hard limits. These bound memory use and reject obviously bogus input
//! before it reaches the booking logic.

/// Maximum number of spaces a single engine will manage.
pub const MAX_SPACES: usize = 10_000;

/// Maximum bookings retained per space (history included).
pub const MAX_BOOKINGS_PER_SPACE: usize = 100_000;

/// Maximum number of concurrently registered blackout periods.
pub const MAX_BLACKOUTS: usize = 10_000;

/// Maximum space name length in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum blackout title length in bytes.
pub const MAX_TITLE_LEN: usize = 256;

/// Longest single booking we accept, in minutes (a full week).
pub const MAX_SLOT_MINUTES: i64 = 7 * 24 * 60;

/// Earliest year accepted in any timestamp.
pub const MIN_VALID_YEAR: i32 = 2000;

/// Latest year accepted in any timestamp.
pub const MAX_VALID_YEAR: i32 = 2200;
