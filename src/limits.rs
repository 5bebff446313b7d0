use crate::model::Ms;

const DAY_MS: Ms = 86_400_000;

/// Longest accepted `booked_by` label, in bytes.
pub const MAX_BOOKED_BY_LEN: usize = 256;

/// 1970-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 2200-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MAX_SPAN_DURATION_MS: Ms = 366 * DAY_MS;

pub const MAX_BOOKINGS_PER_OWNER: usize = 10_000;
