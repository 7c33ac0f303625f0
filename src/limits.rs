use crate::model::{HOUR_MS, Ms};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Longest single booking (one year).
pub const MAX_BOOKING_DURATION_MS: Ms = 366 * 24 * HOUR_MS;

pub const MAX_BOOKINGS_PER_SPOT: usize = 100_000;

pub const MAX_PAYMENT_REFERENCE_LEN: usize = 255;
