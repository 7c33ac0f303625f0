//! Business time windows of the booking lifecycle.

use std::time::Duration;

use crate::model::{MINUTE_MS, Ms};

/// Changeover margin added to both ends of a window when testing for conflicts.
pub const OVERLAP_BUFFER_MS: Ms = 5 * MINUTE_MS;

/// Shortest bookable window.
pub const MIN_BOOKING_DURATION_MS: Ms = 30 * MINUTE_MS;

/// Renters may cancel or reschedule only while at least this much time remains before start.
pub const CHANGE_CUTOFF_MS: Ms = 60 * MINUTE_MS;

/// An unpaid PENDING booking expires this long after creation.
pub const PENDING_PAYMENT_TIMEOUT_MS: Ms = 15 * MINUTE_MS;

/// Reference cadence of the reconciler.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(300);
