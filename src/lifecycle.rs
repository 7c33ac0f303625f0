//! Booking state machine.
//!
//! ```text
//!   PENDING ──payment succeeded──▶ CONFIRMED ──tick, now ≥ start──▶ ACTIVE ──tick, now ≥ end──▶ COMPLETED
//!      │                               │
//!      ├─payment failed / timed out─┐  │
//!      └─renter cancels (≥60m)──────┴──┴─renter cancels (≥60m)──▶ CANCELLED
//! ```
//!
//! Rescheduling keeps PENDING and CONFIRMED bookings in place. Everything here is pure:
//! callers pass `now` from their clock.

use std::fmt;

use crate::error::{BookingError, Denial};
use crate::model::{Booking, BookingStatus, Ms};
use crate::policy::{CHANGE_CUTOFF_MS, PENDING_PAYMENT_TIMEOUT_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    PaymentSucceeded,
    PaymentFailed,
    PaymentTimedOut,
    RenterCancelled,
    RenterRescheduled,
    SchedulerTick,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::PaymentSucceeded => "payment_succeeded",
            LifecycleEvent::PaymentFailed => "payment_failed",
            LifecycleEvent::PaymentTimedOut => "payment_timed_out",
            LifecycleEvent::RenterCancelled => "renter_cancelled",
            LifecycleEvent::RenterRescheduled => "renter_rescheduled",
            LifecycleEvent::SchedulerTick => "scheduler_tick",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status `booking` moves to when `event` happens at `now`, or why it may not.
pub fn next_status(
    booking: &Booking,
    event: LifecycleEvent,
    now: Ms,
) -> Result<BookingStatus, BookingError> {
    use BookingStatus::*;
    use LifecycleEvent::*;

    let status = booking.status;
    match (status, event) {
        (Pending, PaymentSucceeded) => Ok(Confirmed),
        (Pending, PaymentFailed) => Ok(Cancelled),
        (Pending, PaymentTimedOut) => {
            if now >= booking.created_at + PENDING_PAYMENT_TIMEOUT_MS {
                Ok(Cancelled)
            } else {
                Err(not_due(event))
            }
        }
        (Pending | Confirmed, RenterCancelled) => {
            before_cutoff(booking, event, now)?;
            Ok(Cancelled)
        }
        (Pending | Confirmed, RenterRescheduled) => {
            before_cutoff(booking, event, now)?;
            Ok(status)
        }
        (Confirmed, SchedulerTick) => {
            if now >= booking.span.start {
                Ok(Active)
            } else {
                Err(not_due(event))
            }
        }
        (Active, SchedulerTick) => {
            if now >= booking.span.end {
                Ok(Completed)
            } else {
                Err(not_due(event))
            }
        }
        _ => Err(BookingError::ActionNotAllowed(Denial::InvalidTransition {
            event,
            status,
        })),
    }
}

/// Whether a stored record may go from `from` to `to` in one write.
pub fn is_edge(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    from == to
        || matches!(
            (from, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Active)
                | (Active, Completed)
        )
}

fn before_cutoff(booking: &Booking, event: LifecycleEvent, now: Ms) -> Result<(), BookingError> {
    let ms_to_start = booking.span.start - now;
    if ms_to_start < CHANGE_CUTOFF_MS {
        return Err(BookingError::ActionNotAllowed(Denial::CutoffPassed {
            event,
            ms_to_start,
        }));
    }
    Ok(())
}

fn not_due(event: LifecycleEvent) -> BookingError {
    BookingError::ActionNotAllowed(Denial::NotYetDue { event })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MINUTE_MS as M, Span};
    use rust_decimal_macros::dec;
    use ulid::Ulid;

    const START: Ms = 10 * 3_600_000;
    const END: Ms = START + 2 * 3_600_000;

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            status,
            ..Booking::pending(
                Ulid::new(),
                Ulid::new(),
                Ulid::new(),
                Span::new(START, END),
                dec!(4),
                0,
            )
        }
    }

    fn denial(result: Result<BookingStatus, BookingError>) -> Denial {
        match result {
            Err(BookingError::ActionNotAllowed(d)) => d,
            other => panic!("expected ActionNotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn payment_success_confirms_pending() {
        let b = booking(BookingStatus::Pending);
        assert_eq!(
            next_status(&b, LifecycleEvent::PaymentSucceeded, 0).unwrap(),
            BookingStatus::Confirmed
        );
    }

    #[test]
    fn payment_success_on_confirmed_is_rejected() {
        let b = booking(BookingStatus::Confirmed);
        assert_eq!(
            denial(next_status(&b, LifecycleEvent::PaymentSucceeded, 0)),
            Denial::InvalidTransition {
                event: LifecycleEvent::PaymentSucceeded,
                status: BookingStatus::Confirmed,
            }
        );
    }

    #[test]
    fn payment_failure_cancels_pending() {
        let b = booking(BookingStatus::Pending);
        assert_eq!(
            next_status(&b, LifecycleEvent::PaymentFailed, 0).unwrap(),
            BookingStatus::Cancelled
        );
    }

    #[test]
    fn timeout_waits_fifteen_minutes_from_creation() {
        let b = booking(BookingStatus::Pending);
        assert!(matches!(
            denial(next_status(&b, LifecycleEvent::PaymentTimedOut, 15 * M - 1)),
            Denial::NotYetDue { .. }
        ));
        assert_eq!(
            next_status(&b, LifecycleEvent::PaymentTimedOut, 15 * M).unwrap(),
            BookingStatus::Cancelled
        );
    }

    #[test]
    fn cancel_respects_sixty_minute_cutoff() {
        for status in [BookingStatus::Pending, BookingStatus::Confirmed] {
            let b = booking(status);
            assert!(matches!(
                denial(next_status(&b, LifecycleEvent::RenterCancelled, START - 59 * M)),
                Denial::CutoffPassed { .. }
            ));
            assert_eq!(
                next_status(&b, LifecycleEvent::RenterCancelled, START - 61 * M).unwrap(),
                BookingStatus::Cancelled
            );
            assert_eq!(
                next_status(&b, LifecycleEvent::RenterCancelled, START - 60 * M).unwrap(),
                BookingStatus::Cancelled
            );
        }
    }

    #[test]
    fn terminal_and_active_bookings_cannot_be_cancelled() {
        for status in [
            BookingStatus::Active,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            let b = booking(status);
            assert_eq!(
                denial(next_status(&b, LifecycleEvent::RenterCancelled, 0)),
                Denial::InvalidTransition {
                    event: LifecycleEvent::RenterCancelled,
                    status,
                }
            );
        }
    }

    #[test]
    fn reschedule_preserves_status() {
        for status in [BookingStatus::Pending, BookingStatus::Confirmed] {
            let b = booking(status);
            assert_eq!(
                next_status(&b, LifecycleEvent::RenterRescheduled, 0).unwrap(),
                status
            );
        }
        let active = booking(BookingStatus::Active);
        assert!(matches!(
            denial(next_status(&active, LifecycleEvent::RenterRescheduled, 0)),
            Denial::InvalidTransition { .. }
        ));
    }

    #[test]
    fn tick_activates_at_start_and_completes_at_end() {
        let confirmed = booking(BookingStatus::Confirmed);
        assert!(matches!(
            denial(next_status(&confirmed, LifecycleEvent::SchedulerTick, START - 1)),
            Denial::NotYetDue { .. }
        ));
        assert_eq!(
            next_status(&confirmed, LifecycleEvent::SchedulerTick, START).unwrap(),
            BookingStatus::Active
        );

        let active = booking(BookingStatus::Active);
        assert!(matches!(
            denial(next_status(&active, LifecycleEvent::SchedulerTick, END - 1)),
            Denial::NotYetDue { .. }
        ));
        assert_eq!(
            next_status(&active, LifecycleEvent::SchedulerTick, END).unwrap(),
            BookingStatus::Completed
        );
    }

    #[test]
    fn tick_never_touches_pending_or_terminal() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            let b = booking(status);
            assert!(matches!(
                denial(next_status(&b, LifecycleEvent::SchedulerTick, END + 1)),
                Denial::InvalidTransition { .. }
            ));
        }
    }

    #[test]
    fn edges_match_transition_table() {
        use BookingStatus::*;
        assert!(is_edge(Pending, Confirmed));
        assert!(is_edge(Confirmed, Confirmed));
        assert!(is_edge(Active, Completed));
        assert!(!is_edge(Pending, Active));
        assert!(!is_edge(Pending, Completed));
        assert!(!is_edge(Cancelled, Pending));
        assert!(!is_edge(Completed, Active));
        assert!(!is_edge(Active, Cancelled));
    }
}
