use crate::error::BookingError;
use crate::limits::*;
use crate::model::*;
use crate::policy::{MIN_BOOKING_DURATION_MS, OVERLAP_BUFFER_MS};
use crate::store::BookingStore;

/// Check a requested window before it is turned into a `Span`.
pub fn validate_window(start: Ms, end: Ms, now: Ms) -> Result<Span, BookingError> {
    if start >= end {
        return Err(BookingError::InvalidTimeRange("start time must be before end time"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    if start < now {
        return Err(BookingError::InvalidTimeRange("cannot book in the past"));
    }
    let span = Span::new(start, end);
    check_duration(&span)?;
    Ok(span)
}

/// Duration rules every stored booking satisfies.
pub(crate) fn check_duration(span: &Span) -> Result<(), BookingError> {
    if span.duration_ms() < MIN_BOOKING_DURATION_MS {
        return Err(BookingError::InvalidTimeRange("minimum booking time is 30 minutes"));
    }
    if span.duration_ms() > MAX_BOOKING_DURATION_MS {
        return Err(BookingError::LimitExceeded("booking too long"));
    }
    Ok(())
}

/// Keeps live bookings of one spot apart.
///
/// Two bookings conflict when their windows, each widened by `buffer` on both ends,
/// overlap. Only PENDING, CONFIRMED and ACTIVE bookings take part.
#[derive(Debug, Clone, Copy)]
pub struct OverlapGuard {
    buffer: Ms,
}

impl Default for OverlapGuard {
    fn default() -> Self {
        Self::new(OVERLAP_BUFFER_MS)
    }
}

impl OverlapGuard {
    /// A negative `buffer` is treated as zero.
    pub fn new(buffer: Ms) -> Self {
        Self {
            buffer: buffer.max(0),
        }
    }

    pub fn buffer(&self) -> Ms {
        self.buffer
    }

    /// Pure conflict test against a locked ledger. `exclude` skips the booking being moved.
    pub fn check(
        &self,
        ledger: &SpotLedger,
        span: &Span,
        exclude: Option<BookingId>,
    ) -> Result<(), BookingError> {
        // Widening both sides by `buffer` is the same as widening one side by twice that.
        let search = span.widened(2 * self.buffer);
        for booking in ledger.overlapping(&search) {
            if Some(booking.id) == exclude || !booking.status.blocks_spot() {
                continue;
            }
            return Err(BookingError::OverlapConflict(booking.id));
        }
        Ok(())
    }

    /// Check and insert `booking` as one unit of work under the spot's write lock.
    pub async fn try_reserve(
        &self,
        store: &dyn BookingStore,
        booking: Booking,
    ) -> Result<Booking, BookingError> {
        let guard = *self;
        store
            .write_in_spot(
                booking.spot_id,
                Box::new(move |ledger: &SpotLedger| -> Result<Booking, BookingError> {
                    guard.check(ledger, &booking.span, None)?;
                    Ok(booking)
                }),
            )
            .await
    }
}
