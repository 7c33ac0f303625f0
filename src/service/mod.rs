mod payments;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;
use ulid::Ulid;

use crate::clock::Clock;
use crate::directory::{RenterDirectory, SpotDirectory};
use crate::error::{BookingError, Denial, Entity};
use crate::guard::{OverlapGuard, validate_window};
use crate::lifecycle::{self, LifecycleEvent};
use crate::model::*;
use crate::observability;
use crate::payment::{PaymentFailurePolicy, PaymentGateway};
use crate::pricing;
use crate::store::BookingStore;

pub use payments::CallbackOutcome;

/// Request-driven booking operations: create, cancel, reschedule, reads and payment callbacks.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    spots: Arc<dyn SpotDirectory>,
    renters: Arc<dyn RenterDirectory>,
    payments: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    guard: OverlapGuard,
    failure_policy: PaymentFailurePolicy,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        spots: Arc<dyn SpotDirectory>,
        renters: Arc<dyn RenterDirectory>,
        payments: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            spots,
            renters,
            payments,
            clock,
            guard: OverlapGuard::default(),
            failure_policy: PaymentFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: PaymentFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_guard(mut self, guard: OverlapGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn failure_policy(&self) -> PaymentFailurePolicy {
        self.failure_policy
    }

    /// Reserve `spot_id` for `[start, end)` on behalf of `renter_id`. The booking starts PENDING.
    pub async fn create(
        &self,
        renter_id: RenterId,
        spot_id: SpotId,
        start: Ms,
        end: Ms,
    ) -> Result<Booking, BookingError> {
        self.require_renter(renter_id).await?;
        let spot = self.require_spot(spot_id).await?;
        let now = self.clock.now();
        let span = validate_window(start, end, now)?;
        check_spot_open(&spot, &span)?;

        let amount = pricing::price(&spot.rates(), &span);
        let booking = Booking::pending(Ulid::new(), spot_id, renter_id, span, amount, now);
        let booking = self
            .guard
            .try_reserve(self.store.as_ref(), booking)
            .await
            .inspect_err(|e| count_conflict(e, "create"))?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        observability::record_transition(BookingStatus::Pending, "create");
        info!(
            booking = %booking.id,
            spot = %spot_id,
            renter = %renter_id,
            amount = %booking.total_amount,
            "booking created"
        );
        Ok(booking)
    }

    /// Cancel a PENDING or CONFIRMED booking at least 60 minutes before it starts.
    pub async fn cancel(
        &self,
        renter_id: RenterId,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        let booking = self.require_booking(booking_id).await?;
        ensure_owner(&booking, renter_id)?;

        let cancelled = self
            .store
            .advance_status(
                booking.spot_id,
                booking.id,
                booking.status,
                LifecycleEvent::RenterCancelled,
                self.clock.now(),
            )
            .await?;
        observability::record_transition(BookingStatus::Cancelled, "renter");
        info!(booking = %booking_id, from = %booking.status, "booking cancelled by renter");
        Ok(cancelled)
    }

    /// Move a booking to a new window, repricing it. The status is kept.
    ///
    /// The booking's current window does not count against the new one; every other live
    /// booking of the spot does.
    pub async fn update(
        &self,
        renter_id: RenterId,
        booking_id: BookingId,
        new_start: Ms,
        new_end: Ms,
    ) -> Result<Booking, BookingError> {
        let booking = self.require_booking(booking_id).await?;
        ensure_owner(&booking, renter_id)?;
        let now = self.clock.now();
        // Fail on status and cutoff before judging the new window.
        lifecycle::next_status(&booking, LifecycleEvent::RenterRescheduled, now)?;

        let span = validate_window(new_start, new_end, now)?;
        let spot = self.require_spot(booking.spot_id).await?;
        check_spot_open(&spot, &span)?;
        let amount = pricing::price(&spot.rates(), &span);

        let guard = self.guard;
        let expected = booking.status;
        let updated = self
            .store
            .write_in_spot(
                booking.spot_id,
                Box::new(move |ledger: &SpotLedger| -> Result<Booking, BookingError> {
                    let current = ledger
                        .get(&booking_id)
                        .ok_or(BookingError::ResourceNotFound(Entity::Booking, booking_id))?;
                    if current.status != expected {
                        return Err(BookingError::ActionNotAllowed(Denial::StatusChanged {
                            expected,
                            found: current.status,
                        }));
                    }
                    let status =
                        lifecycle::next_status(current, LifecycleEvent::RenterRescheduled, now)?;
                    guard.check(ledger, &span, Some(booking_id))?;
                    Ok(Booking {
                        span,
                        total_amount: amount,
                        status,
                        ..current.clone()
                    })
                }),
            )
            .await
            .inspect_err(|e| count_conflict(e, "update"))?;

        info!(
            booking = %booking_id,
            start = span.start,
            end = span.end,
            amount = %updated.total_amount,
            "booking rescheduled"
        );
        Ok(updated)
    }

    pub async fn get(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.require_booking(booking_id).await
    }

    pub async fn get_by_renter(&self, renter_id: RenterId) -> Result<Vec<Booking>, BookingError> {
        self.require_renter(renter_id).await?;
        self.store.find_by_renter(renter_id).await
    }

    pub async fn get_by_spot(&self, spot_id: SpotId) -> Result<Vec<Booking>, BookingError> {
        self.require_spot(spot_id).await?;
        self.store.find_by_spot(spot_id, &[]).await
    }

    /// Every booking in the system. Callers are expected to restrict this to administrators.
    pub async fn get_all(&self) -> Result<Vec<Booking>, BookingError> {
        self.store.find_all().await
    }

    /// Spots that hold bookings but are missing from the catalog. Their bookings still
    /// reconcile, but no renter request can reach them.
    pub async fn unlisted_spots(&self) -> Result<Vec<SpotId>, BookingError> {
        let mut seen = HashSet::new();
        let mut unlisted = Vec::new();
        for booking in self.store.find_all().await? {
            if seen.insert(booking.spot_id) && self.spots.find_spot(booking.spot_id).await?.is_none()
            {
                unlisted.push(booking.spot_id);
            }
        }
        Ok(unlisted)
    }

    async fn require_booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(BookingError::ResourceNotFound(Entity::Booking, id))
    }

    async fn require_spot(&self, id: SpotId) -> Result<Spot, BookingError> {
        self.spots
            .find_spot(id)
            .await?
            .ok_or(BookingError::ResourceNotFound(Entity::Spot, id))
    }

    async fn require_renter(&self, id: RenterId) -> Result<Renter, BookingError> {
        self.renters
            .find_renter(id)
            .await?
            .ok_or(BookingError::ResourceNotFound(Entity::Renter, id))
    }
}

fn ensure_owner(booking: &Booking, renter_id: RenterId) -> Result<(), BookingError> {
    if booking.renter_id != renter_id {
        return Err(BookingError::ActionNotAllowed(Denial::NotOwner));
    }
    Ok(())
}

fn check_spot_open(spot: &Spot, span: &Span) -> Result<(), BookingError> {
    if !spot.active {
        return Err(BookingError::ActionNotAllowed(Denial::SpotInactive(spot.id)));
    }
    if !spot.admits(span) {
        return Err(BookingError::ActionNotAllowed(Denial::OutsideAvailability(spot.id)));
    }
    Ok(())
}

fn count_conflict(err: &BookingError, operation: &'static str) {
    if matches!(err, BookingError::OverlapConflict(_)) {
        metrics::counter!(observability::OVERLAP_CONFLICTS_TOTAL, "operation" => operation)
            .increment(1);
    }
}
