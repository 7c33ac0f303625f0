use tracing::{debug, info, warn};

use crate::error::{BookingError, Denial, Entity};
use crate::lifecycle::LifecycleEvent;
use crate::model::*;
use crate::observability;
use crate::payment::{PaymentFailurePolicy, PaymentIntent};
use crate::pricing;

use super::BookingService;

/// Result of a payment callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The booking moved to a new status.
    Applied(Booking),
    /// The failure was logged; the booking is left for the payment timeout.
    Recorded,
    /// Unknown booking, or it is no longer PENDING.
    Ignored,
}

impl BookingService {
    /// Open a payment intent for a PENDING booking and remember its reference on the booking.
    pub async fn start_payment(
        &self,
        booking_id: BookingId,
        currency: &str,
    ) -> Result<PaymentIntent, BookingError> {
        let booking = self.require_booking(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::ActionNotAllowed(Denial::NotPayable(booking.status)));
        }
        let amount_minor = pricing::to_minor_units(booking.total_amount)?;
        let intent = self
            .payments
            .create_intent(booking_id, amount_minor, currency)
            .await?;

        let reference = intent.reference.clone();
        self.store
            .write_in_spot(
                booking.spot_id,
                Box::new(move |ledger: &SpotLedger| -> Result<Booking, BookingError> {
                    let current = ledger
                        .get(&booking_id)
                        .ok_or(BookingError::ResourceNotFound(Entity::Booking, booking_id))?;
                    if current.status != BookingStatus::Pending {
                        return Err(BookingError::ActionNotAllowed(Denial::StatusChanged {
                            expected: BookingStatus::Pending,
                            found: current.status,
                        }));
                    }
                    Ok(Booking {
                        payment_reference: Some(reference),
                        ..current.clone()
                    })
                }),
            )
            .await?;

        info!(booking = %booking_id, reference = %intent.reference, amount_minor, "payment started");
        Ok(intent)
    }

    /// Provider reports success: PENDING becomes CONFIRMED. Anything else is a logged no-op.
    pub async fn on_payment_succeeded(
        &self,
        booking_id: BookingId,
    ) -> Result<CallbackOutcome, BookingError> {
        let Some(booking) = self.pending_for_callback(booking_id, "succeeded").await? else {
            return Ok(CallbackOutcome::Ignored);
        };
        self.apply_callback(&booking, LifecycleEvent::PaymentSucceeded)
            .await
    }

    /// Provider reports failure. Cancels only under `PaymentFailurePolicy::CancelImmediately`.
    pub async fn on_payment_failed(
        &self,
        booking_id: BookingId,
    ) -> Result<CallbackOutcome, BookingError> {
        let Some(booking) = self.pending_for_callback(booking_id, "failed").await? else {
            return Ok(CallbackOutcome::Ignored);
        };
        match self.failure_policy {
            PaymentFailurePolicy::AwaitTimeout => {
                warn!(
                    booking = %booking_id,
                    reference = booking.payment_reference.as_deref().unwrap_or("-"),
                    "payment failed, booking left to expire"
                );
                Ok(CallbackOutcome::Recorded)
            }
            PaymentFailurePolicy::CancelImmediately => {
                self.apply_callback(&booking, LifecycleEvent::PaymentFailed)
                    .await
            }
        }
    }

    /// The booking if it exists and is still PENDING.
    async fn pending_for_callback(
        &self,
        booking_id: BookingId,
        outcome: &'static str,
    ) -> Result<Option<Booking>, BookingError> {
        match self.store.find_by_id(booking_id).await? {
            None => {
                warn!(booking = %booking_id, outcome, "payment callback for unknown booking");
                metrics::counter!(observability::PAYMENT_CALLBACKS_IGNORED_TOTAL).increment(1);
                Ok(None)
            }
            Some(b) if b.status != BookingStatus::Pending => {
                warn!(booking = %booking_id, outcome, status = %b.status, "payment callback ignored");
                metrics::counter!(observability::PAYMENT_CALLBACKS_IGNORED_TOTAL).increment(1);
                Ok(None)
            }
            Some(b) => Ok(Some(b)),
        }
    }

    async fn apply_callback(
        &self,
        booking: &Booking,
        event: LifecycleEvent,
    ) -> Result<CallbackOutcome, BookingError> {
        let result = self
            .store
            .advance_status(
                booking.spot_id,
                booking.id,
                BookingStatus::Pending,
                event,
                self.clock.now(),
            )
            .await;
        match result {
            Ok(updated) => {
                observability::record_transition(updated.status, "payment");
                info!(booking = %updated.id, status = %updated.status, %event, "payment callback applied");
                Ok(CallbackOutcome::Applied(updated))
            }
            Err(e) if e.is_lost_race() => {
                debug!(booking = %booking.id, %event, "payment callback lost race: {e}");
                metrics::counter!(observability::PAYMENT_CALLBACKS_IGNORED_TOTAL).increment(1);
                Ok(CallbackOutcome::Ignored)
            }
            Err(e) => Err(e),
        }
    }
}
