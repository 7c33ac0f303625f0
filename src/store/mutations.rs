use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{BookingError, Denial};
use crate::guard::check_duration;
use crate::lifecycle;
use crate::limits::*;
use crate::model::*;

use super::{LedgerStore, SpotTxn, WalCommand, index_booking};

/// Invariants every stored record satisfies, checked against the record it replaces.
fn check_record(booking: &Booking, previous: Option<&Booking>) -> Result<(), BookingError> {
    if booking.span.start >= booking.span.end {
        return Err(BookingError::InvalidTimeRange("start time must be before end time"));
    }
    check_duration(&booking.span)?;
    if booking
        .payment_reference
        .as_ref()
        .is_some_and(|r| r.len() > MAX_PAYMENT_REFERENCE_LEN)
    {
        return Err(BookingError::LimitExceeded("payment reference too long"));
    }
    match previous {
        None if booking.status != BookingStatus::Pending => Err(BookingError::ActionNotAllowed(
            Denial::IllegalStatusChange {
                from: None,
                to: booking.status,
            },
        )),
        None => Ok(()),
        Some(prev) if prev.renter_id != booking.renter_id => {
            Err(BookingError::ActionNotAllowed(Denial::NotOwner))
        }
        Some(prev) if !lifecycle::is_edge(prev.status, booking.status) => {
            Err(BookingError::ActionNotAllowed(Denial::IllegalStatusChange {
                from: Some(prev.status),
                to: booking.status,
            }))
        }
        Some(_) => Ok(()),
    }
}

impl LedgerStore {
    /// Lock the spot, run `txn`, validate and stamp its result, then log and apply it
    /// before the lock is released.
    pub(super) async fn commit_in_spot(
        &self,
        spot_id: SpotId,
        txn: SpotTxn<'_>,
    ) -> Result<Booking, BookingError> {
        let _gate = self.compaction_gate.read().await;
        let ledger = self.ledger_or_create(spot_id);
        let mut guard = ledger.write().await;

        let mut booking = txn(&*guard)?;
        if booking.spot_id != spot_id {
            return Err(BookingError::LimitExceeded("bookings cannot move between spots"));
        }
        let previous = guard.get(&booking.id).cloned();
        if previous.is_none() {
            if self.booking_to_spot.contains_key(&booking.id) {
                return Err(BookingError::LimitExceeded("bookings cannot move between spots"));
            }
            if guard.len() >= MAX_BOOKINGS_PER_SPOT {
                return Err(BookingError::LimitExceeded("too many bookings on spot"));
            }
        }
        check_record(&booking, previous.as_ref())?;

        let now = self.clock.now();
        booking.created_at = previous.as_ref().map_or(now, |p| p.created_at);
        booking.updated_at = now;

        let event = match previous {
            None => Event::BookingPlaced {
                booking: booking.clone(),
            },
            Some(_) => Event::BookingRevised {
                booking: booking.clone(),
            },
        };
        self.wal_append(&event).await?;
        index_booking(&self.booking_to_spot, &self.by_renter, &booking);
        guard.upsert(booking.clone());
        debug!(booking = %booking.id, spot = %spot_id, status = %booking.status, "booking written");
        Ok(booking)
    }

    /// Rewrite the log with one `BookingPlaced` per stored record.
    ///
    /// No commit runs between the snapshot and the swap, so every acknowledged write is
    /// either in the snapshot or appended to the new log.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();
        for ledger in self.ledgers() {
            let guard = ledger.read().await;
            events.extend(guard.bookings.iter().map(|b| Event::BookingPlaced {
                booking: b.clone(),
            }));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_request(WalCommand::Compact {
            events,
            response: tx,
        })
        .await?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_request(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
