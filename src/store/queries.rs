use crate::model::*;

use super::{LedgerStore, SharedLedger};

fn by_start(bookings: &mut [Booking]) {
    bookings.sort_by_key(|b| (b.span.start, b.id));
}

impl LedgerStore {
    /// Snapshot of the ledger handles so no map guard is held across an await.
    pub(super) fn ledgers(&self) -> Vec<SharedLedger> {
        self.spots.iter().map(|e| e.value().clone()).collect()
    }

    /// Every booking matching `pred`, ordered by start.
    pub(super) async fn scan(&self, pred: impl Fn(&Booking) -> bool + Send + Sync) -> Vec<Booking> {
        let mut out = Vec::new();
        for ledger in self.ledgers() {
            let guard = ledger.read().await;
            out.extend(guard.bookings.iter().filter(|b| pred(b)).cloned());
        }
        by_start(&mut out);
        out
    }

    pub(super) async fn booking(&self, id: &BookingId) -> Option<Booking> {
        let spot_id = self.booking_to_spot.get(id).map(|e| *e.value())?;
        let ledger = self.get_ledger(&spot_id)?;
        let guard = ledger.read().await;
        guard.get(id).cloned()
    }

    pub(super) async fn spot_bookings(
        &self,
        spot_id: &SpotId,
        statuses: &[BookingStatus],
    ) -> Vec<Booking> {
        let Some(ledger) = self.get_ledger(spot_id) else {
            return Vec::new();
        };
        let guard = ledger.read().await;
        guard
            .bookings
            .iter()
            .filter(|b| statuses.is_empty() || statuses.contains(&b.status))
            .cloned()
            .collect()
    }

    pub(super) async fn renter_bookings(&self, renter_id: &RenterId) -> Vec<Booking> {
        let ids = self
            .by_renter
            .get(renter_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(b) = self.booking(&id).await {
                out.push(b);
            }
        }
        by_start(&mut out);
        out
    }
}
