use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

pub type BookingId = Ulid;
pub type SpotId = Ulid;
pub type RenterId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The span grown by `margin` on both ends.
    pub fn widened(&self, margin: Ms) -> Span {
        Span::new(self.start - margin, self.end + margin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that hold the spot for their window.
    pub const BLOCKING: [BookingStatus; 3] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Active,
    ];

    pub fn blocks_spot(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Active => "ACTIVE",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A renter's reservation of one spot for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub spot_id: SpotId,
    pub renter_id: RenterId,
    pub span: Span,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    /// Opaque payment-intent id, set once a payment attempt has been started.
    pub payment_reference: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    /// A fresh PENDING booking. Timestamps are stamped by the store on first write.
    pub fn pending(
        id: BookingId,
        spot_id: SpotId,
        renter_id: RenterId,
        span: Span,
        total_amount: Decimal,
        now: Ms,
    ) -> Self {
        Self {
            id,
            spot_id,
            renter_id,
            span,
            total_amount,
            status: BookingStatus::Pending,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Hourly and daily rates of a spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSchedule {
    pub per_hour: Decimal,
    pub per_day: Decimal,
}

/// A reservable parking spot. Owned by the catalog, read-only to bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spot {
    pub id: SpotId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub price_per_hour: Decimal,
    pub price_per_day: Decimal,
    #[serde(default)]
    pub available_from: Option<Ms>,
    #[serde(default)]
    pub available_to: Option<Ms>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Spot {
    pub fn rates(&self) -> RateSchedule {
        RateSchedule {
            per_hour: self.price_per_hour,
            per_day: self.price_per_day,
        }
    }

    /// Whether `span` lies inside the spot's availability window (open ends are unbounded).
    pub fn admits(&self, span: &Span) -> bool {
        self.available_from.is_none_or(|from| span.start >= from)
            && self.available_to.is_none_or(|to| span.end <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renter {
    pub id: RenterId,
    #[serde(default)]
    pub email: Option<String>,
}

/// All bookings of one spot, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct SpotLedger {
    pub spot_id: SpotId,
    pub bookings: Vec<Booking>,
}

impl SpotLedger {
    pub fn new(spot_id: SpotId) -> Self {
        Self {
            spot_id,
            bookings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn get(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: &BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == *id)?;
        Some(self.bookings.remove(pos))
    }

    /// Replace the record with the same id (or insert it) keeping sort order.
    pub fn upsert(&mut self, booking: Booking) {
        self.remove(&booking.id);
        self.insert(booking);
    }

    /// Bookings whose raw span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// WAL record format. Both variants carry the full record; replay is last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingPlaced { booking: Booking },
    BookingRevised { booking: Booking },
}

impl Event {
    pub fn booking(&self) -> &Booking {
        match self {
            Event::BookingPlaced { booking } | Event::BookingRevised { booking } => booking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking::pending(
            Ulid::new(),
            Ulid::new(),
            Ulid::new(),
            Span::new(start, end),
            dec!(0),
            0,
        )
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_widened() {
        let s = Span::new(100, 200).widened(10);
        assert_eq!(s, Span::new(90, 210));
        assert_eq!(s.duration_ms(), 120);
    }

    #[test]
    fn status_classification() {
        assert!(BookingStatus::Pending.blocks_spot());
        assert!(BookingStatus::Active.blocks_spot());
        assert!(!BookingStatus::Cancelled.blocks_spot());
        assert!(!BookingStatus::Completed.blocks_spot());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert_eq!(BookingStatus::Confirmed.to_string(), "CONFIRMED");
    }

    #[test]
    fn spot_availability_window() {
        let spot = Spot {
            id: Ulid::new(),
            title: None,
            address: None,
            city: None,
            price_per_hour: dec!(2),
            price_per_day: dec!(20),
            available_from: Some(1_000),
            available_to: Some(5_000),
            active: true,
        };
        assert!(spot.admits(&Span::new(1_000, 5_000)));
        assert!(!spot.admits(&Span::new(999, 2_000)));
        assert!(!spot.admits(&Span::new(2_000, 5_001)));

        let open = Spot { available_from: None, available_to: None, ..spot };
        assert!(open.admits(&Span::new(0, Ms::MAX)));
    }

    #[test]
    fn ledger_keeps_start_order() {
        let mut ledger = SpotLedger::new(Ulid::new());
        ledger.insert(booking(300, 400));
        ledger.insert(booking(100, 200));
        ledger.insert(booking(200, 300));
        let starts: Vec<Ms> = ledger.bookings.iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn ledger_upsert_moves_rescheduled_record() {
        let mut ledger = SpotLedger::new(Ulid::new());
        let first = booking(100, 200);
        let second = booking(300, 400);
        ledger.insert(first.clone());
        ledger.insert(second.clone());

        let moved = Booking { span: Span::new(500, 600), ..first.clone() };
        ledger.upsert(moved);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.bookings[0].id, second.id);
        assert_eq!(ledger.bookings[1].id, first.id);
        assert_eq!(ledger.bookings[1].span.start, 500);
    }

    #[test]
    fn ledger_remove_nonexistent_returns_none() {
        let mut ledger = SpotLedger::new(Ulid::new());
        ledger.insert(booking(100, 200));
        assert!(ledger.remove(&Ulid::new()).is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut ledger = SpotLedger::new(Ulid::new());
        ledger.insert(booking(100, 200));
        ledger.insert(booking(450, 600));
        ledger.insert(booking(1000, 1100));

        let hits: Vec<_> = ledger.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut ledger = SpotLedger::new(Ulid::new());
        ledger.insert(booking(100, 200));
        assert_eq!(ledger.overlapping(&Span::new(200, 300)).count(), 0);
    }

    #[test]
    fn overlapping_long_booking_spanning_query() {
        let mut ledger = SpotLedger::new(Ulid::new());
        ledger.insert(booking(0, 10_000));
        assert_eq!(ledger.overlapping(&Span::new(500, 600)).count(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingPlaced {
            booking: Booking {
                payment_reference: Some("pi_123".into()),
                total_amount: dec!(22.00),
                ..booking(1_000, 2_000)
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.booking().total_amount, dec!(22.00));
    }
}
