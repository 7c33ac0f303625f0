use ulid::Ulid;

use crate::lifecycle::LifecycleEvent;
use crate::model::{BookingId, BookingStatus, SpotId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Renter,
    Spot,
    Booking,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Renter => f.write_str("renter"),
            Entity::Spot => f.write_str("spot"),
            Entity::Booking => f.write_str("booking"),
        }
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    NotOwner,
    /// Fewer than 60 minutes remain before the booking starts.
    CutoffPassed { event: LifecycleEvent, ms_to_start: i64 },
    /// A time-triggered transition whose instant has not arrived.
    NotYetDue { event: LifecycleEvent },
    InvalidTransition { event: LifecycleEvent, status: BookingStatus },
    /// The status moved between the read and the write.
    StatusChanged { expected: BookingStatus, found: BookingStatus },
    /// A write that would skip or reverse a lifecycle edge. `from` is `None` for a new record.
    IllegalStatusChange { from: Option<BookingStatus>, to: BookingStatus },
    SpotInactive(SpotId),
    OutsideAvailability(SpotId),
    /// Payment can only be started for a PENDING booking.
    NotPayable(BookingStatus),
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::NotOwner => f.write_str("only the renter who made the booking may change it"),
            Denial::CutoffPassed { event, ms_to_start } => write!(
                f,
                "{event} requires at least 60 minutes before start ({} min left)",
                ms_to_start / 60_000
            ),
            Denial::NotYetDue { event } => write!(f, "{event} is not due yet"),
            Denial::InvalidTransition { event, status } => {
                write!(f, "{event} is not permitted while booking is {status}")
            }
            Denial::StatusChanged { expected, found } => {
                write!(f, "booking status changed from {expected} to {found}")
            }
            Denial::IllegalStatusChange { from: Some(from), to } => {
                write!(f, "booking cannot move from {from} to {to}")
            }
            Denial::IllegalStatusChange { from: None, to } => {
                write!(f, "new bookings start as PENDING, not {to}")
            }
            Denial::SpotInactive(id) => write!(f, "spot {id} is not active"),
            Denial::OutsideAvailability(id) => {
                write!(f, "window lies outside the availability of spot {id}")
            }
            Denial::NotPayable(status) => {
                write!(f, "only PENDING bookings can be paid, booking is {status}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    ResourceNotFound(Entity, Ulid),
    ActionNotAllowed(Denial),
    /// Names the booking that holds the contested window.
    OverlapConflict(BookingId),
    InvalidTimeRange(&'static str),
    LimitExceeded(&'static str),
    Payment(String),
    WalError(String),
}

impl BookingError {
    /// True when the error only says another writer got there first.
    pub fn is_lost_race(&self) -> bool {
        matches!(
            self,
            BookingError::ActionNotAllowed(
                Denial::StatusChanged { .. } | Denial::InvalidTransition { .. }
            )
        )
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::ResourceNotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            BookingError::ActionNotAllowed(denial) => write!(f, "action not allowed: {denial}"),
            BookingError::OverlapConflict(id) => {
                write!(f, "spot is already booked during this period (conflicts with {id})")
            }
            BookingError::InvalidTimeRange(msg) => write!(f, "invalid time range: {msg}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::Payment(msg) => write!(f, "payment error: {msg}"),
            BookingError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}
