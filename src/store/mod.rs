mod mutations;
mod queries;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::clock::Clock;
use crate::error::{BookingError, Denial, Entity};
use crate::lifecycle::{self, LifecycleEvent};
use crate::model::*;
use crate::wal::Wal;

pub type SharedLedger = Arc<RwLock<SpotLedger>>;

/// A unit of work run while the spot's write lock is held. Returns the record to write.
pub type SpotTxn<'a> =
    Box<dyn FnOnce(&SpotLedger) -> Result<Booking, BookingError> + Send + 'a>;

/// Booking persistence.
///
/// Every write goes through `write_in_spot`, which serializes all writers of one spot:
/// the transaction sees the spot's bookings as they are and its result is durable before
/// the next writer runs. Different spots never wait on each other.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn write_in_spot(
        &self,
        spot_id: SpotId,
        txn: SpotTxn<'_>,
    ) -> Result<Booking, BookingError>;

    /// Upsert without any conflict check. Stamps `created_at` on first insert and
    /// `updated_at` on every write.
    async fn save(&self, booking: Booking) -> Result<Booking, BookingError> {
        let spot_id = booking.spot_id;
        self.write_in_spot(
            spot_id,
            Box::new(move |_: &SpotLedger| -> Result<Booking, BookingError> { Ok(booking) }),
        )
        .await
    }

    /// Compare-and-swap transition: applies `event` only if the stored status is still
    /// `expected` when the lock is taken.
    async fn advance_status(
        &self,
        spot_id: SpotId,
        id: BookingId,
        expected: BookingStatus,
        event: LifecycleEvent,
        now: Ms,
    ) -> Result<Booking, BookingError> {
        self.write_in_spot(
            spot_id,
            Box::new(move |ledger: &SpotLedger| -> Result<Booking, BookingError> {
                let current = ledger
                    .get(&id)
                    .ok_or(BookingError::ResourceNotFound(Entity::Booking, id))?;
                if current.status != expected {
                    return Err(BookingError::ActionNotAllowed(Denial::StatusChanged {
                        expected,
                        found: current.status,
                    }));
                }
                let status = lifecycle::next_status(current, event, now)?;
                Ok(Booking {
                    status,
                    ..current.clone()
                })
            }),
        )
        .await
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingError>;

    /// Bookings of a spot in any of `statuses`; an empty slice means every status.
    async fn find_by_spot(
        &self,
        spot_id: SpotId,
        statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, BookingError>;

    async fn find_by_renter(&self, renter_id: RenterId) -> Result<Vec<Booking>, BookingError>;

    async fn find_all(&self) -> Result<Vec<Booking>, BookingError>;

    /// Bookings in `status` whose start is at or before `cutoff`.
    async fn find_by_status_and_start_before(
        &self,
        status: BookingStatus,
        cutoff: Ms,
    ) -> Result<Vec<Booking>, BookingError>;

    /// Bookings in `status` whose end is at or before `cutoff`.
    async fn find_by_status_and_end_before(
        &self,
        status: BookingStatus,
        cutoff: Ms,
    ) -> Result<Vec<Booking>, BookingError>;

    /// Bookings in `status` created at or before `cutoff`.
    async fn find_by_status_and_created_before(
        &self,
        status: BookingStatus,
        cutoff: Ms,
    ) -> Result<Vec<Booking>, BookingError>;
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL. Appends that arrive while one is being handled
/// are drained into the same batch and share a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so a half-written batch never leaks into the next one.
    let flushed = wal.flush_sync();
    let result = result.and(flushed);

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// In-memory booking ledger made durable by a write-ahead log.
pub struct LedgerStore {
    pub(super) spots: DashMap<SpotId, SharedLedger>,
    pub(super) booking_to_spot: DashMap<BookingId, SpotId>,
    pub(super) by_renter: DashMap<RenterId, Vec<BookingId>>,
    pub(super) clock: Arc<dyn Clock>,
    /// Commits hold this shared; compaction holds it exclusively from snapshot to swap.
    pub(super) compaction_gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl LedgerStore {
    /// Replay the log at `wal_path` and start its writer task. Must run inside a Tokio runtime.
    pub fn open(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut ledgers: HashMap<SpotId, SpotLedger> = HashMap::new();
        let booking_to_spot = DashMap::new();
        let by_renter: DashMap<RenterId, Vec<BookingId>> = DashMap::new();
        for event in events {
            let booking = match event {
                Event::BookingPlaced { booking } | Event::BookingRevised { booking } => booking,
            };
            index_booking(&booking_to_spot, &by_renter, &booking);
            ledgers
                .entry(booking.spot_id)
                .or_insert_with(|| SpotLedger::new(booking.spot_id))
                .upsert(booking);
        }

        Ok(Self {
            spots: ledgers
                .into_iter()
                .map(|(id, ledger)| (id, Arc::new(RwLock::new(ledger))))
                .collect(),
            booking_to_spot,
            by_renter,
            clock,
            compaction_gate: RwLock::new(()),
            wal_tx,
        })
    }

    pub fn spot_count(&self) -> usize {
        self.spots.len()
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_spot.len()
    }

    pub(super) fn get_ledger(&self, spot_id: &SpotId) -> Option<SharedLedger> {
        self.spots.get(spot_id).map(|e| e.value().clone())
    }

    pub(super) fn ledger_or_create(&self, spot_id: SpotId) -> SharedLedger {
        self.spots
            .entry(spot_id)
            .or_insert_with(|| Arc::new(RwLock::new(SpotLedger::new(spot_id))))
            .value()
            .clone()
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    pub(super) async fn wal_request(&self, cmd: WalCommand) -> Result<(), BookingError> {
        self.wal_tx
            .send(cmd)
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))
    }
}

fn index_booking(
    booking_to_spot: &DashMap<BookingId, SpotId>,
    by_renter: &DashMap<RenterId, Vec<BookingId>>,
    booking: &Booking,
) {
    if booking_to_spot.insert(booking.id, booking.spot_id).is_none() {
        by_renter.entry(booking.renter_id).or_default().push(booking.id);
    }
}

#[async_trait]
impl BookingStore for LedgerStore {
    async fn write_in_spot(
        &self,
        spot_id: SpotId,
        txn: SpotTxn<'_>,
    ) -> Result<Booking, BookingError> {
        self.commit_in_spot(spot_id, txn).await
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingError> {
        Ok(self.booking(&id).await)
    }

    async fn find_by_spot(
        &self,
        spot_id: SpotId,
        statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self.spot_bookings(&spot_id, statuses).await)
    }

    async fn find_by_renter(&self, renter_id: RenterId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.renter_bookings(&renter_id).await)
    }

    async fn find_all(&self) -> Result<Vec<Booking>, BookingError> {
        Ok(self.scan(|_| true).await)
    }

    async fn find_by_status_and_start_before(
        &self,
        status: BookingStatus,
        cutoff: Ms,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self
            .scan(move |b| b.status == status && b.span.start <= cutoff)
            .await)
    }

    async fn find_by_status_and_end_before(
        &self,
        status: BookingStatus,
        cutoff: Ms,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self
            .scan(move |b| b.status == status && b.span.end <= cutoff)
            .await)
    }

    async fn find_by_status_and_created_before(
        &self,
        status: BookingStatus,
        cutoff: Ms,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self
            .scan(move |b| b.status == status && b.created_at <= cutoff)
            .await)
    }
}
