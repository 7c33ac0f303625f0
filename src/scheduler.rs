use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::BookingError;
use crate::lifecycle::LifecycleEvent;
use crate::model::*;
use crate::observability;
use crate::policy::PENDING_PAYMENT_TIMEOUT_MS;
use crate::store::{BookingStore, LedgerStore};

/// Counts from one reconcile run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub activated: usize,
    pub completed: usize,
    pub expired: usize,
    /// Items another writer moved first.
    pub skipped: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> usize {
        self.activated + self.completed + self.expired
    }
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Activate,
    Complete,
    Expire,
}

impl Pass {
    const ALL: [Pass; 3] = [Pass::Activate, Pass::Complete, Pass::Expire];

    fn label(self) -> &'static str {
        match self {
            Pass::Activate => "activate",
            Pass::Complete => "complete",
            Pass::Expire => "expire",
        }
    }

    fn from_status(self) -> BookingStatus {
        match self {
            Pass::Activate => BookingStatus::Confirmed,
            Pass::Complete => BookingStatus::Active,
            Pass::Expire => BookingStatus::Pending,
        }
    }

    fn event(self) -> LifecycleEvent {
        match self {
            Pass::Activate | Pass::Complete => LifecycleEvent::SchedulerTick,
            Pass::Expire => LifecycleEvent::PaymentTimedOut,
        }
    }
}

/// Advances bookings whose next transition depends only on the clock.
///
/// Every write is conditioned on the status the pass read, so a booking a renter or a
/// payment callback touched in between is skipped rather than overwritten. Running the
/// same passes again right away changes nothing.
pub struct BookingScheduler {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl BookingScheduler {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// One activate, complete and expire pass, in that order, against a single instant.
    pub async fn run_once(&self) -> ReconcileReport {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = ReconcileReport::default();

        for pass in Pass::ALL {
            let advanced = self.run_pass(pass, now, &mut report).await;
            match pass {
                Pass::Activate => report.activated = advanced,
                Pass::Complete => report.completed = advanced,
                Pass::Expire => report.expired = advanced,
            }
        }

        metrics::histogram!(observability::RECONCILE_PASS_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if report.changed() > 0 || report.failed > 0 {
            info!(
                activated = report.activated,
                completed = report.completed,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "reconcile run finished"
            );
        }
        report
    }

    async fn due(&self, pass: Pass, now: Ms) -> Result<Vec<Booking>, BookingError> {
        let status = pass.from_status();
        match pass {
            Pass::Activate => self.store.find_by_status_and_start_before(status, now).await,
            Pass::Complete => self.store.find_by_status_and_end_before(status, now).await,
            Pass::Expire => {
                self.store
                    .find_by_status_and_created_before(status, now - PENDING_PAYMENT_TIMEOUT_MS)
                    .await
            }
        }
    }

    /// Returns how many bookings the pass advanced. A failing item never stops the pass.
    async fn run_pass(&self, pass: Pass, now: Ms, report: &mut ReconcileReport) -> usize {
        let due = match self.due(pass, now).await {
            Ok(due) => due,
            Err(e) => {
                error!(pass = pass.label(), "reconcile query failed: {e}");
                metrics::counter!(observability::RECONCILE_FAILURES_TOTAL, "pass" => pass.label())
                    .increment(1);
                report.failed += 1;
                return 0;
            }
        };

        let mut advanced = 0;
        for booking in due {
            let result = self
                .store
                .advance_status(booking.spot_id, booking.id, pass.from_status(), pass.event(), now)
                .await;
            match result {
                Ok(updated) => {
                    advanced += 1;
                    observability::record_transition(updated.status, "scheduler");
                    info!(
                        booking = %updated.id,
                        pass = pass.label(),
                        "{} -> {}",
                        booking.status,
                        updated.status
                    );
                }
                Err(e) if e.is_lost_race() => {
                    report.skipped += 1;
                    debug!(booking = %booking.id, pass = pass.label(), "reconcile skip: {e}");
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!(
                        observability::RECONCILE_FAILURES_TOTAL,
                        "pass" => pass.label()
                    )
                    .increment(1);
                    warn!(booking = %booking.id, pass = pass.label(), "reconcile failed: {e}");
                }
            }
        }
        advanced
    }
}

/// Background task that runs the reconciler on a fixed cadence.
pub async fn run_scheduler(scheduler: Arc<BookingScheduler>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        scheduler.run_once().await;
    }
}

/// Background task that compacts the ledger's WAL once enough appends have piled up.
pub async fn run_compactor(store: Arc<LedgerStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact_wal().await {
            Ok(()) => info!(appends, bookings = store.booking_count(), "WAL compacted"),
            Err(e) => error!("WAL compaction failed: {e}"),
        }
    }
}
