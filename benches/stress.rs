use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use ulid::Ulid;

use parkd::clock::{Clock, SystemClock};
use parkd::directory::InMemoryDirectory;
use parkd::error::BookingError;
use parkd::model::{Renter, Spot, SpotId};
use parkd::payment::LocalGateway;
use parkd::scheduler::BookingScheduler;
use parkd::service::BookingService;
use parkd::store::LedgerStore;

const HOUR: i64 = 3_600_000; // 1 hour in ms

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

struct Bench {
    service: Arc<BookingService>,
    store: Arc<LedgerStore>,
    spots: Vec<SpotId>,
    renters: Vec<Ulid>,
    /// First bookable instant, a day out so nothing trips the cutoff.
    base: i64,
}

fn setup(n_spots: usize, n_renters: usize) -> Bench {
    let dir = std::env::temp_dir().join("parkd_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let wal = dir.join(format!("{}.wal", Ulid::new()));

    let clock = Arc::new(SystemClock);
    let store = Arc::new(LedgerStore::open(wal, clock.clone()).unwrap());
    let directory = Arc::new(InMemoryDirectory::new());

    let spots: Vec<SpotId> = (0..n_spots)
        .map(|_| {
            let id = Ulid::new();
            directory.insert_spot(Spot {
                id,
                title: None,
                address: None,
                city: None,
                price_per_hour: Decimal::new(250, 2),
                price_per_day: Decimal::new(2000, 2),
                available_from: None,
                available_to: None,
                active: true,
            });
            id
        })
        .collect();
    let renters: Vec<Ulid> = (0..n_renters)
        .map(|_| {
            let id = Ulid::new();
            directory.insert_renter(Renter { id, email: None });
            id
        })
        .collect();

    let service = Arc::new(BookingService::new(
        store.clone(),
        directory.clone(),
        directory,
        Arc::new(LocalGateway),
        clock.clone(),
    ));
    println!("  {} spots, {} renters", spots.len(), renters.len());
    Bench {
        service,
        store,
        spots,
        renters,
        base: clock.now() + 24 * HOUR,
    }
}

async fn phase1_sequential(bench: &Bench) {
    let n = 1_000;
    let spot = bench.spots[0];
    let renter = bench.renters[0];
    let mut latencies = Vec::with_capacity(n);

    let start = Instant::now();
    for i in 0..n {
        let s = bench.base + (i as i64) * 2 * HOUR;
        let t = Instant::now();
        bench
            .service
            .create(renter, spot, s, s + HOUR)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create latency", &mut latencies);
}

async fn phase2_spread(bench: &Bench) {
    let n_tasks = 16;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let service = bench.service.clone();
        // Spot 0 is taken by phase 1.
        let spot = bench.spots[1 + i % (bench.spots.len() - 1)];
        let renter = bench.renters[i % bench.renters.len()];
        let base = bench.base + (i as i64) * 10_000 * HOUR;
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(n_per_task);
            for j in 0..n_per_task {
                let s = base + (j as i64) * 2 * HOUR;
                let t = Instant::now();
                service.create(renter, spot, s, s + HOUR).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in handles {
        latencies.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("create latency", &mut latencies);
}

/// Every task fights for the same windows on one spot; each window admits one winner.
async fn phase3_contention(bench: &Bench) {
    let n_tasks = 32;
    let n_windows = 100;
    let spot = *bench.spots.last().unwrap();
    let base = bench.base + 500_000 * HOUR;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let service = bench.service.clone();
        let renter = bench.renters[i % bench.renters.len()];
        handles.push(tokio::spawn(async move {
            let mut won = 0usize;
            let mut latencies = Vec::with_capacity(n_windows);
            for w in 0..n_windows {
                let s = base + (w as i64) * 2 * HOUR;
                let t = Instant::now();
                match service.create(renter, spot, s, s + HOUR).await {
                    Ok(_) => won += 1,
                    Err(BookingError::OverlapConflict(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
                latencies.push(t.elapsed());
            }
            (won, latencies)
        }));
    }

    let mut won = 0;
    let mut latencies = Vec::new();
    for h in handles {
        let (w, l) = h.await.unwrap();
        won += w;
        latencies.extend(l);
    }
    println!(
        "  {n_tasks} tasks x {n_windows} windows: {won} accepted in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, n_windows, "each window must admit exactly one booking");
    print_latency("contended create latency", &mut latencies);
}

async fn phase4_reconcile(bench: &Bench) {
    let scheduler = BookingScheduler::new(bench.store.clone(), Arc::new(SystemClock));
    let t = Instant::now();
    let report = scheduler.run_once().await;
    println!(
        "  reconcile over {} bookings in {:.2}ms: {report:?}",
        bench.store.booking_count(),
        t.elapsed().as_secs_f64() * 1000.0
    );

    let t = Instant::now();
    bench.store.compact_wal().await.unwrap();
    println!("  compaction in {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);
}

#[tokio::main]
async fn main() {
    println!("=== parkd stress benchmark ===\n");

    println!("[setup]");
    let bench = setup(17, 64);

    println!("\n[phase 1] sequential create throughput");
    phase1_sequential(&bench).await;

    println!("\n[phase 2] concurrent creates across spots");
    phase2_spread(&bench).await;

    println!("\n[phase 3] concurrent creates on one spot");
    phase3_contention(&bench).await;

    println!("\n[phase 4] reconcile and compaction");
    phase4_reconcile(&bench).await;

    println!("\n=== benchmark complete ===");
}
