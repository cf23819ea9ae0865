//! Long-running admission stress test for the Slotkeeper engine.
//!
//! Runs many rounds of concurrent book/confirm/cancel traffic against one
//! file-backed store, checking after every round that the ledger agrees with the
//! reservations holding capacity and that no write-ahead entries leak.
//!
//! Usage:
//!   cargo run --bin stress_test -- [--rounds N] [--threads N]

use chrono::{Duration, Utc};
use slotkeeper_core::{CoreError, ReservationEngine};
use slotkeeper_schema::{ActivityId, OccurrenceId, UserId};
use slotkeeper_store::{verify_store_integrity, FileStore, StoreLayout, WriteAheadLog};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

#[derive(Default)]
struct Tally {
    booked: u64,
    confirmed: u64,
    cancelled: u64,
    refused: u64,
    conflicts: u64,
    errors: u64,
}

impl Tally {
    fn merge(&mut self, other: &Tally) {
        self.booked += other.booked;
        self.confirmed += other.confirmed;
        self.cancelled += other.cancelled;
        self.refused += other.refused;
        self.conflicts += other.conflicts;
        self.errors += other.errors;
    }

    fn record(&mut self, outcome: Result<(), CoreError>, ok: fn(&mut Tally)) {
        match outcome {
            Ok(()) => ok(self),
            Err(CoreError::CapacityExceeded { .. }) => self.refused += 1,
            Err(e) if e.is_transient() => self.conflicts += 1,
            Err(e) => {
                eprintln!("  unexpected error: {e}");
                self.errors += 1;
            }
        }
    }
}

fn worker(engine: &ReservationEngine, user: &UserId, occ: &OccurrenceId, seed: usize) -> Tally {
    let mut tally = Tally::default();
    for step in 0..20 {
        let amount = u32::try_from(1 + (seed + step) % 3).unwrap_or(1);
        match (seed + step) % 4 {
            0 => tally.record(engine.book(user, occ, amount, "").map(|_| ()), |t| t.booked += 1),
            1 | 2 => {
                let outcome = engine
                    .create(user, occ, amount, "")
                    .and_then(|r| engine.confirm(&r.id))
                    .map(|_| ());
                tally.record(outcome, |t| t.confirmed += 1);
            }
            _ => {
                let outcome = engine
                    .book(user, occ, 1, "")
                    .and_then(|r| engine.cancel(&r.id))
                    .map(|_| ());
                tally.record(outcome, |t| t.cancelled += 1);
            }
        }
    }
    tally
}

fn check_health(layout: &StoreLayout, round: usize) -> u64 {
    let mut failures = 0u64;
    match verify_store_integrity(layout) {
        Ok(report) => {
            if !report.failed.is_empty() {
                eprintln!(
                    "  round {round}: INTEGRITY FAILURE: {} records failed",
                    report.failed.len()
                );
                for f in &report.failed {
                    eprintln!("    {}: {}", f.record, f.reason);
                }
                failures += 1;
            }
        }
        Err(e) => {
            eprintln!("  round {round}: INTEGRITY CHECK ERROR: {e}");
            failures += 1;
        }
    }
    match WriteAheadLog::new(layout).list_incomplete() {
        Ok(entries) if !entries.is_empty() => {
            eprintln!("  round {round}: WAL LEAK: {} stale entries", entries.len());
            failures += 1;
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("  round {round}: WAL READ ERROR: {e}");
            failures += 1;
        }
    }
    failures
}

fn arg_value(args: &[String], flag: &str, default: usize) -> usize {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let rounds = arg_value(&args, "--rounds", 50);
    let threads = arg_value(&args, "--threads", 8);

    println!("Slotkeeper stress test: {rounds} rounds x {threads} threads");
    println!("============================================");

    let store_dir = tempfile::tempdir().expect("create temp dir");
    let store = Arc::new(FileStore::open(store_dir.path()).expect("open store"));
    let layout = store.layout().clone();
    let engine = Arc::new(ReservationEngine::new(store));
    let user = engine
        .register_user("stress@example.org", "Stress")
        .expect("register user")
        .id;

    let mut total = Tally::default();
    let mut failures = 0u64;
    let mut elapsed = StdDuration::ZERO;

    for round in 1..=rounds {
        let occ = engine
            .schedule_occurrence(
                ActivityId::new("stress"),
                Utc::now() + Duration::days(1),
                25,
                false,
            )
            .expect("schedule occurrence")
            .id;

        let barrier = Arc::new(Barrier::new(threads));
        let t0 = Instant::now();
        let handles: Vec<_> = (0..threads)
            .map(|seed| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                let user = user.clone();
                let occ = occ.clone();
                thread::spawn(move || {
                    barrier.wait();
                    worker(&engine, &user, &occ, seed)
                })
            })
            .collect();
        for h in handles {
            match h.join() {
                Ok(tally) => total.merge(&tally),
                Err(_) => failures += 1,
            }
        }
        elapsed += t0.elapsed();

        match engine.availability(&occ) {
            Ok(usage) if usage.used > usage.maximum => {
                eprintln!("  round {round}: OVERBOOKED: {}/{}", usage.used, usage.maximum);
                failures += 1;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  round {round}: AVAILABILITY ERROR: {e}");
                failures += 1;
            }
        }
        failures += check_health(&layout, round);
        if round % 10 == 0 {
            println!(
                "  round {round}/{rounds}: {:.1}s elapsed, {failures} failures",
                elapsed.as_secs_f64()
            );
        }
    }

    println!();
    println!("============================================");
    println!("Results: {rounds} rounds, {failures} failures");
    println!("  booked:    {}", total.booked);
    println!("  confirmed: {}", total.confirmed);
    println!("  cancelled: {}", total.cancelled);
    println!("  refused:   {}", total.refused);
    println!("  conflicts: {}", total.conflicts);
    println!("  errors:    {}", total.errors);
    println!("  time:      {:.3}s", elapsed.as_secs_f64());

    if failures > 0 || total.errors > 0 {
        eprintln!("\nSTRESS TEST FAILED");
        std::process::exit(1);
    } else {
        println!("\nSTRESS TEST PASSED");
    }
}
