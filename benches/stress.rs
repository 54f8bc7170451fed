use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use ulid::Ulid;

use deskbook::engine::Engine;
use deskbook::model::*;
use deskbook::notify::NullSink;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn hhmm(s: &str) -> NaiveTime {
    parse_hhmm(s).unwrap()
}

fn setup_engine() -> Engine {
    let dir = std::env::temp_dir().join("deskbook_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("stress_{}.wal", Ulid::new()));
    Engine::new(path, Arc::new(NullSink)).unwrap()
}

async fn setup_spaces(engine: &Engine, count: usize) -> Vec<Ulid> {
    let mut ids = Vec::new();
    for i in 0..count {
        let space = Space {
            id: Ulid::new(),
            name: format!("Desk {i}"),
            kind: SpaceKind::HotDesk,
            capacity: 1,
            floor_id: None,
            opening_hours: OpeningHours::every_day(hhmm("06:00"), hhmm("22:00")),
            max_duration_min: None,
            status: SpaceStatus::Available,
        };
        ids.push(space.id);
        engine.create_space(space).await.unwrap();
    }
    println!("  created {count} spaces");
    ids
}

/// Non-conflicting 30-minute slot number `n` for one space: 32 slots per day
/// starting 06:00, rolling the date forward as they fill.
fn slot(n: usize) -> (chrono::NaiveDateTime, chrono::NaiveDateTime) {
    let base = NaiveDate::from_ymd_opt(2031, 1, 6).unwrap();
    let date = base + ChronoDuration::days((n / 32) as i64);
    let start = date.and_time(hhmm("06:00")) + ChronoDuration::minutes((n % 32) as i64 * 30);
    (start, start + ChronoDuration::minutes(30))
}

async fn phase1_sequential_creates(engine: &Engine, space_id: Ulid, n: usize) {
    let mut latencies = Vec::with_capacity(n);
    for i in 0..n {
        let (start, end) = slot(i);
        let began = Instant::now();
        engine
            .create_booking(Ulid::new(), space_id, start, end)
            .await
            .unwrap();
        latencies.push(began.elapsed());
    }
    print_latency("sequential create_booking", &mut latencies);
}

async fn phase2_availability_queries(engine: &Engine, space_id: Ulid, n: usize) {
    let date = NaiveDate::from_ymd_opt(2031, 1, 6).unwrap();
    let mut latencies = Vec::with_capacity(n);
    for _ in 0..n {
        let began = Instant::now();
        let result = engine
            .space_availability(space_id, date, hhmm("06:00"), hhmm("06:30"))
            .await
            .unwrap();
        assert!(!result.available); // slot 0 is always taken by phase 1
        latencies.push(began.elapsed());
    }
    print_latency("space_availability", &mut latencies);

    let mut latencies = Vec::with_capacity(n);
    for _ in 0..n {
        let began = Instant::now();
        engine.free_segments(space_id, date).await.unwrap();
        latencies.push(began.elapsed());
    }
    print_latency("free_segments", &mut latencies);
}

async fn phase3_concurrent_creates(engine: Arc<Engine>, spaces: &[Ulid], per_space: usize) {
    let began = Instant::now();
    let mut handles = Vec::new();
    for &space_id in spaces {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_space {
                let (start, end) = slot(i);
                engine
                    .create_booking(Ulid::new(), space_id, start, end)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    let elapsed = began.elapsed();
    let total = spaces.len() * per_space;
    println!(
        "  concurrent creates: {total} bookings across {} spaces in {:.2}s ({:.0}/s)",
        spaces.len(),
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64(),
    );
}

#[tokio::main]
async fn main() {
    println!("deskbook stress bench");

    let engine = Arc::new(setup_engine());
    let spaces = setup_spaces(&engine, 10).await;

    println!("phase 1: sequential creates");
    phase1_sequential_creates(&engine, spaces[0], 2_000).await;

    println!("phase 2: read path");
    phase2_availability_queries(&engine, spaces[0], 5_000).await;

    println!("phase 3: concurrent writers");
    phase3_concurrent_creates(engine.clone(), &spaces[1..], 500).await;

    println!("done");
}
