// Aggregator tests: assembly, degraded families, single collection in flight, tick loop

mod common;

use common::FakeSource;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::{Duration, Instant};
use vpsmonit::aggregator::{Aggregator, AggregatorConfig, Phase, TickOutcome, spawn};
use vpsmonit::broadcaster::Broadcaster;
use vpsmonit::display::format_uptime;
use vpsmonit::models::{DiskStat, MetricFamily, Snapshot};

fn aggregator(source: Arc<FakeSource>, timeout_ms: u64) -> Arc<Aggregator> {
    Arc::new(Aggregator::new(
        source,
        Broadcaster::new(8),
        Duration::from_millis(timeout_ms),
    ))
}

fn published(outcome: TickOutcome) -> Arc<Snapshot> {
    match outcome {
        TickOutcome::Published { snapshot, .. } => snapshot,
        other => panic!("expected a published snapshot, got {:?}", other),
    }
}

async fn wait_for_phase(agg: &Aggregator, phase: Phase) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while agg.phase() != phase {
        assert!(Instant::now() < deadline, "timed out waiting for {:?}", phase);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn tick_assembles_scenario_snapshot() {
    let agg = aggregator(Arc::new(FakeSource::scenario()), 500);
    let snapshot = published(agg.try_tick().await);

    assert_eq!(snapshot.cpu_load, vec![10.0, 20.0]);
    let mem = snapshot.mem.as_ref().unwrap();
    assert_eq!(mem.used_percent, "50.00");
    assert_eq!(mem.free, 2000);
    assert_eq!(mem.total, 8000);
    assert_eq!(snapshot.uptime, Some(3661));
    assert_eq!(format_uptime(snapshot.uptime.unwrap()), "1h 1m");
    assert!(snapshot.disk.is_empty());
    assert!(snapshot.net.is_empty());
    assert!(!snapshot.partial);
    assert_eq!(agg.phase(), Phase::Idle);
}

#[tokio::test]
async fn tick_publishes_to_broadcaster() {
    let agg = aggregator(Arc::new(FakeSource::scenario()), 500);
    let mut sub = agg.broadcaster().subscribe();
    let snapshot = published(agg.try_tick().await);
    let received = sub.recv().await.unwrap();
    assert!(Arc::ptr_eq(&snapshot, &received));
    assert_eq!(agg.broadcaster().latest().unwrap().uptime, Some(3661));
}

#[tokio::test]
async fn tick_is_skipped_while_collection_in_flight() {
    let source = Arc::new(FakeSource::scenario());
    source.gated.store(true, Ordering::SeqCst);
    let agg = aggregator(source.clone(), 5_000);

    let first = {
        let agg = agg.clone();
        tokio::spawn(async move { agg.try_tick().await })
    };
    wait_for_phase(&agg, Phase::Collecting).await;

    assert_eq!(agg.try_tick().await, TickOutcome::Skipped);
    assert_eq!(agg.try_tick().await, TickOutcome::Skipped);
    assert_eq!(agg.ticks_skipped(), 2);
    assert_eq!(source.cpu_reads.load(Ordering::SeqCst), 1);

    source.gate.notify_one();
    let snapshot = published(first.await.unwrap());
    assert_eq!(snapshot.uptime, Some(3661));
    assert_eq!(agg.phase(), Phase::Idle);

    source.gated.store(false, Ordering::SeqCst);
    published(agg.try_tick().await);
    assert_eq!(source.cpu_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_family_falls_back_to_last_known_good() {
    let source = Arc::new(FakeSource::scenario());
    let agg = aggregator(source.clone(), 500);
    published(agg.try_tick().await);

    source.fail(MetricFamily::Memory);
    *source.uptime.lock().unwrap() = Ok(3700);
    let snapshot = published(agg.try_tick().await);

    assert!(snapshot.partial);
    assert_eq!(snapshot.stale, vec![MetricFamily::Memory]);
    assert!(snapshot.missing.is_empty());
    assert_eq!(snapshot.mem.as_ref().unwrap().used_percent, "50.00");
    assert_eq!(snapshot.uptime, Some(3700));
}

#[tokio::test]
async fn failed_family_without_history_is_missing() {
    let source = Arc::new(FakeSource::scenario());
    source.fail(MetricFamily::Memory);
    source.fail(MetricFamily::CpuLoad);
    let agg = aggregator(source.clone(), 500);

    let snapshot = published(agg.try_tick().await);
    assert!(snapshot.partial);
    assert!(snapshot.mem.is_none());
    assert!(snapshot.cpu_load.is_empty());
    assert_eq!(
        snapshot.missing,
        vec![MetricFamily::CpuLoad, MetricFamily::Memory]
    );
    assert_eq!(snapshot.uptime, Some(3661));
}

#[tokio::test]
async fn timed_out_family_does_not_hold_the_tick() {
    let source = Arc::new(FakeSource::scenario());
    source.hang(MetricFamily::Disks);
    let agg = aggregator(source.clone(), 50);

    let started = Instant::now();
    let snapshot = published(agg.try_tick().await);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(snapshot.partial);
    assert_eq!(snapshot.missing, vec![MetricFamily::Disks]);
    assert_eq!(snapshot.cpu_load, vec![10.0, 20.0]);
    assert_eq!(agg.phase(), Phase::Idle);
}

#[tokio::test]
async fn timed_out_family_falls_back_to_last_known_good() {
    let source = Arc::new(FakeSource::scenario());
    let root = DiskStat::from_space("/dev/sda1", "/", 1000, 100);
    *source.disks.lock().unwrap() = Ok(vec![root.clone()]);
    let agg = aggregator(source.clone(), 50);
    published(agg.try_tick().await);

    source.hang(MetricFamily::Disks);
    *source.disks.lock().unwrap() = Ok(vec![]);
    let snapshot = published(agg.try_tick().await);

    assert!(snapshot.partial);
    assert_eq!(snapshot.stale, vec![MetricFamily::Disks]);
    assert!(snapshot.missing.is_empty());
    assert_eq!(snapshot.disk, vec![root]);
    assert_eq!(agg.phase(), Phase::Idle);
}

#[tokio::test]
async fn total_failure_is_reported_and_next_tick_recovers() {
    let source = Arc::new(FakeSource::scenario());
    source.fail_all();
    let agg = aggregator(source.clone(), 500);

    assert_eq!(agg.try_tick().await, TickOutcome::Failed);
    assert_eq!(agg.total_failures(), 1);
    assert!(agg.broadcaster().latest().is_none());
    assert_eq!(agg.phase(), Phase::Idle);

    *source.cpu.lock().unwrap() = Ok(vec![50.0]);
    let snapshot = published(agg.try_tick().await);
    assert_eq!(snapshot.cpu_load, vec![50.0]);
    assert!(snapshot.partial);
    assert_eq!(snapshot.missing.len(), 4);
}

#[tokio::test]
async fn spawned_loop_publishes_until_shutdown() {
    let agg = aggregator(Arc::new(FakeSource::scenario()), 100);
    let mut sub = agg.broadcaster().subscribe();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = spawn(
        agg.clone(),
        AggregatorConfig {
            tick_interval_ms: 20,
            stats_log_interval_secs: 3600,
        },
        shutdown_rx,
    );

    for _ in 0..3 {
        let snapshot = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("tick loop should publish")
            .unwrap();
        assert_eq!(snapshot.uptime, Some(3661));
    }

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop should stop on shutdown")
        .unwrap();
    assert!(agg.broadcaster().published_total() >= 3);
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn spawned_loop_skips_ticks_while_collection_in_flight() {
    let source = Arc::new(FakeSource::scenario());
    source.gated.store(true, Ordering::SeqCst);
    let agg = aggregator(source.clone(), 5_000);
    let mut sub = agg.broadcaster().subscribe();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = spawn(
        agg.clone(),
        AggregatorConfig {
            tick_interval_ms: 10,
            stats_log_interval_secs: 3600,
        },
        shutdown_rx,
    );

    wait_until("first collection", || agg.phase() == Phase::Collecting).await;
    wait_until("skipped ticks", || agg.ticks_skipped() >= 3).await;
    assert_eq!(source.cpu_reads.load(Ordering::SeqCst), 1);
    assert_eq!(agg.broadcaster().published_total(), 0);

    source.gated.store(false, Ordering::SeqCst);
    source.gate.notify_one();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("gated tick should publish once released")
        .unwrap();
    assert_eq!(snapshot.uptime, Some(3661));

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop should stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn shutdown_cancels_in_flight_collection() {
    let source = Arc::new(FakeSource::scenario());
    source.gated.store(true, Ordering::SeqCst);
    let agg = aggregator(source.clone(), 5_000);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = spawn(
        agg.clone(),
        AggregatorConfig {
            tick_interval_ms: 10,
            stats_log_interval_secs: 3600,
        },
        shutdown_rx,
    );
    wait_until("first collection", || agg.phase() == Phase::Collecting).await;

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("shutdown should not wait for the gated read")
        .unwrap();
    assert_eq!(agg.phase(), Phase::Idle);

    source.gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(agg.broadcaster().published_total(), 0);
    assert!(agg.broadcaster().latest().is_none());
}
