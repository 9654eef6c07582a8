// Snapshot aggregator: fixed-cadence collection, assembly and publish.
// Each tick runs as its own task; a tick that finds a collection still in flight is skipped.

use crate::broadcaster::{Broadcaster, PublishReport};
use crate::models::{DiskStat, InterfaceStat, MemoryStats, MetricFamily, Snapshot};
use crate::source::{MetricSource, SourceError};
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant, interval, timeout};
use tracing::Instrument;

/// Rate limit for the "no subscribers" debug line.
const NO_SUBSCRIBERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
    Publishing,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Collecting,
            2 => Phase::Publishing,
            _ => Phase::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Collecting => 1,
            Phase::Publishing => 2,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published {
        snapshot: Arc<Snapshot>,
        report: PublishReport,
    },
    /// Every family failed and there was nothing to publish.
    Failed,
    /// A previous collection was still in flight.
    Skipped,
}

/// Aggregator timing and logging config.
pub struct AggregatorConfig {
    pub tick_interval_ms: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

#[derive(Default)]
struct LastKnownGood {
    cpu_load: Option<Vec<f64>>,
    mem: Option<MemoryStats>,
    uptime: Option<u64>,
    disk: Option<Vec<DiskStat>>,
    net: Option<Vec<InterfaceStat>>,
}

/// Resets the phase to Idle however the tick ends, including cancellation.
struct PhaseGuard<'a>(&'a AtomicU8);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(Phase::Idle.as_u8(), Ordering::Release);
    }
}

pub struct Aggregator {
    source: Arc<dyn MetricSource>,
    broadcaster: Broadcaster,
    source_timeout: Duration,
    phase: AtomicU8,
    last_good: Mutex<LastKnownGood>,
    ticks_skipped: AtomicU64,
    total_failures: AtomicU64,
}

impl Aggregator {
    /// `source_timeout` bounds every individual family read.
    pub fn new(
        source: Arc<dyn MetricSource>,
        broadcaster: Broadcaster,
        source_timeout: Duration,
    ) -> Self {
        Self {
            source,
            broadcaster,
            source_timeout,
            phase: AtomicU8::new(Phase::Idle.as_u8()),
            last_good: Mutex::new(LastKnownGood::default()),
            ticks_skipped: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Runs one collection + publish, unless one is already in flight.
    pub async fn try_tick(&self) -> TickOutcome {
        if self
            .phase
            .compare_exchange(
                Phase::Idle.as_u8(),
                Phase::Collecting.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                operation = "tick",
                phase = ?self.phase(),
                "previous collection still in flight, skipping tick"
            );
            return TickOutcome::Skipped;
        }
        let _guard = PhaseGuard(&self.phase);

        let Some(snapshot) = self.collect().await else {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                operation = "collect",
                "all metric families failed; nothing published this tick"
            );
            return TickOutcome::Failed;
        };

        self.phase.store(Phase::Publishing.as_u8(), Ordering::Release);
        let snapshot = Arc::new(snapshot);
        let report = self.broadcaster.publish(snapshot.clone());
        TickOutcome::Published { snapshot, report }
    }

    /// Reads all five families concurrently and assembles a snapshot.
    /// Returns `None` when every family failed.
    async fn collect(&self) -> Option<Snapshot> {
        let source = self.source.as_ref();
        let (cpu, mem, uptime, disks, net) = tokio::join!(
            self.bounded(source.read_cpu_load()),
            self.bounded(source.read_memory()),
            self.bounded(source.read_uptime()),
            self.bounded(source.read_disks()),
            self.bounded(source.read_interfaces()),
        );
        let mem = mem.map(MemoryStats::from);

        if cpu.is_err() && mem.is_err() && uptime.is_err() && disks.is_err() && net.is_err() {
            for (family, e) in [
                (MetricFamily::CpuLoad, cpu.err()),
                (MetricFamily::Memory, mem.err()),
                (MetricFamily::Uptime, uptime.err()),
                (MetricFamily::Disks, disks.err()),
                (MetricFamily::Interfaces, net.err()),
            ] {
                if let Some(e) = e {
                    tracing::warn!(family = %family, error = %e, "metric read failed");
                }
            }
            return None;
        }

        let mut last = self
            .last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stale = Vec::new();
        let mut missing = Vec::new();
        let mut degrade = Degrade {
            stale: &mut stale,
            missing: &mut missing,
        };

        let cpu_load = degrade.resolve(MetricFamily::CpuLoad, cpu, &mut last.cpu_load);
        let mem = degrade.resolve(MetricFamily::Memory, mem, &mut last.mem);
        let uptime = degrade.resolve(MetricFamily::Uptime, uptime, &mut last.uptime);
        let disk = degrade.resolve(MetricFamily::Disks, disks, &mut last.disk);
        let net = degrade.resolve(MetricFamily::Interfaces, net, &mut last.net);

        Some(Snapshot {
            cpu_load: cpu_load.unwrap_or_default(),
            mem,
            uptime,
            disk: disk.unwrap_or_default(),
            net: net.unwrap_or_default(),
            partial: !stale.is_empty() || !missing.is_empty(),
            stale,
            missing,
        })
    }

    async fn bounded<T>(
        &self,
        read: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, SourceError> {
        match timeout(self.source_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.source_timeout)),
        }
    }
}

struct Degrade<'a> {
    stale: &'a mut Vec<MetricFamily>,
    missing: &'a mut Vec<MetricFamily>,
}

impl Degrade<'_> {
    /// Fresh value wins and becomes last-known-good; on failure fall back to
    /// last-known-good (stale) or leave the family out (missing).
    fn resolve<T: Clone>(
        &mut self,
        family: MetricFamily,
        result: Result<T, SourceError>,
        last: &mut Option<T>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                *last = Some(value.clone());
                Some(value)
            }
            Err(e) => {
                tracing::warn!(family = %family, error = %e, "metric read failed");
                match last {
                    Some(value) => {
                        self.stale.push(family);
                        Some(value.clone())
                    }
                    None => {
                        self.missing.push(family);
                        None
                    }
                }
            }
        }
    }
}

/// Spawns the tick loop. Each tick's collection runs on its own task so the
/// timer keeps its cadence; overlapping ticks are skipped by `try_tick`.
pub fn spawn(
    aggregator: Arc<Aggregator>,
    config: AggregatorConfig,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let span = tracing::span!(
        tracing::Level::DEBUG,
        "aggregator",
        tick_interval_ms = config.tick_interval_ms
    );
    tokio::spawn(run(aggregator, config, shutdown_rx).instrument(span))
}

async fn run(
    aggregator: Arc<Aggregator>,
    config: AggregatorConfig,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let mut tick = interval(Duration::from_millis(config.tick_interval_ms));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut stats_log_tick = interval(Duration::from_secs(config.stats_log_interval_secs));
    stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_no_subscribers_log: Option<Instant> = None;
    let mut in_flight: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if aggregator.phase() != Phase::Idle {
                    aggregator.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(operation = "tick", "collection in flight, skipping tick");
                    continue;
                }
                let should_log = last_no_subscribers_log
                    .is_none_or(|t| t.elapsed() >= NO_SUBSCRIBERS_LOG_INTERVAL);
                if should_log && aggregator.broadcaster.subscriber_count() == 0 {
                    tracing::debug!(
                        operation = "publish",
                        "No active subscribers; snapshots only refresh the latest slot"
                    );
                    last_no_subscribers_log = Some(Instant::now());
                }
                let aggregator = aggregator.clone();
                in_flight = Some(tokio::spawn(
                    async move {
                        aggregator.try_tick().await;
                    }
                    .in_current_span(),
                ));
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("Aggregator shutting down");
                // Nothing publishes after shutdown; dropping the tick resets the phase.
                if let Some(tick) = in_flight.take().filter(|t| !t.is_finished()) {
                    tick.abort();
                    let _ = tick.await;
                    tracing::debug!(operation = "tick", "in-flight collection cancelled");
                }
                break;
            }
            _ = stats_log_tick.tick() => {
                tracing::info!(
                    subscribers = aggregator.broadcaster.subscriber_count(),
                    snapshots_published_total = aggregator.broadcaster.published_total(),
                    subscribers_dropped_total = aggregator.broadcaster.dropped_total(),
                    ticks_skipped_total = aggregator.ticks_skipped(),
                    collection_failures_total = aggregator.total_failures(),
                    "app stats"
                );
            }
        }
    }
}
