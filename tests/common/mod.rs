// Shared test helpers
#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;
use vpsmonit::config::{AppConfig, ClientConfig};
use vpsmonit::models::*;
use vpsmonit::source::{MetricSource, SourceError};

pub const TEST_CONFIG: &str = r#"
[server]
port = 3000
host = "127.0.0.1"

[aggregator]
tick_interval_ms = 1000
source_timeout_ms = 500

[broadcast]
subscriber_buffer = 8
keep_alive_secs = 15

[monitoring]
stats_log_interval_secs = 60
"#;

pub fn test_app_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

/// Fast reconnects so tests observe several attempts quickly.
pub fn client_config(url: String) -> ClientConfig {
    ClientConfig {
        url,
        reconnect_initial_ms: 20,
        reconnect_max_ms: 200,
        connect_timeout_ms: 1000,
    }
}

/// Binds 127.0.0.1:0 and serves `router` in the background.
pub async fn serve(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Snapshot distinguishable by its uptime.
pub fn snapshot(uptime: u64) -> Snapshot {
    Snapshot::complete(
        vec![10.0, 20.0],
        MemoryStats::from(MemoryReading {
            free: 2000,
            total: 8000,
            active: 4000,
        }),
        uptime,
        vec![],
        vec![],
    )
}

/// Scriptable metric source. Every family returns its configured result; families
/// listed in `hanging` never complete, and `gated` makes the CPU read wait for `gate`.
pub struct FakeSource {
    pub cpu: Mutex<Result<Vec<f64>, SourceError>>,
    pub memory: Mutex<Result<MemoryReading, SourceError>>,
    pub uptime: Mutex<Result<u64, SourceError>>,
    pub disks: Mutex<Result<Vec<DiskStat>, SourceError>>,
    pub interfaces: Mutex<Result<Vec<InterfaceStat>, SourceError>>,
    pub hanging: Mutex<Vec<MetricFamily>>,
    pub gated: AtomicBool,
    pub gate: Notify,
    pub cpu_reads: AtomicUsize,
}

impl FakeSource {
    /// cpu [10, 20], memory {free 2000, total 8000, active 4000}, uptime 3661, no disks or interfaces.
    pub fn scenario() -> Self {
        Self {
            cpu: Mutex::new(Ok(vec![10.0, 20.0])),
            memory: Mutex::new(Ok(MemoryReading {
                free: 2000,
                total: 8000,
                active: 4000,
            })),
            uptime: Mutex::new(Ok(3661)),
            disks: Mutex::new(Ok(vec![])),
            interfaces: Mutex::new(Ok(vec![])),
            hanging: Mutex::new(vec![]),
            gated: AtomicBool::new(false),
            gate: Notify::new(),
            cpu_reads: AtomicUsize::new(0),
        }
    }

    pub fn fail(&self, family: MetricFamily) {
        let e = SourceError::Unavailable(format!("{} offline", family));
        match family {
            MetricFamily::CpuLoad => *self.cpu.lock().unwrap() = Err(e),
            MetricFamily::Memory => *self.memory.lock().unwrap() = Err(e),
            MetricFamily::Uptime => *self.uptime.lock().unwrap() = Err(e),
            MetricFamily::Disks => *self.disks.lock().unwrap() = Err(e),
            MetricFamily::Interfaces => *self.interfaces.lock().unwrap() = Err(e),
        }
    }

    pub fn fail_all(&self) {
        for family in MetricFamily::ALL {
            self.fail(family);
        }
    }

    pub fn hang(&self, family: MetricFamily) {
        self.hanging.lock().unwrap().push(family);
    }

    async fn pause(&self, family: MetricFamily) {
        let hangs = self.hanging.lock().unwrap().contains(&family);
        if hangs {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl MetricSource for FakeSource {
    async fn read_cpu_load(&self) -> Result<Vec<f64>, SourceError> {
        self.cpu_reads.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.pause(MetricFamily::CpuLoad).await;
        self.cpu.lock().unwrap().clone()
    }

    async fn read_memory(&self) -> Result<MemoryReading, SourceError> {
        self.pause(MetricFamily::Memory).await;
        self.memory.lock().unwrap().clone()
    }

    async fn read_uptime(&self) -> Result<u64, SourceError> {
        self.pause(MetricFamily::Uptime).await;
        self.uptime.lock().unwrap().clone()
    }

    async fn read_disks(&self) -> Result<Vec<DiskStat>, SourceError> {
        self.pause(MetricFamily::Disks).await;
        self.disks.lock().unwrap().clone()
    }

    async fn read_interfaces(&self) -> Result<Vec<InterfaceStat>, SourceError> {
        self.pause(MetricFamily::Interfaces).await;
        self.interfaces.lock().unwrap().clone()
    }
}
