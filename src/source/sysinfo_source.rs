// Host metrics via sysinfo

use super::linux;
use super::{MetricSource, SourceError};
use crate::models::{DiskStat, InterfaceStat, MemoryReading};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, Networks, System};
use tracing::instrument;

/// Production adapter: every read runs the blocking sysinfo call on the blocking pool.
pub struct SysinfoSource {
    sys: Arc<Mutex<System>>,
    disks: Arc<Mutex<Disks>>,
    networks: Arc<Mutex<Networks>>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(what: &str) -> SourceError {
    SourceError::Unavailable(format!("sysinfo {} lock poisoned", what))
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        // Establishes the CPU usage baseline for the first tick.
        sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(disks)),
            networks: Arc::new(Mutex::new(networks)),
        }
    }
}

#[async_trait]
impl MetricSource for SysinfoSource {
    #[instrument(skip(self), fields(source = "sysinfo", operation = "read_cpu_load"))]
    async fn read_cpu_load(&self) -> Result<Vec<f64>, SourceError> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys.lock().map_err(|_| poisoned("system"))?;
            sys.refresh_cpu_all();
            let loads = sys
                .cpus()
                .iter()
                .map(|c| (c.cpu_usage() as f64).clamp(0.0, 100.0))
                .collect::<Vec<_>>();
            if loads.is_empty() {
                return Err(SourceError::Unavailable("no logical cores reported".into()));
            }
            Ok(loads)
        })
        .await?
    }

    #[instrument(skip(self), fields(source = "sysinfo", operation = "read_memory"))]
    async fn read_memory(&self) -> Result<MemoryReading, SourceError> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys.lock().map_err(|_| poisoned("system"))?;
            sys.refresh_memory();
            let total = sys.total_memory();
            let free = sys.free_memory();
            let active = match linux::read_active_memory_linux() {
                Ok(active) => active,
                Err(e) => {
                    tracing::debug!(error = %e, "falling back to used memory for active");
                    sys.used_memory()
                }
            };
            Ok(MemoryReading {
                free,
                total,
                active,
            })
        })
        .await?
    }

    #[instrument(skip(self), fields(source = "sysinfo", operation = "read_uptime"))]
    async fn read_uptime(&self) -> Result<u64, SourceError> {
        tokio::task::spawn_blocking(System::uptime).await.map_err(SourceError::from)
    }

    #[instrument(skip(self), fields(source = "sysinfo", operation = "read_disks"))]
    async fn read_disks(&self) -> Result<Vec<DiskStat>, SourceError> {
        let disks = self.disks.clone();
        tokio::task::spawn_blocking(move || {
            let mut disks = disks.lock().map_err(|_| poisoned("disks"))?;
            // Drops unmounted filesystems and picks up new mounts.
            disks.refresh(true);
            Ok(disks
                .list()
                .iter()
                .map(|d| {
                    DiskStat::from_space(
                        d.name().to_string_lossy(),
                        d.mount_point().to_string_lossy(),
                        d.total_space(),
                        d.available_space(),
                    )
                })
                .collect())
        })
        .await?
    }

    #[instrument(skip(self), fields(source = "sysinfo", operation = "read_interfaces"))]
    async fn read_interfaces(&self) -> Result<Vec<InterfaceStat>, SourceError> {
        let networks = self.networks.clone();
        tokio::task::spawn_blocking(move || {
            let mut networks = networks.lock().map_err(|_| poisoned("networks"))?;
            networks.refresh(true);
            let mut interfaces: Vec<InterfaceStat> = networks
                .list()
                .iter()
                .map(|(name, data)| {
                    let addrs = data.ip_networks();
                    let ip4 = addrs
                        .iter()
                        .find(|n| n.addr.is_ipv4())
                        .map(|n| n.addr.to_string());
                    let internal = linux::is_loopback_name(name)
                        || (!addrs.is_empty() && addrs.iter().all(|n| n.addr.is_loopback()));
                    InterfaceStat {
                        iface: name.clone(),
                        ip4,
                        mac: data.mac_address().to_string(),
                        internal,
                    }
                })
                .collect();
            interfaces.sort_by(|a, b| a.iface.cmp(&b.iface));
            Ok(interfaces)
        })
        .await?
    }
}
