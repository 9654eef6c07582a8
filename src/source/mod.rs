// Metric source adapters: one async read per metric family.

mod linux;
mod sysinfo_source;

pub use sysinfo_source::SysinfoSource;

use crate::models::{DiskStat, InterfaceStat, MemoryReading};
use async_trait::async_trait;
use std::time::Duration;

/// Failure of a single metric-family read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("collection task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => SourceError::PermissionDenied(e.to_string()),
            _ => SourceError::Unavailable(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for SourceError {
    fn from(e: tokio::task::JoinError) -> Self {
        SourceError::Task(e.to_string())
    }
}

/// Uniform read interface over the host's metric families.
///
/// Each read is independent: callers may issue them concurrently and retry any
/// one of them without affecting the others.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Per-logical-core load, 0–100.
    async fn read_cpu_load(&self) -> Result<Vec<f64>, SourceError>;

    async fn read_memory(&self) -> Result<MemoryReading, SourceError>;

    /// Seconds since boot.
    async fn read_uptime(&self) -> Result<u64, SourceError>;

    async fn read_disks(&self) -> Result<Vec<DiskStat>, SourceError>;

    async fn read_interfaces(&self) -> Result<Vec<InterfaceStat>, SourceError>;
}
