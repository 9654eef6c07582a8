// CPU, memory and snapshot models

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DiskStat, InterfaceStat};

/// Formats a percentage the way the wire expects it: two decimals, no `%`.
pub fn format_percent(value: f64) -> String {
    let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
    format!("{:.2}", value)
}

/// `part / whole * 100` as a wire percentage string; `"0.00"` when `whole` is zero.
pub fn percent_of(part: u64, whole: u64) -> String {
    if whole == 0 {
        return format_percent(0.0);
    }
    format_percent(part as f64 / whole as f64 * 100.0)
}

/// Raw memory reading from a source. `active` is the kernel's active memory,
/// which is what `usedPercent` is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub free: u64,
    pub total: u64,
    pub active: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub total: u64,
    pub used_percent: String,
}

impl From<MemoryReading> for MemoryStats {
    fn from(reading: MemoryReading) -> Self {
        Self {
            free: reading.free.min(reading.total),
            total: reading.total,
            used_percent: percent_of(reading.active, reading.total),
        }
    }
}

/// One of the five metric families collected each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricFamily {
    CpuLoad,
    Memory,
    Uptime,
    Disks,
    Interfaces,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 5] = [
        MetricFamily::CpuLoad,
        MetricFamily::Memory,
        MetricFamily::Uptime,
        MetricFamily::Disks,
        MetricFamily::Interfaces,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFamily::CpuLoad => "cpuLoad",
            MetricFamily::Memory => "memory",
            MetricFamily::Uptime => "uptime",
            MetricFamily::Disks => "disks",
            MetricFamily::Interfaces => "interfaces",
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One complete, immutable set of host metrics produced by a single tick.
///
/// A complete snapshot serializes exactly `cpuLoad`, `mem`, `uptime`, `disk` and `net`.
/// Degraded snapshots additionally carry `partial`, plus the families that were
/// served from last-known-good values (`stale`) or left out (`missing`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cpu_load: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<MemoryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub disk: Vec<DiskStat>,
    #[serde(default)]
    pub net: Vec<InterfaceStat>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale: Vec<MetricFamily>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MetricFamily>,
}

impl Snapshot {
    /// Snapshot with every family present and fresh.
    pub fn complete(
        cpu_load: Vec<f64>,
        mem: MemoryStats,
        uptime: u64,
        disk: Vec<DiskStat>,
        net: Vec<InterfaceStat>,
    ) -> Self {
        Self {
            cpu_load,
            mem: Some(mem),
            uptime: Some(uptime),
            disk,
            net,
            partial: false,
            stale: Vec::new(),
            missing: Vec::new(),
        }
    }

    pub fn is_degraded(&self, family: MetricFamily) -> bool {
        self.stale.contains(&family) || self.missing.contains(&family)
    }
}
