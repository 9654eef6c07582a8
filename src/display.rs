// Formatting and threshold helpers for rendering a snapshot.

use crate::models::DiskStat;

/// Filesystems above this capacity are flagged as nearly full.
pub const NEAR_FULL_PERCENT: f64 = 85.0;

/// `"{d}d {h}h {m}m"`, or `"{h}h {m}m"` under a day.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

/// 1024-based size with two decimals, e.g. `"1.50 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Parses `"42.10"` or `"42.10%"`; anything unparsable is 0.
pub fn parse_percentage(value: &str) -> f64 {
    value
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

pub fn is_near_full(disk: &DiskStat) -> bool {
    parse_percentage(&disk.capacity) > NEAR_FULL_PERCENT
}

/// Fullest filesystem first.
pub fn sort_disks_by_capacity(disks: &[DiskStat]) -> Vec<&DiskStat> {
    let mut sorted: Vec<&DiskStat> = disks.iter().collect();
    sorted.sort_by(|a, b| {
        parse_percentage(&b.capacity).total_cmp(&parse_percentage(&a.capacity))
    });
    sorted
}

pub fn average_cpu_load(loads: &[f64]) -> f64 {
    if loads.is_empty() {
        return 0.0;
    }
    loads.iter().sum::<f64>() / loads.len() as f64
}

/// Severity band used to color a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadLevel {
    Normal,
    Elevated,
    Critical,
}

impl LoadLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent < 60.0 {
            LoadLevel::Normal
        } else if percent < NEAR_FULL_PERCENT {
            LoadLevel::Elevated
        } else {
            LoadLevel::Critical
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoadLevel::Normal => "ok",
            LoadLevel::Elevated => "warn",
            LoadLevel::Critical => "crit",
        }
    }
}
