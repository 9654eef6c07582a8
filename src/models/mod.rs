// Snapshot wire models

mod network;
mod storage;
mod system;

pub use network::InterfaceStat;
pub use storage::DiskStat;
pub use system::{
    MemoryReading, MemoryStats, MetricFamily, Snapshot, format_percent, percent_of,
};
