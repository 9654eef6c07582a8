// Mounted filesystem model

use serde::{Deserialize, Serialize};

use super::system::percent_of;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskStat {
    /// Filesystem / device identifier (e.g. `/dev/sda1`).
    pub filesystem: String,
    pub size: u64,
    pub used: u64,
    pub available: u64,
    /// `used / size * 100`, two decimals, no `%`.
    pub capacity: String,
    pub mount: String,
}

impl DiskStat {
    /// Builds a disk entry from total and available space; `used` is the difference.
    pub fn from_space(
        filesystem: impl Into<String>,
        mount: impl Into<String>,
        size: u64,
        available: u64,
    ) -> Self {
        let available = available.min(size);
        let used = size - available;
        Self {
            filesystem: filesystem.into(),
            size,
            used,
            available,
            capacity: percent_of(used, size),
            mount: mount.into(),
        }
    }
}
