// Linux-specific helpers: /proc/meminfo and loopback detection.

use super::SourceError;

/// Read the `Active:` line of /proc/meminfo, in bytes.
#[cfg(target_os = "linux")]
pub(super) fn read_active_memory_linux() -> Result<u64, SourceError> {
    let content = std::fs::read_to_string("/proc/meminfo")?;
    parse_meminfo_active(&content)
        .ok_or_else(|| SourceError::Unavailable("no Active entry in /proc/meminfo".into()))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn read_active_memory_linux() -> Result<u64, SourceError> {
    Err(SourceError::Unavailable(
        "active memory is only read from /proc/meminfo".into(),
    ))
}

/// Parse `Active:   123456 kB` into bytes. `Active(anon)` and friends are ignored.
pub(super) fn parse_meminfo_active(content: &str) -> Option<u64> {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("Active:") {
            let mut parts = rest.split_whitespace();
            let value = parts.next()?.parse::<u64>().ok()?;
            return match parts.next() {
                Some("kB") | None => value.checked_mul(1024),
                Some(_) => None,
            };
        }
    }
    None
}

/// Loopback interfaces are reported as internal.
pub(super) fn is_loopback_name(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0")
}
