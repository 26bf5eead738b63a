//! Process and host resource figures for the status endpoints.
//!
//! On Linux everything is read from procfs. Other platforms report `None`
//! for the figures they cannot provide; callers serialize those as `null`.

use serde::Serialize;

/// Linux fixes `USER_HZ` at 100 for the `/proc/<pid>/stat` tick fields.
const TICKS_PER_SEC: u64 = 100;

/// Memory held by this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub rss_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
}

/// CPU time consumed by this process since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuUsage {
    pub user_micros: Option<u64>,
    pub system_micros: Option<u64>,
}

/// Host-wide memory, in megabytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostMemory {
    pub total_mb: Option<u64>,
    pub free_mb: Option<u64>,
}

pub fn hostname() -> String {
    ::hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn memory_usage() -> MemoryUsage {
    read_proc("/proc/self/status")
        .map(|s| parse_status(&s))
        .unwrap_or_default()
}

pub fn cpu_usage() -> CpuUsage {
    read_proc("/proc/self/stat")
        .map(|s| parse_stat(&s))
        .unwrap_or_default()
}

/// 1, 5 and 15 minute load averages.
pub fn load_average() -> Option<[f64; 3]> {
    read_proc("/proc/loadavg").and_then(|s| parse_loadavg(&s))
}

pub fn host_memory() -> HostMemory {
    read_proc("/proc/meminfo")
        .map(|s| parse_meminfo(&s))
        .unwrap_or_default()
}

pub fn cpu_count() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Value of a `Key:   1234 kB` line, converted to bytes.
fn kb_field(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

fn parse_status(content: &str) -> MemoryUsage {
    MemoryUsage {
        rss_bytes: kb_field(content, "VmRSS"),
        virtual_bytes: kb_field(content, "VmSize"),
    }
}

fn parse_stat(content: &str) -> CpuUsage {
    // comm (field 2) may contain spaces and parens; fields after the last ')'
    // start at field 3, so utime (14) and stime (15) sit at offsets 11 and 12.
    let Some((_, rest)) = content.rsplit_once(')') else {
        return CpuUsage::default();
    };
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let ticks_to_micros = |idx: usize| {
        fields
            .get(idx)
            .and_then(|v| v.parse::<u64>().ok())
            .map(|ticks| ticks * 1_000_000 / TICKS_PER_SEC)
    };
    CpuUsage {
        user_micros: ticks_to_micros(11),
        system_micros: ticks_to_micros(12),
    }
}

fn parse_loadavg(content: &str) -> Option<[f64; 3]> {
    let mut parts = content.split_whitespace().map(|v| v.parse::<f64>().ok());
    Some([parts.next()??, parts.next()??, parts.next()??])
}

fn parse_meminfo(content: &str) -> HostMemory {
    let mb = |key: &str| kb_field(content, key).map(|bytes| bytes / 1024 / 1024);
    HostMemory {
        total_mb: mb("MemTotal"),
        free_mb: mb("MemAvailable").or_else(|| mb("MemFree")),
    }
}
